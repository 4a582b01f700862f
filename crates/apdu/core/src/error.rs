//! Core error type for all APDU operations

use crate::response::status::StatusWord;
use crate::transport::TransportError;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The reader transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A response was too short to carry a status word
    #[error("response too short: {0} bytes")]
    ResponseTooShort(usize),

    /// The card answered with a status other than success or more-data
    #[error("card returned status {0} ({desc})", desc = .0.description())]
    Status(StatusWord),

    /// The payload cannot be framed with the negotiated capabilities
    #[error("payload of {length} bytes too large for this transport (limit {limit})")]
    PayloadTooLarge {
        /// Payload length
        length: usize,
        /// Largest payload the transport accepts
        limit: usize,
    },

    /// The card kept answering `61 XX` past the chain limit
    #[error("GET RESPONSE chain exceeded {0} rounds")]
    ChainLimitExceeded(usize),

    /// A response outcome was used before it was fully assembled
    #[error("Protocol error: {0}")]
    Protocol(&'static str),

    /// Context error with message and source error
    #[error("{context}: {source}")]
    Context {
        /// Contextual message
        context: String,
        /// Source error
        source: Box<Self>,
    },
}

impl Error {
    /// Create a new error with context information
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The card status carried by this error, looking through context layers
    pub fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Context { source, .. } => source.status_word(),
            _ => None,
        }
    }
}

/// Extension trait for Result with APDU Errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T, Error>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn context<S: Into<String>>(self, context: S) -> Self {
        self.map_err(|e| e.with_context(context))
    }
}
