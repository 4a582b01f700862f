//! Error types specific to card transport

/// Transport error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The reader stack itself is missing or did not answer in time
    #[error("token environment not available: {0}")]
    Unavailable(String),

    /// Failed to connect to the reader or card
    #[error("failed to connect to {reader}: {reason}")]
    Connection {
        /// Reader name
        reader: String,
        /// Underlying cause
        reason: String,
    },

    /// Failed to transmit data
    #[error("failed to transmit data: {0}")]
    Transmission(String),

    /// No card present in the reader
    #[error("no card present in reader {0}")]
    NoCard(String),

    /// The card was removed during the exchange
    #[error("card was removed")]
    CardRemoved,

    /// No card connection is open
    #[error("not connected")]
    NotConnected,

    /// Operation timed out
    #[error("operation timed out")]
    Timeout,

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }

    /// Create a connection error for a reader
    pub fn connection(reader: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            reader: reader.into(),
            reason: reason.to_string(),
        }
    }
}
