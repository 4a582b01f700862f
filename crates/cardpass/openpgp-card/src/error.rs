use cardpass_apdu_core::TransportError;

use crate::pin_cache::PinCacheError;
use crate::tlv::TlvError;

/// Result type for OpenPGP card operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why no reader could be used for a decryption
///
/// Variants are ordered by how informative they are; the orchestration keeps the
/// highest one seen across all readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, derive_more::Display)]
pub enum TokenUnavailable {
    /// No reader holds a card with one of the wanted keys
    #[display("No OpenPGP token found with matching secret key")]
    NoMatch,
    /// A matching card was found, but its PIN is blocked
    #[display("Matching OpenPGP token found, but no PIN tries left")]
    Blocked,
    /// A matching card was found, but its decryption key is not RSA
    #[display("Matching OpenPGP token found, but only RSA keys are supported")]
    UnsupportedKeyType,
}

/// Error type for OpenPGP card operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// APDU exchange errors, including card status words
    #[error(transparent)]
    Apdu(#[from] cardpass_apdu_core::Error),

    /// Transport errors outside of an exchange
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed data object
    #[error(transparent)]
    Tlv(#[from] TlvError),

    /// The reader subsystem could not be reached
    #[error("Smart Card Connector not available: {0}")]
    EnvironmentUnavailable(TransportError),

    /// Readers could not be listed
    #[error("No OpenPGP token found: {0}")]
    ReaderEnumeration(TransportError),

    /// The operation needs an open card connection
    #[error("not connected to a card")]
    NotConnected,

    /// The session already holds a connection
    #[error("already connected to {0}")]
    AlreadyConnected(String),

    /// The operation needs an established context
    #[error("no reader context established")]
    NoContext,

    /// The operation needs the OpenPGP application to be selected
    #[error("OpenPGP application not selected")]
    AppletNotSelected,

    /// The historical bytes carry no capability data object
    #[error("card does not report its capabilities")]
    CapabilitiesMissing,

    /// A data object the card must provide is absent or too short
    #[error("card data object missing: {0}")]
    MissingDataObject(&'static str),

    /// The PIN is too long for a VERIFY command
    #[error("PIN is too long")]
    PinTooLong,

    /// The card refused VERIFY because the PIN is blocked
    #[error("OpenPGP token has no PIN tries left")]
    PinBlocked,

    /// The user dismissed the PIN prompt
    #[error("PIN entry cancelled by user")]
    Cancelled,

    /// No reader could be used
    #[error("{0}")]
    NoUsableToken(TokenUnavailable),

    /// None of the candidate keys has an encrypted session key
    #[error("no encrypted session key for key id {0}")]
    MissingSessionKey(String),

    /// PIN cache failure
    #[error(transparent)]
    PinCache(#[from] PinCacheError),
}

impl Error {
    /// Whether the user aborted the operation
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
