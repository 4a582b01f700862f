/// Result type for cardpass operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for cardpass operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Smart card side failed
    #[error(transparent)]
    Card(#[from] cardpass_openpgp_card::Error),

    /// Message could not be parsed or decrypted
    #[error(transparent)]
    Message(#[from] cardpass_message::Error),

    /// None of the message recipients is acceptable for this request
    #[error("the file is not encrypted to any of the requested keys")]
    NoAcceptableRecipient,

    /// Settings could not be read
    #[error("invalid settings: {0}")]
    Config(Box<figment::Error>),

    /// No home directory to hold the settings
    #[error("home directory not found")]
    HomeDirectory,

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the user cancelled PIN entry
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Card(e) if e.is_cancelled())
    }
}
