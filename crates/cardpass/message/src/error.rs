/// Result type for message operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for OpenPGP message parsing and decryption
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Neither binary packets nor ASCII armor
    #[error("not an OpenPGP message")]
    UnrecognizedFormat,

    /// The message is not encrypted
    #[error("message contains no encrypted data")]
    NoEncryptedData,

    /// Symmetric algorithm id that cannot encrypt a message
    #[error("unsupported symmetric algorithm {0}")]
    UnsupportedAlgorithm(u8),

    /// Raw session key too short or of the wrong size for its algorithm
    #[error("malformed session key")]
    MalformedSessionKey,

    /// The session key checksum does not match the key
    #[error("session key checksum mismatch, the encrypted file is malformed or was tampered with")]
    ChecksumMismatch,

    /// Parsing, decryption, integrity check or decompression failed
    #[error(transparent)]
    Pgp(#[from] pgp::errors::Error),
}
