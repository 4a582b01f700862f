//! Error types for PC/SC transport

use std::fmt;

use cardpass_apdu_core::TransportError;

/// PC/SC-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    Pcsc(#[from] pcsc::Error),

    /// Reader name cannot be passed to PC/SC
    InvalidReaderName(String),

    /// No card present in reader
    NoCard(String),

    /// Card was removed
    CardRemoved,

    /// Context establishment did not finish in time
    EstablishTimeout,

    /// Other error
    Other(String),
}

impl fmt::Display for PcscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pcsc(e) => write!(f, "PC/SC error: {}", e),
            Self::InvalidReaderName(r) => write!(f, "Invalid reader name: {:?}", r),
            Self::NoCard(r) => write!(f, "No card present in reader: {}", r),
            Self::CardRemoved => write!(f, "Card was removed"),
            Self::EstablishTimeout => write!(f, "PC/SC service did not answer in time"),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::Pcsc(
                pcsc::Error::NoService | pcsc::Error::ServiceStopped | pcsc::Error::NoReadersAvailable,
            )
            | PcscError::EstablishTimeout => Self::Unavailable(error.to_string()),
            PcscError::Pcsc(pcsc::Error::RemovedCard) | PcscError::CardRemoved => Self::CardRemoved,
            PcscError::Pcsc(pcsc::Error::Timeout) => Self::Timeout,
            PcscError::Pcsc(pcsc::Error::Cancelled) => Self::Cancelled,
            PcscError::NoCard(reader) => Self::NoCard(reader),
            other => Self::Other(other.to_string()),
        }
    }
}
