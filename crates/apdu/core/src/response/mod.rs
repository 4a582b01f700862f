//! APDU response definitions
//!
//! A raw response is the payload followed by the two status bytes. Rather than
//! turning every non-success status into an error at this level, a response is
//! classified as a [`ResponseOutcome`] so callers can treat expected statuses
//! (wrong PIN, more data pending) as ordinary values.

pub mod status;

use bytes::Bytes;
use tracing::trace;

use crate::Error;
use status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data
    payload: Bytes,
    /// Status word
    status: StatusWord,
}

/// Classification of a single response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// `90 00` with the payload
    Success(Bytes),
    /// `61 XX`, the card holds `remaining` more bytes for GET RESPONSE
    MoreData {
        /// Payload delivered with this response
        data: Bytes,
        /// SW2, the number of bytes still pending (0 means 256 or more)
        remaining: u8,
    },
    /// Any other status word
    CardStatus(StatusWord),
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(payload: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload: payload.into(),
            status: status.into(),
        }
    }

    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 2 {
            return Err(Error::ResponseTooShort(data.len()));
        }

        let (payload, sw) = data.split_at(data.len() - 2);
        let status = StatusWord::new(sw[0], sw[1]);

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            payload_len = payload.len(),
            "Parsed APDU response"
        );

        Ok(Self {
            payload: Bytes::copy_from_slice(payload),
            status,
        })
    }

    /// Response payload
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Classify the response
    pub fn into_outcome(self) -> ResponseOutcome {
        if self.status.is_success() {
            ResponseOutcome::Success(self.payload)
        } else if let Some(remaining) = self.status.remaining_bytes() {
            ResponseOutcome::MoreData {
                data: self.payload,
                remaining,
            }
        } else {
            ResponseOutcome::CardStatus(self.status)
        }
    }
}

impl ResponseOutcome {
    /// Data of a successful outcome, or the status as an error
    pub fn into_data(self) -> Result<Bytes, Error> {
        match self {
            Self::Success(data) => Ok(data),
            Self::CardStatus(status) => Err(Error::Status(status)),
            Self::MoreData { .. } => Err(Error::Protocol("response not fully assembled")),
        }
    }
}
