//! PC/SC transport implementation

use std::fmt;

use bytes::Bytes;
use cardpass_apdu_core::{CardTransport, Protocol, TransportError};
use pcsc::{Card, Disposition};
use tracing::debug;

use crate::error::PcscError;

/// Transport over one PC/SC card connection
pub struct PcscTransport {
    /// Card connection, cleared on disconnect or removal
    card: Option<Card>,
    /// Reader name
    reader_name: String,
    /// Protocol requested at connect time
    protocol: Protocol,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl PcscTransport {
    pub(crate) const fn new(card: Card, reader_name: String, protocol: Protocol) -> Self {
        Self {
            card: Some(card),
            reader_name,
            protocol,
        }
    }

    /// Get the reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    fn transmit_command(&mut self, command: &[u8]) -> Result<Bytes, PcscError> {
        let card = self
            .card
            .as_mut()
            .ok_or_else(|| PcscError::NoCard(self.reader_name.clone()))?;

        let mut response_buffer = vec![0u8; pcsc::MAX_BUFFER_SIZE_EXTENDED];

        match card.transmit(command, &mut response_buffer) {
            Ok(response) => Ok(Bytes::copy_from_slice(response)),
            Err(e) => {
                // If card was reset or removed, the handle is useless
                if matches!(e, pcsc::Error::ResetCard | pcsc::Error::RemovedCard) {
                    debug!(reader = %self.reader_name, error = %e, "Dropping card handle");
                    self.card = None;
                }
                Err(e.into())
            }
        }
    }
}

impl CardTransport for PcscTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.transmit_command(command).map_err(TransportError::from)
    }

    fn is_connected(&self) -> bool {
        self.card.is_some()
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        match self.card.take() {
            Some(card) => card
                .disconnect(Disposition::LeaveCard)
                .map_err(|(_, e)| PcscError::from(e).into()),
            None => Ok(()),
        }
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        if let Some(card) = self.card.take() {
            let _ = card.disconnect(Disposition::LeaveCard);
        }
    }
}
