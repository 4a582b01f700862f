//! Card executor
//!
//! The executor owns a transport and the capabilities negotiated with the card. It
//! frames commands, follows `61 XX` responses with GET RESPONSE and concatenates the
//! data into one outcome.

use bytes::{Bytes, BytesMut};
use tracing::{Level, debug, info, instrument, trace, warn};

use crate::command::{Capabilities, Command};
use crate::error::Error;
use crate::response::{Response, ResponseOutcome};
use crate::response::status::StatusWord;
use crate::transport::CardTransport;

/// Default number of GET RESPONSE rounds before giving up
pub const DEFAULT_MAX_CHAIN: usize = 10;

/// Executes commands over a transport
#[derive(Debug)]
pub struct CardExecutor<T: CardTransport> {
    transport: T,
    capabilities: Capabilities,
    max_chain: usize,
}

impl<T: CardTransport> CardExecutor<T> {
    /// Create a new executor without chaining or extended length
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            capabilities: Capabilities::NONE,
            max_chain: DEFAULT_MAX_CHAIN,
        }
    }

    /// Capabilities used for framing
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Replace the capabilities used for framing
    pub const fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
    }

    /// Set the GET RESPONSE round limit
    pub fn with_max_chain(mut self, max_chain: usize) -> Self {
        self.max_chain = max_chain;
        self
    }

    /// Get a reference to the transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the transport
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Take back the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Send a command and return its assembled outcome.
    ///
    /// Never returns [`ResponseOutcome::MoreData`]. If a frame of a chained command
    /// answers with a non-success status the remaining frames are not sent and that
    /// status is returned.
    #[instrument(level = "debug", skip_all, fields(ins = command.instruction()))]
    pub fn exchange(&mut self, command: &Command) -> Result<ResponseOutcome, Error> {
        let frames = command.frames(self.capabilities)?;
        trace!(frames = frames.len(), "Sending command");

        let mut data = BytesMut::new();
        for frame in frames {
            match self.exchange_raw(&frame)? {
                ResponseOutcome::Success(chunk) => data.extend_from_slice(&chunk),
                outcome => return Ok(outcome),
            }
        }

        Ok(ResponseOutcome::Success(data.freeze()))
    }

    /// Send a command and return its data, turning any card status into an error
    pub fn transmit(&mut self, command: &Command) -> Result<Bytes, Error> {
        self.exchange(command)?.into_data()
    }

    /// Send one already framed APDU and assemble its response.
    ///
    /// Used for frames the caller has to own, such as a VERIFY frame that must be
    /// wiped after the exchange.
    pub fn exchange_raw(&mut self, frame: &[u8]) -> Result<ResponseOutcome, Error> {
        let raw = self.transport.transmit_raw(frame)?;
        let mut outcome = Response::from_bytes(&raw)?.into_outcome();
        let mut data = BytesMut::new();
        let mut rounds = 0;

        loop {
            match outcome {
                ResponseOutcome::Success(chunk) => {
                    data.extend_from_slice(&chunk);
                    return Ok(ResponseOutcome::Success(data.freeze()));
                }
                ResponseOutcome::MoreData {
                    data: chunk,
                    remaining,
                } => {
                    data.extend_from_slice(&chunk);
                    rounds += 1;
                    if rounds > self.max_chain {
                        return Err(Error::ChainLimitExceeded(self.max_chain));
                    }

                    trace!(remaining, "Requesting remaining response data");
                    let get_response = Command::get_response().frames(self.capabilities)?;
                    let mut next = None;
                    for frame in get_response {
                        next = Some(self.transport.transmit_raw(&frame)?);
                    }
                    let raw = next.ok_or(Error::Protocol("GET RESPONSE produced no frame"))?;
                    outcome = Response::from_bytes(&raw)?.into_outcome();
                }
                ResponseOutcome::CardStatus(status) => {
                    log_status(status);
                    return Ok(ResponseOutcome::CardStatus(status));
                }
            }
        }
    }
}

fn log_status(status: StatusWord) {
    let description = status.description();
    match status.tracing_level() {
        Level::WARN => warn!(%status, description, "Card returned status"),
        Level::INFO => info!(%status, description, "Card returned status"),
        _ => debug!(%status, description, "Card returned status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn test_get_response_assembly() {
        let transport = MockTransport::new(vec![
            Bytes::from_static(&[0x01, 0x02, 0x61, 0x02]),
            Bytes::from_static(&[0x03, 0x04, 0x90, 0x00]),
        ]);
        let mut executor = CardExecutor::new(transport);

        let data = executor
            .transmit(&Command::new(0x00, 0xCA, 0x00, 0x6E))
            .unwrap();
        assert_eq!(data.as_ref(), &[0x01, 0x02, 0x03, 0x04]);

        let commands = &executor.transport().commands;
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1].as_ref(), &[0x00, 0xC0, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_card_status_is_an_outcome() {
        let transport = MockTransport::new(vec![Bytes::from_static(&[0x69, 0x82])]);
        let mut executor = CardExecutor::new(transport);

        let cmd = Command::new_with_data(0x00, 0x20, 0x00, 0x82, vec![0x31; 6]).without_response();
        let outcome = executor.exchange(&cmd).unwrap();
        assert_eq!(
            outcome,
            ResponseOutcome::CardStatus(StatusWord::new(0x69, 0x82))
        );

        let err = executor.transmit(&cmd).unwrap_err();
        assert_eq!(err.status_word(), Some(StatusWord::new(0x69, 0x82)));
    }

    #[test]
    fn test_chained_command_concatenates_data() {
        let transport = MockTransport::new(vec![
            Bytes::from_static(&[0x90, 0x00]),
            Bytes::from_static(&[0xAA, 0xBB, 0x90, 0x00]),
        ]);
        let mut executor = CardExecutor::new(transport);
        executor.set_capabilities(Capabilities::new(true, false));

        let cmd = Command::new_with_data(0x00, 0x2A, 0x80, 0x86, vec![0x00; 300]);
        let data = executor.transmit(&cmd).unwrap();
        assert_eq!(data.as_ref(), &[0xAA, 0xBB]);

        let commands = &executor.transport().commands;
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0][0], 0x10);
        assert_eq!(commands[1][0], 0x00);
    }

    #[test]
    fn test_chain_stops_on_status() {
        let transport = MockTransport::new(vec![
            Bytes::from_static(&[0x68, 0x84]),
            Bytes::from_static(&[0x90, 0x00]),
        ]);
        let mut executor = CardExecutor::new(transport);
        executor.set_capabilities(Capabilities::new(true, false));

        let cmd = Command::new_with_data(0x00, 0x2A, 0x80, 0x86, vec![0x00; 300]);
        let outcome = executor.exchange(&cmd).unwrap();
        assert_eq!(
            outcome,
            ResponseOutcome::CardStatus(StatusWord::new(0x68, 0x84))
        );
        assert_eq!(executor.transport().commands.len(), 1);
    }

    #[test]
    fn test_chain_limit() {
        let transport = MockTransport::new(vec![Bytes::from_static(&[0x00, 0x61, 0x01])]);
        let mut executor = CardExecutor::new(transport).with_max_chain(3);

        let err = executor
            .transmit(&Command::new(0x00, 0xCA, 0x00, 0x6E))
            .unwrap_err();
        assert!(matches!(err, Error::ChainLimitExceeded(3)));
        assert_eq!(executor.transport().commands.len(), 4);
    }
}
