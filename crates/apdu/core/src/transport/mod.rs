//! Transport traits for APDU communication with cards
//!
//! Three layers abstract the reader stack:
//!
//! - [`ContextFactory`] establishes a [`ReaderContext`], the handle on the reader
//!   subsystem (a PC/SC context, or a virtual one in tests).
//! - [`ReaderContext`] enumerates readers, opens card connections and can block until
//!   a card leaves its reader. A [`RemovalCanceller`] ends that wait from another
//!   thread.
//! - [`CardTransport`] moves raw APDU bytes over one open connection.

pub mod error;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Transmission protocol negotiated for a card connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Protocol {
    /// Character oriented T=0
    #[display("T=0")]
    T0,
    /// Block oriented T=1
    #[display("T=1")]
    T1,
    /// Raw reader access
    #[display("raw")]
    Raw,
}

/// Trait for basic card transports
///
/// A transport is responsible for sending and receiving raw APDU bytes.
/// It has no knowledge of command structure or protocol details.
pub trait CardTransport: Send + fmt::Debug {
    /// Send raw APDU bytes to card and return response bytes
    ///
    /// This method should handle the low-level communication with the card
    /// but should not interpret the contents or handle protocol-specific
    /// operations like GET RESPONSE.
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = ?hex::encode(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = ?hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    /// This is the method that concrete implementations should override
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Check if the transport is connected to a physical card
    fn is_connected(&self) -> bool;

    /// Protocol negotiated when the connection was opened
    fn protocol(&self) -> Protocol;

    /// Close the connection, leaving the card powered. Idempotent.
    fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// What ended a [`ReaderContext::wait_for_removal`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalEvent {
    /// The card is no longer present in the reader
    Removed,
    /// The wait was cancelled before the card left
    Cancelled,
}

/// Ends a [`ReaderContext::wait_for_removal`] from another thread
///
/// Cancelling is sticky: a wait that starts after [`RemovalCanceller::cancel`] returns
/// [`RemovalEvent::Cancelled`] straight away.
pub trait RemovalCanceller: Send + Sync + fmt::Debug {
    /// Cancel the pending or next wait on the context this came from
    fn cancel(&self) -> Result<(), TransportError>;
}

/// A handle on the reader subsystem
pub trait ReaderContext: Send + fmt::Debug {
    /// Transport produced by [`ReaderContext::connect`]
    type Transport: CardTransport;

    /// Canceller produced by [`ReaderContext::removal_canceller`]
    type Canceller: RemovalCanceller + 'static;

    /// Whether the handle is still usable
    fn is_valid(&self) -> bool;

    /// Names of the readers currently visible, in subsystem order
    fn list_readers(&self) -> Result<Vec<String>, TransportError>;

    /// Open an exclusive connection to the card in `reader`
    fn connect(&self, reader: &str) -> Result<Self::Transport, TransportError>;

    /// Block until the card in `reader` is gone, or the wait is cancelled
    fn wait_for_removal(&self, reader: &str) -> Result<RemovalEvent, TransportError>;

    /// Handle that cancels [`ReaderContext::wait_for_removal`] on this context
    fn removal_canceller(&self) -> Self::Canceller;

    /// Release the handle
    fn release(self) -> Result<(), TransportError>;
}

/// Establishes reader contexts
///
/// A factory is shared between the active session and background watchers, each of
/// which establishes its own context.
pub trait ContextFactory: Send + Sync + fmt::Debug + 'static {
    /// Context type
    type Context: ReaderContext + 'static;

    /// Establish a new context
    fn establish(&self) -> Result<Self::Context, TransportError>;
}

#[cfg(test)]
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub(crate) struct MockTransport {
    /// Mock responses to return
    pub(crate) responses: Vec<Bytes>,
    /// Commands that were sent
    pub(crate) commands: Vec<Bytes>,
    /// Whether the transport is connected
    pub(crate) connected: bool,
}

#[cfg(test)]
impl MockTransport {
    /// Create a new mock transport with the given responses
    pub(crate) const fn new(responses: Vec<Bytes>) -> Self {
        Self {
            responses,
            commands: Vec::new(),
            connected: true,
        }
    }
}

#[cfg(test)]
impl CardTransport for MockTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        self.commands.push(Bytes::copy_from_slice(command));

        if self.responses.is_empty() {
            return Err(TransportError::Transmission("no scripted response".into()));
        }

        // Either clone the single response or take the next one
        if self.responses.len() == 1 {
            Ok(self.responses[0].clone())
        } else {
            Ok(self.responses.remove(0))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn protocol(&self) -> Protocol {
        Protocol::T1
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        Ok(())
    }
}
