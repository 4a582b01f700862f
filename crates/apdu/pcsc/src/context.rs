//! Reader context backed by the PC/SC resource manager

use std::ffi::CString;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use cardpass_apdu_core::{
    ContextFactory, Protocol, ReaderContext, RemovalCanceller, RemovalEvent, TransportError,
};
use crossbeam_channel::RecvTimeoutError;
use pcsc::{Context, Protocols, ReaderState, State};
use tracing::{debug, trace};

use crate::config::PcscConfig;
use crate::error::PcscError;
use crate::reader::PcscReader;
use crate::transport::PcscTransport;

/// Cards are always held exclusively so no other process can talk to the card
/// between verifying the PIN and deciphering
pub(crate) const SHARE_MODE: pcsc::ShareMode = pcsc::ShareMode::Exclusive;

/// Longest single status change wait, bounding how late a cancel can be noticed
const STATUS_POLL: Duration = Duration::from_millis(500);

/// Establishes PC/SC contexts, bounded by the configured timeout
#[derive(Debug, Clone, Default)]
pub struct PcscContextFactory {
    config: PcscConfig,
}

impl PcscContextFactory {
    /// Create a factory using `config`
    pub const fn new(config: PcscConfig) -> Self {
        Self { config }
    }

    /// Configuration applied to every context
    pub const fn config(&self) -> &PcscConfig {
        &self.config
    }
}

impl ContextFactory for PcscContextFactory {
    type Context = PcscContext;

    fn establish(&self) -> Result<PcscContext, TransportError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let scope = self.config.scope.into();

        // SCardEstablishContext can hang when the service is wedged, so it runs on its
        // own thread and is abandoned past the timeout.
        thread::Builder::new()
            .name("pcsc-establish".into())
            .spawn(move || {
                let _ = tx.send(Context::establish(scope));
            })
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        match rx.recv_timeout(self.config.establish_timeout) {
            Ok(Ok(context)) => {
                debug!(scope = ?self.config.scope, "Established PC/SC context");
                Ok(PcscContext {
                    context,
                    config: self.config.clone(),
                    cancelled: Arc::new(AtomicBool::new(false)),
                })
            }
            Ok(Err(e)) => Err(TransportError::Unavailable(PcscError::from(e).to_string())),
            Err(RecvTimeoutError::Timeout) => Err(PcscError::EstablishTimeout.into()),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Unavailable(
                "context establishment exited without a result".into(),
            )),
        }
    }
}

/// An established PC/SC context
pub struct PcscContext {
    context: Context,
    config: PcscConfig,
    cancelled: Arc<AtomicBool>,
}

impl fmt::Debug for PcscContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscContext")
            .field("valid", &self.context.is_valid().is_ok())
            .field("config", &self.config)
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}

/// Cancels removal waits on a [`PcscContext`] with `SCardCancel`
///
/// Holds a clone of the context, so drop it before releasing the context.
pub struct PcscCanceller {
    context: Context,
    cancelled: Arc<AtomicBool>,
}

impl fmt::Debug for PcscCanceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscCanceller")
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RemovalCanceller for PcscCanceller {
    fn cancel(&self) -> Result<(), TransportError> {
        self.cancelled.store(true, Ordering::SeqCst);
        match self.context.cancel() {
            Ok(()) | Err(pcsc::Error::InvalidHandle) => Ok(()),
            Err(e) => Err(PcscError::from(e).into()),
        }
    }
}

impl PcscContext {
    /// Readers with their card presence
    pub fn reader_status(&self) -> Result<Vec<PcscReader>, TransportError> {
        let names = self.reader_names()?;
        let mut states: Vec<ReaderState> = names
            .into_iter()
            .map(|name| ReaderState::new(name, State::UNAWARE))
            .collect();

        if states.is_empty() {
            return Ok(Vec::new());
        }

        self.context
            .get_status_change(None, &mut states)
            .map_err(PcscError::from)?;

        Ok(states.iter().map(PcscReader::from_reader_state).collect())
    }

    fn reader_names(&self) -> Result<Vec<CString>, TransportError> {
        match self.context.list_readers_owned() {
            Ok(readers) => Ok(readers),
            Err(pcsc::Error::NoReadersAvailable) => Ok(Vec::new()),
            Err(e) => Err(PcscError::from(e).into()),
        }
    }

    fn negotiated_protocol(&self) -> Protocol {
        if self.config.protocols.contains(Protocols::T1) {
            Protocol::T1
        } else if self.config.protocols.contains(Protocols::T0) {
            Protocol::T0
        } else {
            Protocol::Raw
        }
    }
}

fn reader_cstring(reader: &str) -> Result<CString, TransportError> {
    CString::new(reader)
        .map_err(|_| TransportError::connection(reader, PcscError::InvalidReaderName(reader.into())))
}

impl ReaderContext for PcscContext {
    type Transport = PcscTransport;
    type Canceller = PcscCanceller;

    fn is_valid(&self) -> bool {
        self.context.is_valid().is_ok()
    }

    fn list_readers(&self) -> Result<Vec<String>, TransportError> {
        Ok(self
            .reader_names()?
            .into_iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    fn connect(&self, reader: &str) -> Result<PcscTransport, TransportError> {
        let name = reader_cstring(reader)?;

        match self
            .context
            .connect(&name, SHARE_MODE, self.config.protocols)
        {
            Ok(card) => {
                let protocol = self.negotiated_protocol();
                debug!(reader, %protocol, "Connected to card exclusively");
                Ok(PcscTransport::new(card, reader.to_owned(), protocol))
            }
            Err(pcsc::Error::NoSmartcard) => Err(PcscError::NoCard(reader.to_owned()).into()),
            Err(pcsc::Error::RemovedCard) => Err(TransportError::CardRemoved),
            Err(e) => Err(TransportError::connection(reader, PcscError::from(e))),
        }
    }

    fn wait_for_removal(&self, reader: &str) -> Result<RemovalEvent, TransportError> {
        let name = reader_cstring(reader)?;
        let mut states = [ReaderState::new(name, State::UNAWARE)];

        // An UNAWARE query returns the current state straight away
        self.context
            .get_status_change(None, &mut states)
            .map_err(PcscError::from)?;

        loop {
            let state = states[0].event_state();
            trace!(reader, ?state, "Reader state");
            if !state.contains(State::PRESENT) {
                return Ok(RemovalEvent::Removed);
            }
            if self.cancelled.load(Ordering::SeqCst) {
                return Ok(RemovalEvent::Cancelled);
            }

            states[0].sync_current_state();
            match self.context.get_status_change(STATUS_POLL, &mut states) {
                Ok(()) | Err(pcsc::Error::Timeout) => {}
                Err(pcsc::Error::Cancelled) => return Ok(RemovalEvent::Cancelled),
                Err(e) => return Err(PcscError::from(e).into()),
            }
        }
    }

    fn removal_canceller(&self) -> PcscCanceller {
        PcscCanceller {
            context: self.context.clone(),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    fn release(self) -> Result<(), TransportError> {
        self.context
            .release()
            .map_err(|(_, e)| PcscError::from(e).into())
    }
}
