//! Reader removal watcher
//!
//! The watcher runs on its own thread with its own reader context, so it never touches
//! the exclusive connection of the session that armed it. It fires its callback once,
//! when the card leaves the reader or when watching fails, then releases its context
//! and reports how it ended on a one-shot channel. [`RemovalWatch::cancel`] ends it
//! early without running the callback.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cardpass_apdu_core::{
    ContextFactory, ReaderContext, RemovalCanceller, RemovalEvent, TransportError,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Callback run when the watched card goes away
pub type RemovalCallback = Box<dyn FnOnce() + Send + 'static>;

/// How a watcher finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The card left the reader; the callback ran
    Removed,
    /// The wait was cancelled; the callback did not run
    Cancelled,
    /// Watching failed; the callback ran
    Failed(TransportError),
}

/// Cancel state shared between a handle and its watcher thread
#[derive(Debug, Default)]
struct CancelSlot {
    cancelled: bool,
    canceller: Option<Box<dyn RemovalCanceller>>,
}

/// Handle on a running removal watcher
///
/// Dropping the handle detaches the watcher; it keeps running until it fires.
#[derive(Debug)]
pub struct RemovalWatch {
    reader: String,
    outcome: Receiver<WatchOutcome>,
    slot: Arc<Mutex<CancelSlot>>,
}

impl RemovalWatch {
    /// Reader being watched
    pub fn reader(&self) -> &str {
        &self.reader
    }

    /// Outcome if the watcher has finished
    pub fn try_outcome(&self) -> Option<WatchOutcome> {
        match self.outcome.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Stop watching. The callback will not run unless it already has.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        if slot.cancelled {
            return;
        }
        slot.cancelled = true;
        if let Some(canceller) = &slot.canceller {
            if let Err(e) = canceller.cancel() {
                warn!(reader = %self.reader, error = %e, "Failed to cancel removal watcher");
            }
        }
        debug!(reader = %self.reader, "Cancelling removal watcher");
    }

    /// Block up to `timeout` for the watcher to finish
    pub fn wait(&self, timeout: Duration) -> Option<WatchOutcome> {
        match self.outcome.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Watch `reader` on a fresh context from `factory` and run `callback` once its card
/// is gone
pub fn spawn_removal_watcher<F: ContextFactory>(
    factory: Arc<F>,
    reader: &str,
    callback: RemovalCallback,
) -> std::io::Result<RemovalWatch> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let watched = reader.to_owned();
    let slot = Arc::new(Mutex::new(CancelSlot::default()));
    let thread_slot = Arc::clone(&slot);

    thread::Builder::new()
        .name("reader-removal".into())
        .spawn(move || {
            let outcome = watch(factory.as_ref(), &watched, &thread_slot);
            match &outcome {
                WatchOutcome::Removed => {
                    debug!(reader = %watched, "Card removed");
                    callback();
                }
                WatchOutcome::Failed(e) => {
                    warn!(reader = %watched, error = %e, "Removal watcher failed");
                    callback();
                }
                WatchOutcome::Cancelled => {
                    debug!(reader = %watched, "Removal watcher cancelled");
                }
            }
            let _ = tx.send(outcome);
        })?;

    debug!(reader, "Armed removal watcher");
    Ok(RemovalWatch {
        reader: reader.to_owned(),
        outcome: rx,
        slot,
    })
}

fn watch<F: ContextFactory>(
    factory: &F,
    reader: &str,
    slot: &Mutex<CancelSlot>,
) -> WatchOutcome {
    let context = match factory.establish() {
        Ok(context) => context,
        Err(_) if slot.lock().cancelled => return WatchOutcome::Cancelled,
        Err(e) => return WatchOutcome::Failed(e),
    };

    let armed = {
        let mut slot = slot.lock();
        if !slot.cancelled {
            slot.canceller = Some(Box::new(context.removal_canceller()));
        }
        !slot.cancelled
    };
    let event = armed.then(|| context.wait_for_removal(reader));

    // The canceller holds on to the context, so it goes before the release
    let outcome = {
        let mut slot = slot.lock();
        slot.canceller = None;
        match event {
            _ if slot.cancelled => WatchOutcome::Cancelled,
            None | Some(Ok(RemovalEvent::Cancelled)) => WatchOutcome::Cancelled,
            Some(Ok(RemovalEvent::Removed)) => WatchOutcome::Removed,
            Some(Err(e)) => WatchOutcome::Failed(e),
        }
    };

    if let Err(e) = context.release() {
        debug!(reader, error = %e, "Failed to release watcher context");
    }
    outcome
}
