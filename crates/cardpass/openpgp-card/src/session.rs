//! OpenPGP card session
//!
//! A [`CardSession`] owns at most one reader context and one exclusive card
//! connection. It walks through [`SessionState`] as the context is established, a
//! reader is connected and the OpenPGP application is selected. Teardown is
//! idempotent and also runs on drop.

use std::sync::Arc;

use cardpass_apdu_core::{
    CardExecutor, CardTransport, ContextFactory, ReaderContext, ResponseOutcome, ResultExt,
};
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::commands;
use crate::constants::{DECRYPTION_FINGERPRINT_RANGE, KEY_TYPE_RSA, PW1_TRIES_INDEX, tags};
use crate::error::{Error, Result};
use crate::tlv::{self, DataObject};
use crate::watcher::{RemovalCallback, RemovalWatch, spawn_removal_watcher};

/// Transport of the contexts established by `F`
pub type SessionTransport<F> = <<F as ContextFactory>::Context as ReaderContext>::Transport;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No reader context
    NoContext,
    /// A context is established, no card is connected
    ContextEstablished,
    /// Connected to a card
    Connected,
    /// Connected with the OpenPGP application selected
    AppletSelected,
}

/// Algorithm of the decryption key
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum KeyType {
    /// RSA
    #[display("RSA")]
    Rsa,
    /// Any other algorithm id
    #[display("algorithm {_0:#04X}")]
    Other(u8),
}

impl KeyType {
    /// Map the first byte of the algorithm attributes
    pub const fn from_attribute(id: u8) -> Self {
        match id {
            KEY_TYPE_RSA => Self::Rsa,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug)]
struct Connection<T: CardTransport> {
    reader: String,
    executor: CardExecutor<T>,
}

/// Session with one OpenPGP card at a time
#[derive(Debug)]
pub struct CardSession<F: ContextFactory> {
    factory: Arc<F>,
    context: Option<F::Context>,
    connection: Option<Connection<SessionTransport<F>>>,
    applet_selected: bool,
    pin_verified: bool,
}

impl<F: ContextFactory> CardSession<F> {
    /// Create a session without a context
    pub const fn new(factory: Arc<F>) -> Self {
        Self {
            factory,
            context: None,
            connection: None,
            applet_selected: false,
            pin_verified: false,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        match (&self.context, &self.connection) {
            (_, Some(_)) if self.applet_selected => SessionState::AppletSelected,
            (_, Some(_)) => SessionState::Connected,
            (Some(_), None) => SessionState::ContextEstablished,
            (None, None) => SessionState::NoContext,
        }
    }

    /// Reader of the open connection
    pub fn reader(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.reader.as_str())
    }

    /// Whether the PIN was verified on the open connection
    pub const fn is_pin_verified(&self) -> bool {
        self.pin_verified
    }

    /// Establish a reader context unless a valid one exists
    #[instrument(level = "debug", skip_all)]
    pub fn establish_context(&mut self) -> Result<()> {
        if self.context.as_ref().is_some_and(|c| c.is_valid()) {
            return Ok(());
        }

        if let Some(stale) = self.context.take() {
            debug!("Dropping invalid reader context");
            let _ = stale.release();
        }

        let context = self
            .factory
            .establish()
            .map_err(Error::EnvironmentUnavailable)?;
        debug!("Reader context established");
        self.context = Some(context);
        Ok(())
    }

    fn valid_context(&self) -> Result<&F::Context> {
        self.context
            .as_ref()
            .filter(|c| c.is_valid())
            .ok_or(Error::NoContext)
    }

    fn ensure_disconnected(&self) -> Result<()> {
        match &self.connection {
            Some(connection) => Err(Error::AlreadyConnected(connection.reader.clone())),
            None => Ok(()),
        }
    }

    /// Names of the visible readers
    pub fn list_readers(&self) -> Result<Vec<String>> {
        self.ensure_disconnected()?;
        self.valid_context()?
            .list_readers()
            .map_err(Error::ReaderEnumeration)
    }

    /// Open an exclusive connection to the card in `reader`
    #[instrument(level = "debug", skip(self))]
    pub fn connect(&mut self, reader: &str) -> Result<()> {
        self.ensure_disconnected()?;
        let transport = self.valid_context()?.connect(reader)?;
        debug!(protocol = %transport.protocol(), "Connected");

        self.connection = Some(Connection {
            reader: reader.to_owned(),
            executor: CardExecutor::new(transport),
        });
        self.applet_selected = false;
        self.pin_verified = false;
        Ok(())
    }

    fn executor(&mut self) -> Result<&mut CardExecutor<SessionTransport<F>>> {
        self.connection
            .as_mut()
            .map(|c| &mut c.executor)
            .ok_or(Error::NotConnected)
    }

    fn selected_executor(&mut self) -> Result<&mut CardExecutor<SessionTransport<F>>> {
        if !self.applet_selected {
            return Err(match self.connection {
                Some(_) => Error::AppletNotSelected,
                None => Error::NotConnected,
            });
        }
        self.executor()
    }

    /// Select the OpenPGP application and negotiate framing capabilities
    #[instrument(level = "debug", skip_all)]
    pub fn select_applet(&mut self) -> Result<()> {
        if self.applet_selected {
            return Ok(());
        }

        let executor = self.executor()?;
        executor
            .transmit(&commands::select_openpgp())
            .context("SELECT OpenPGP application")?;

        let historical = executor
            .transmit(&commands::get_data(tags::HISTORICAL_BYTES))
            .context("GET DATA historical bytes")?;
        let capabilities = tlv::parse_capabilities(&historical).ok_or(Error::CapabilitiesMissing)?;
        executor.set_capabilities(capabilities);
        debug!(
            chaining = capabilities.chaining,
            extended_length = capabilities.extended_length,
            "OpenPGP application selected"
        );

        self.applet_selected = true;
        Ok(())
    }

    /// Application related data object tree
    pub fn application_related_data(&mut self) -> Result<DataObject> {
        let data = self
            .selected_executor()?
            .transmit(&commands::get_data(tags::APPLICATION_RELATED_DATA))
            .context("GET DATA application related data")?;
        Ok(tlv::decode(&data)?)
    }

    /// Fingerprint of the decryption key, uppercase hex
    pub fn fetch_fingerprint(&mut self) -> Result<String> {
        let data = self.application_related_data()?;
        let fingerprint = data
            .lookup_value(tags::FINGERPRINTS)
            .and_then(|fingerprints| fingerprints.get(DECRYPTION_FINGERPRINT_RANGE))
            .ok_or(Error::MissingDataObject("fingerprints"))?;
        Ok(hex::encode_upper(fingerprint))
    }

    /// Key id of the decryption key: the last 16 hex digits of its fingerprint
    pub fn fetch_key_id(&mut self) -> Result<String> {
        let fingerprint = self.fetch_fingerprint()?;
        Ok(fingerprint[fingerprint.len() - 16..].to_owned())
    }

    /// Algorithm of the decryption key
    pub fn fetch_key_type(&mut self) -> Result<KeyType> {
        let data = self.application_related_data()?;
        data.lookup_value(tags::ALGORITHM_ATTRIBUTES_DECRYPTION)
            .and_then(|attributes| attributes.first())
            .map(|&id| KeyType::from_attribute(id))
            .ok_or(Error::MissingDataObject("decryption algorithm attributes"))
    }

    /// Remaining user PIN retries
    pub fn fetch_pin_tries_remaining(&mut self) -> Result<u8> {
        let data = self.application_related_data()?;
        data.lookup_value(tags::PW_STATUS)
            .and_then(|status| status.get(PW1_TRIES_INDEX))
            .copied()
            .ok_or(Error::MissingDataObject("PW status bytes"))
    }

    /// Verify the user PIN for decryption.
    ///
    /// Returns `false` for a wrong PIN. A blocked PIN is [`Error::PinBlocked`]; any
    /// other status is an error.
    #[instrument(level = "debug", skip_all)]
    pub fn verify_pin(&mut self, pin: &[u8]) -> Result<bool> {
        let frame = commands::verify_pin_frame(pin).ok_or(Error::PinTooLong)?;
        let outcome = self.selected_executor()?.exchange_raw(&frame)?;
        drop(frame);

        match outcome {
            ResponseOutcome::Success(_) => {
                debug!("PIN verified");
                self.pin_verified = true;
                Ok(true)
            }
            ResponseOutcome::CardStatus(status) if status.is_security_condition_not_satisfied() => {
                warn!("Wrong PIN");
                Ok(false)
            }
            ResponseOutcome::CardStatus(status) if status.is_authentication_blocked() => {
                warn!("PIN blocked during verification");
                Err(Error::PinBlocked)
            }
            ResponseOutcome::CardStatus(status) => {
                Err(cardpass_apdu_core::Error::Status(status).with_context("VERIFY").into())
            }
            ResponseOutcome::MoreData { .. } => Err(cardpass_apdu_core::Error::Protocol(
                "unassembled response to VERIFY",
            )
            .into()),
        }
    }

    /// Decipher an RSA cryptogram with the card's decryption key
    #[instrument(level = "debug", skip_all, fields(len = cryptogram.len()))]
    pub fn decrypt(&mut self, cryptogram: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let plaintext = self
            .selected_executor()?
            .transmit(&commands::decipher(cryptogram))
            .context("PSO:DECIPHER")?;
        Ok(Zeroizing::new(plaintext.to_vec()))
    }

    /// Run `callback` once the card leaves `reader`, watching from a separate context
    pub fn call_on_reader_removed(
        &self,
        reader: &str,
        callback: RemovalCallback,
    ) -> Result<RemovalWatch> {
        spawn_removal_watcher(Arc::clone(&self.factory), reader, callback)
            .map_err(|e| cardpass_apdu_core::TransportError::other(e.to_string()).into())
    }

    /// Close the card connection. Idempotent.
    pub fn disconnect(&mut self) -> Result<()> {
        self.applet_selected = false;
        self.pin_verified = false;

        if let Some(Connection { reader, executor }) = self.connection.take() {
            executor.into_transport().disconnect()?;
            debug!(%reader, "Disconnected");
        }
        Ok(())
    }

    /// Close the connection and release the context. Idempotent.
    pub fn release_context(&mut self) -> Result<()> {
        let disconnected = self.disconnect();

        if let Some(context) = self.context.take() {
            context.release()?;
            debug!("Reader context released");
        }
        disconnected
    }
}

impl<F: ContextFactory> Drop for CardSession<F> {
    fn drop(&mut self) {
        if let Err(e) = self.release_context() {
            warn!(error = %e, "Session teardown failed");
        }
    }
}
