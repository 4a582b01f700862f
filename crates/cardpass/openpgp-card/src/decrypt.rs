//! Session key decryption on whichever card holds a wanted key
//!
//! [`SmartCardDecryptor::decrypt_session_key`] takes the encrypted session keys of a
//! message keyed by recipient key id. It checks every reader for a card whose
//! decryption key is one of those ids, unlocks it with a cached or prompted PIN and
//! lets the card decipher the matching session key.

use std::collections::BTreeMap;
use std::sync::Arc;

use cardpass_apdu_core::ContextFactory;
use tracing::{debug, info, instrument, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result, TokenUnavailable};
use crate::pin_cache::PinCache;
use crate::prompt::{PinEntry, PinPrompt, PinRequest, WindowBounds};
use crate::session::{CardSession, KeyType};
use crate::watcher::spawn_removal_watcher;

/// Verify `pin` and wipe it afterwards, whatever the outcome.
///
/// `on_verified` sees the PIN before it is wiped, only when the card accepted it.
pub fn verify_and_wipe<F, V>(
    session: &mut CardSession<F>,
    pin: &mut Zeroizing<Vec<u8>>,
    on_verified: V,
) -> Result<bool>
where
    F: ContextFactory,
    V: FnOnce(&[u8]) -> Result<()>,
{
    let result = match session.verify_pin(pin.as_slice()) {
        Ok(true) => on_verified(pin.as_slice()).map(|()| true),
        other => other,
    };
    pin.zeroize();
    result
}

enum ReaderCheck {
    Usable(String),
    Skipped(TokenUnavailable),
}

/// Decrypts session keys with an OpenPGP card
#[derive(Debug)]
pub struct SmartCardDecryptor<F: ContextFactory, P: PinPrompt> {
    factory: Arc<F>,
    pin_cache: Arc<PinCache>,
    prompt: P,
    caching_enabled: bool,
    reader: Option<String>,
}

impl<F: ContextFactory, P: PinPrompt> SmartCardDecryptor<F, P> {
    /// Create a decryptor that caches PINs when the user asks for it
    pub const fn new(factory: Arc<F>, pin_cache: Arc<PinCache>, prompt: P) -> Self {
        Self {
            factory,
            pin_cache,
            prompt,
            caching_enabled: true,
            reader: None,
        }
    }

    /// Enable or disable the PIN cache for this decryptor
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching_enabled = enabled;
        self
    }

    /// Only consider the reader named `reader`, or every reader when `None`
    pub fn with_reader(mut self, reader: Option<String>) -> Self {
        self.reader = reader;
        self
    }

    /// The prompt asked for PINs
    pub const fn prompt(&self) -> &P {
        &self.prompt
    }

    /// The PIN cache shared with removal watchers
    pub const fn pin_cache(&self) -> &Arc<PinCache> {
        &self.pin_cache
    }

    /// Decipher the session key encrypted to the first usable card.
    ///
    /// `candidates` maps uppercase hex key ids to the RSA cryptogram of the session key
    /// encrypted to that key. The returned bytes are the raw session key block as the
    /// card produced it; the caller validates its checksum.
    #[instrument(level = "info", skip_all, fields(candidates = candidates.len()))]
    pub fn decrypt_session_key(
        &self,
        candidates: &BTreeMap<String, Vec<u8>>,
        bounds: Option<&WindowBounds>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let mut session = CardSession::new(Arc::clone(&self.factory));
        let result = self.decrypt_with(&mut session, candidates, bounds);

        if let Err(e) = session.release_context() {
            warn!(error = %e, "Failed to release the card session");
        }

        match &result {
            Err(e) if e.is_cancelled() => debug!("PIN entry cancelled"),
            Err(e) => warn!(error = %e, "Smart card decryption failed"),
            Ok(_) => info!("Session key decrypted on card"),
        }
        result
    }

    fn decrypt_with(
        &self,
        session: &mut CardSession<F>,
        candidates: &BTreeMap<String, Vec<u8>>,
        bounds: Option<&WindowBounds>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        session.establish_context()?;
        let key_id = self.connect_matching(session, candidates)?;
        let reader = session.reader().ok_or(Error::NotConnected)?.to_owned();
        let entry_id = PinCache::entry_id(&key_id, &reader);

        loop {
            let tries_remaining = session.fetch_pin_tries_remaining()?;
            if tries_remaining == 0 {
                return Err(Error::PinBlocked);
            }

            let request = PinRequest::new(&reader, &key_id, tries_remaining);
            let (mut entry, from_cache) = self.obtain_pin(&entry_id, &request, bounds)?;
            let cache = self.caching_enabled && entry.cache;

            let verified = verify_and_wipe(session, &mut entry.pin, |pin| {
                if cache {
                    self.remember_pin(&entry_id, &reader, pin)
                } else {
                    Ok(())
                }
            })?;
            if verified {
                break;
            }

            if from_cache {
                debug!("Cached PIN was rejected");
                self.pin_cache.set_pin(&entry_id, None)?;
            }
        }

        let cryptogram = candidates
            .get(&key_id)
            .ok_or_else(|| Error::MissingSessionKey(key_id.clone()))?;
        session.decrypt(cryptogram)
    }

    /// Leave `session` connected to the first reader with a usable matching card and
    /// return the candidate key id it holds
    fn connect_matching(
        &self,
        session: &mut CardSession<F>,
        candidates: &BTreeMap<String, Vec<u8>>,
    ) -> Result<String> {
        let readers = session.list_readers()?;
        debug!(readers = readers.len(), "Looking for a matching token");

        let mut reason = TokenUnavailable::NoMatch;
        let wanted = |reader: &&String| self.reader.as_ref().is_none_or(|name| name == *reader);
        for reader in readers.iter().filter(wanted) {
            match check_reader(session, reader, candidates) {
                Ok(ReaderCheck::Usable(key_id)) => {
                    debug!(%reader, %key_id, "Found matching token");
                    return Ok(key_id);
                }
                Ok(ReaderCheck::Skipped(why)) => {
                    debug!(%reader, %why, "Skipping reader");
                    reason = reason.max(why);
                }
                Err(e) => warn!(%reader, error = %e, "Failed to read key information, skipping"),
            }

            if let Err(e) = session.disconnect() {
                debug!(%reader, error = %e, "Disconnect failed");
            }
        }

        Err(Error::NoUsableToken(reason))
    }

    fn obtain_pin(
        &self,
        entry_id: &str,
        request: &PinRequest,
        bounds: Option<&WindowBounds>,
    ) -> Result<(PinEntry, bool)> {
        if self.caching_enabled {
            match self.pin_cache.get_pin(entry_id) {
                Ok(Some(pin)) => {
                    debug!("Using cached PIN");
                    return Ok((PinEntry { pin, cache: false }, true));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable cached PIN");
                    self.pin_cache.set_pin(entry_id, None)?;
                }
            }
        }

        match self.prompt.request_pin(request, bounds) {
            Ok(Some(entry)) => Ok((entry, false)),
            Ok(None) => Err(Error::Cancelled),
            Err(e) => {
                warn!(error = %e, "PIN prompt failed");
                Err(Error::Cancelled)
            }
        }
    }

    fn remember_pin(&self, entry_id: &str, reader: &str, pin: &[u8]) -> Result<()> {
        self.pin_cache.set_pin(entry_id, Some(pin))?;

        let cache = Arc::clone(&self.pin_cache);
        let id = entry_id.to_owned();
        let evict = Box::new(move || {
            if let Err(e) = cache.set_pin(&id, None) {
                warn!(error = %e, "Failed to evict cached PIN");
            }
        });

        match spawn_removal_watcher(Arc::clone(&self.factory), reader, evict) {
            Ok(watch) => {
                self.pin_cache.watch_entry(entry_id, watch);
            }
            Err(e) => {
                // Without a watcher nothing would evict the entry on removal
                warn!(error = %e, "Could not watch reader, not caching PIN");
                self.pin_cache.set_pin(entry_id, None)?;
            }
        }
        Ok(())
    }
}

fn check_reader<F: ContextFactory>(
    session: &mut CardSession<F>,
    reader: &str,
    candidates: &BTreeMap<String, Vec<u8>>,
) -> Result<ReaderCheck> {
    session.connect(reader)?;
    session.select_applet()?;

    let card_key_id = session.fetch_key_id()?;
    let Some(key_id) = candidates
        .keys()
        .find(|candidate| candidate.eq_ignore_ascii_case(&card_key_id))
    else {
        return Ok(ReaderCheck::Skipped(TokenUnavailable::NoMatch));
    };

    if session.fetch_pin_tries_remaining()? == 0 {
        return Ok(ReaderCheck::Skipped(TokenUnavailable::Blocked));
    }

    if session.fetch_key_type()? != KeyType::Rsa {
        return Ok(ReaderCheck::Skipped(TokenUnavailable::UnsupportedKeyType));
    }

    Ok(ReaderCheck::Usable(key_id.clone()))
}
