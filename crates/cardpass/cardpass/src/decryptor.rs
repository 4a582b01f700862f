//! Password file decryption requests

use std::collections::BTreeMap;
use std::sync::Arc;

use cardpass_apdu_core::ContextFactory;
use cardpass_apdu_transport_pcsc::PcscContextFactory;
use cardpass_message::{decrypt_with_session_key, parse_pgp_message};
use cardpass_openpgp_card::{PinCache, PinPrompt, SmartCardDecryptor, SystemState, WindowBounds};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::settings::Settings;

const KEY_ID_LEN: usize = 16;

/// One file to decrypt
#[derive(Debug, Clone, Copy)]
pub struct DecryptRequest<'a> {
    ciphertext: &'a [u8],
    key_ids: Option<&'a [String]>,
    window: Option<WindowBounds>,
}

impl<'a> DecryptRequest<'a> {
    /// Decrypt `ciphertext`, binary or armored, with any card key it is encrypted to
    pub const fn new(ciphertext: &'a [u8]) -> Self {
        Self {
            ciphertext,
            key_ids: None,
            window: None,
        }
    }

    /// Only accept these recipients
    ///
    /// Entries are hex key ids or fingerprints, matched on their last 16 digits
    /// regardless of case.
    pub const fn with_key_ids(mut self, key_ids: &'a [String]) -> Self {
        self.key_ids = Some(key_ids);
        self
    }

    /// Placement hint for the PIN prompt
    pub const fn with_window(mut self, window: WindowBounds) -> Self {
        self.window = Some(window);
        self
    }
}

/// Normalise a user supplied key id or fingerprint to a 16 digit uppercase key id
pub fn normalize_key_id(key_id: &str) -> String {
    let digits: String = key_id
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    let skip = digits.chars().count().saturating_sub(KEY_ID_LEN);
    digits.chars().skip(skip).collect()
}

/// Decrypts password files with session keys unwrapped on a card
#[derive(Debug)]
pub struct PasswordFileDecryptor<F: ContextFactory, P: PinPrompt> {
    card: SmartCardDecryptor<F, P>,
}

impl<P: PinPrompt> PasswordFileDecryptor<PcscContextFactory, P> {
    /// PC/SC backed decryptor configured from `settings`
    pub fn from_settings(settings: &Settings, prompt: P) -> Self {
        let factory = Arc::new(PcscContextFactory::new(settings.pcsc.config()));
        let pin_cache = Arc::new(PinCache::new(settings.pin_cache.idle_timeout()));
        Self::new(factory, pin_cache, prompt).with_caching(settings.pin_cache.enabled)
    }
}

impl<F: ContextFactory, P: PinPrompt> PasswordFileDecryptor<F, P> {
    /// Create a decryptor over `factory`
    pub const fn new(factory: Arc<F>, pin_cache: Arc<PinCache>, prompt: P) -> Self {
        Self {
            card: SmartCardDecryptor::new(factory, pin_cache, prompt),
        }
    }

    /// Enable or disable PIN caching
    pub fn with_caching(self, enabled: bool) -> Self {
        Self {
            card: self.card.with_caching(enabled),
        }
    }

    /// Only use the reader named `reader`
    pub fn with_reader(self, reader: Option<String>) -> Self {
        Self {
            card: self.card.with_reader(reader),
        }
    }

    /// The card side decryptor
    pub const fn card(&self) -> &SmartCardDecryptor<F, P> {
        &self.card
    }

    /// Forward a screen lock or idle notification to the PIN cache
    pub fn handle_system_state(&self, state: SystemState) {
        self.card.pin_cache().handle_system_state(state);
    }

    /// Decrypt the file in `request` to its plaintext
    #[instrument(level = "info", skip_all, fields(len = request.ciphertext.len()))]
    pub fn decrypt(&self, request: &DecryptRequest<'_>) -> Result<Zeroizing<Vec<u8>>> {
        let message = parse_pgp_message(request.ciphertext)?;
        let candidates = acceptable(message.encrypted_session_keys().clone(), request.key_ids);
        if candidates.is_empty() {
            return Err(Error::NoAcceptableRecipient);
        }
        debug!(recipients = ?candidates.keys().collect::<Vec<_>>(), "Candidate recipients");

        let raw_session_key = self
            .card
            .decrypt_session_key(&candidates, request.window.as_ref())?;
        Ok(decrypt_with_session_key(message, &raw_session_key)?)
    }
}

fn acceptable(
    candidates: BTreeMap<String, Vec<u8>>,
    key_ids: Option<&[String]>,
) -> BTreeMap<String, Vec<u8>> {
    let Some(key_ids) = key_ids else {
        return candidates;
    };
    let wanted: Vec<String> = key_ids.iter().map(|id| normalize_key_id(id)).collect();
    candidates
        .into_iter()
        .filter(|(key_id, _)| wanted.contains(key_id))
        .collect()
}
