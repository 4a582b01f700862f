//! In-memory PIN cache
//!
//! PINs are kept AES-128-CBC encrypted under a key that lives only in this process.
//! The key is generated on first use and discarded together with every entry whenever
//! the workstation goes idle or locks, or when the cache sat unused past its idle
//! timeout. Entries also disappear one by one when their reader loses its card; an
//! entry owns the [`RemovalWatch`] on its reader and cancels it once it goes away.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use parking_lot::Mutex;
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use crate::watcher::RemovalWatch;

type Encryptor = cbc::Encryptor<aes::Aes128>;
type Decryptor = cbc::Decryptor<aes::Aes128>;

const KEY_LEN: usize = 16;
const IV_LEN: usize = 16;

/// Default time the cache may sit unused before it wipes itself
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from the PIN cache
#[derive(Debug, thiserror::Error)]
pub enum PinCacheError {
    /// Key or IV of the wrong size
    #[error("invalid cache key material")]
    KeyMaterial,
    /// A stored entry does not decrypt
    #[error("cached PIN could not be decrypted")]
    Corrupted,
}

/// Workstation state as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    /// The user is active
    Active,
    /// No input for a while
    Idle,
    /// The session is locked
    Locked,
}

#[derive(Debug)]
struct CachedPin {
    ciphertext: Vec<u8>,
    iv: [u8; IV_LEN],
    watch: Option<RemovalWatch>,
}

impl CachedPin {
    fn retire(self) {
        if let Some(watch) = self.watch {
            watch.cancel();
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    key: Option<Zeroizing<[u8; KEY_LEN]>>,
    entries: HashMap<String, CachedPin>,
    last_used: Option<Instant>,
}

impl CacheState {
    fn wipe(&mut self) {
        self.key = None;
        self.entries.drain().for_each(|(_, entry)| entry.retire());
        self.last_used = None;
    }

    fn key(&mut self) -> &[u8; KEY_LEN] {
        self.key.get_or_insert_with(|| {
            let mut key = Zeroizing::new([0u8; KEY_LEN]);
            rand::rng().fill_bytes(key.as_mut());
            key
        })
    }
}

/// Process-wide PIN cache, shared behind an `Arc`
#[derive(Debug)]
pub struct PinCache {
    state: Mutex<CacheState>,
    idle_timeout: Option<Duration>,
}

impl Default for PinCache {
    fn default() -> Self {
        Self::new(Some(DEFAULT_IDLE_TIMEOUT))
    }
}

impl PinCache {
    /// Create an empty cache. `None` disables the idle wipe.
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            idle_timeout,
        }
    }

    /// Cache entry identifier for a key on a reader
    pub fn entry_id(key_id: &str, reader: &str) -> String {
        format!("{key_id}:{reader}")
    }

    /// Store `pin` under `id`, or evict `id` when `pin` is `None`
    pub fn set_pin(&self, id: &str, pin: Option<&[u8]>) -> Result<(), PinCacheError> {
        let mut state = self.state.lock();
        self.expire(&mut state);

        let Some(pin) = pin else {
            if let Some(entry) = state.entries.remove(id) {
                entry.retire();
                debug!(id, "Evicted cached PIN");
            }
            return Ok(());
        };

        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);
        let ciphertext = Encryptor::new_from_slices(state.key(), &iv)
            .map_err(|_| PinCacheError::KeyMaterial)?
            .encrypt_padded_vec_mut::<Pkcs7>(pin);

        let entry = CachedPin {
            ciphertext,
            iv,
            watch: None,
        };
        if let Some(previous) = state.entries.insert(id.to_owned(), entry) {
            previous.retire();
        }
        state.last_used = Some(Instant::now());
        debug!(id, "Cached PIN");
        Ok(())
    }

    /// Decrypt the PIN cached under `id`
    pub fn get_pin(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>, PinCacheError> {
        let mut state = self.state.lock();
        self.expire(&mut state);

        let Some(key) = state.key.as_deref() else {
            return Ok(None);
        };
        let Some(entry) = state.entries.get(id) else {
            return Ok(None);
        };

        let pin = Decryptor::new_from_slices(key, &entry.iv)
            .map_err(|_| PinCacheError::KeyMaterial)?
            .decrypt_padded_vec_mut::<Pkcs7>(&entry.ciphertext)
            .map_err(|_| PinCacheError::Corrupted)?;

        state.last_used = Some(Instant::now());
        Ok(Some(Zeroizing::new(pin)))
    }

    /// Tie `watch` to the entry under `id`, cancelled when the entry goes away
    ///
    /// Returns `false`, cancelling `watch`, when nothing is cached under `id`.
    pub fn watch_entry(&self, id: &str, watch: RemovalWatch) -> bool {
        let mut state = self.state.lock();
        self.expire(&mut state);

        let Some(entry) = state.entries.get_mut(id) else {
            watch.cancel();
            return false;
        };
        if let Some(previous) = entry.watch.replace(watch) {
            previous.cancel();
        }
        true
    }

    /// Whether a PIN is cached under `id`
    pub fn contains(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        self.expire(&mut state);
        state.entries.contains_key(id)
    }

    /// Number of cached PINs
    pub fn len(&self) -> usize {
        let mut state = self.state.lock();
        self.expire(&mut state);
        state.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and the cache key
    pub fn clear(&self) {
        self.state.lock().wipe();
        debug!("PIN cache cleared");
    }

    /// React to a workstation state change
    pub fn handle_system_state(&self, system_state: SystemState) {
        match system_state {
            SystemState::Idle | SystemState::Locked => {
                debug!(?system_state, "Wiping PIN cache");
                self.clear();
            }
            SystemState::Active => {}
        }
    }

    fn expire(&self, state: &mut CacheState) {
        let (Some(timeout), Some(last_used)) = (self.idle_timeout, state.last_used) else {
            return;
        };
        if last_used.elapsed() >= timeout {
            debug!(?timeout, "PIN cache idle, wiping");
            state.wipe();
        }
    }
}
