//! A single reader holding a virtual OpenPGP card, and GnuPG produced files
//! encrypted to its key

#![allow(dead_code, unreachable_pub)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use cardpass::card::{PinEntry, PinPrompt, PinRequest, PromptError, WindowBounds};
use cardpass::message::checksum;
use cardpass_apdu_core::{
    Bytes, CardTransport, ContextFactory, Protocol, ReaderContext, RemovalCanceller,
    RemovalEvent, TransportError,
};
use iso7816_tlv::ber::{Tag, Tlv, Value};

pub const READER: &str = "Nitrokey Nitrokey Pro (0000000000000000000061C7) 00 00";
/// Fingerprint of the encryption key on the card
pub const FINGERPRINT: &str = "38116A2EDD68A902EF2ED7D95C5E7AF3E791E7DB";
pub const KEY_ID: &str = "5C5E7AF3E791E7DB";
/// Key id of a recipient that is not on the card
pub const OTHER_KEY_ID: &str = "612592E33AE81213";
pub const PIN: &[u8] = b"654321";
pub const PLAINTEXT: &[u8] = b"hunter2\nuser: alice\n";

/// AES-256 session keys of `zip.gpg` and `armored.asc`
const ZIP_SESSION_KEY: &str = "F73A2A348162BA21CDC77127ABD484A5CA0AB93B23E5EAD2FAB6D67A3BE82CAA";
const ARMORED_SESSION_KEY: &str =
    "BB709D354D791E1E371E7F9399673BCFF8F11E9F9B939DC6A9CBD2AA7B94FE60";

/// A GnuPG encrypted file from `tests/fixtures`
pub fn fixture(name: &str) -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()))
}

fn raw(key_hex: &str) -> Vec<u8> {
    let key = hex::decode(key_hex).unwrap();
    let mut raw = vec![9];
    raw.extend_from_slice(&key);
    raw.extend_from_slice(&checksum(&key).to_be_bytes());
    raw
}

/// What the card returns for DECIPHER of `zip.gpg`: algorithm, key and checksum
pub fn raw_session_key() -> Vec<u8> {
    raw(ZIP_SESSION_KEY)
}

/// DECIPHER result for `armored.asc`
pub fn armored_session_key() -> Vec<u8> {
    raw(ARMORED_SESSION_KEY)
}

#[derive(Debug)]
struct CardState {
    removed: bool,
    tries: u8,
    verified: bool,
    session_key: Vec<u8>,
    chained: Vec<u8>,
    cryptograms: Vec<Vec<u8>>,
    contexts_established: usize,
    verify_count: usize,
}

/// Shared state of the reader and its card
#[derive(Debug)]
pub struct Card {
    state: Mutex<CardState>,
    changed: Condvar,
}

impl Card {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CardState {
                removed: false,
                tries: 3,
                verified: false,
                session_key: raw_session_key(),
                chained: Vec::new(),
                cryptograms: Vec::new(),
                contexts_established: 0,
                verify_count: 0,
            }),
            changed: Condvar::new(),
        })
    }

    /// Make DECIPHER return `raw` instead of the session key
    pub fn set_session_key(&self, raw: Vec<u8>) {
        self.state.lock().unwrap().session_key = raw;
    }

    /// Every DECIPHER payload received, chained frames joined
    pub fn cryptograms(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().cryptograms.clone()
    }

    pub fn contexts_established(&self) -> usize {
        self.state.lock().unwrap().contexts_established
    }

    pub fn verify_count(&self) -> usize {
        self.state.lock().unwrap().verify_count
    }

    fn application_related_data(tries: u8) -> Vec<u8> {
        let primitive = |tag: u8, value: Vec<u8>| {
            Tlv::new(Tag::try_from(tag).unwrap(), Value::Primitive(value)).unwrap()
        };
        let mut fingerprints = vec![0u8; 60];
        fingerprints[20..40].copy_from_slice(&hex::decode(FINGERPRINT).unwrap());

        let discretionary = Tlv::new(
            Tag::try_from(0x73).unwrap(),
            Value::Constructed(vec![
                primitive(0xC2, vec![0x01, 0x08, 0x00, 0x00, 0x20, 0x00]),
                primitive(0xC4, vec![0x00, 0x7F, 0x7F, 0x7F, tries, 0x00, 0x03]),
                primitive(0xC5, fingerprints),
            ]),
        )
        .unwrap();
        Tlv::new(Tag::try_from(0x6E).unwrap(), Value::Constructed(vec![discretionary]))
            .unwrap()
            .to_vec()
    }

    fn respond(&self, command: &[u8]) -> Vec<u8> {
        let mut state = self.state.lock().unwrap();
        if command[0] & 0x10 != 0 {
            state.chained.extend_from_slice(command_data(command));
            return vec![0x90, 0x00];
        }
        let mut data = std::mem::take(&mut state.chained);
        data.extend_from_slice(command_data(command));

        let (mut body, status) = match (command[1], command[2], command[3]) {
            (0xA4, 0x04, 0x00) => (Vec::new(), [0x90, 0x00]),
            // Command chaining, no extended length
            (0xCA, 0x5F, 0x52) => (vec![0x00, 0x73, 0x00, 0x00, 0x80, 0x05, 0x90, 0x00], [0x90, 0x00]),
            (0xCA, 0x00, 0x6E) => (Self::application_related_data(state.tries), [0x90, 0x00]),
            (0x20, 0x00, 0x82) => {
                state.verify_count += 1;
                if data == PIN {
                    state.tries = 3;
                    state.verified = true;
                    (Vec::new(), [0x90, 0x00])
                } else {
                    state.tries -= 1;
                    (Vec::new(), [0x69, 0x82])
                }
            }
            (0x2A, 0x80, 0x86) if state.verified => {
                state.cryptograms.push(data);
                (state.session_key.clone(), [0x90, 0x00])
            }
            (0x2A, 0x80, 0x86) => (Vec::new(), [0x69, 0x82]),
            _ => (Vec::new(), [0x6D, 0x00]),
        };
        body.extend_from_slice(&status);
        body
    }
}

#[derive(Debug, Clone)]
pub struct CardFactory(pub Arc<Card>);

impl ContextFactory for CardFactory {
    type Context = CardContext;

    fn establish(&self) -> Result<CardContext, TransportError> {
        self.0.state.lock().unwrap().contexts_established += 1;
        Ok(CardContext(Arc::clone(&self.0), Arc::default()))
    }
}

#[derive(Debug)]
pub struct CardContext(Arc<Card>, Arc<AtomicBool>);

#[derive(Debug)]
pub struct CardCanceller(Arc<Card>, Arc<AtomicBool>);

impl RemovalCanceller for CardCanceller {
    fn cancel(&self) -> Result<(), TransportError> {
        let _state = self.0.state.lock().unwrap();
        self.1.store(true, Ordering::SeqCst);
        self.0.changed.notify_all();
        Ok(())
    }
}

impl ReaderContext for CardContext {
    type Transport = CardConnection;
    type Canceller = CardCanceller;

    fn is_valid(&self) -> bool {
        true
    }

    fn list_readers(&self) -> Result<Vec<String>, TransportError> {
        Ok(vec![READER.to_owned()])
    }

    fn connect(&self, reader: &str) -> Result<CardConnection, TransportError> {
        if reader != READER {
            return Err(TransportError::connection(reader, "unknown reader"));
        }
        self.0.state.lock().unwrap().verified = false;
        Ok(CardConnection(Some(Arc::clone(&self.0))))
    }

    fn wait_for_removal(&self, _reader: &str) -> Result<RemovalEvent, TransportError> {
        let mut state = self.0.state.lock().unwrap();
        while !state.removed {
            if self.1.load(Ordering::SeqCst) {
                return Ok(RemovalEvent::Cancelled);
            }
            state = self.0.changed.wait(state).unwrap();
        }
        Ok(RemovalEvent::Removed)
    }

    fn removal_canceller(&self) -> CardCanceller {
        CardCanceller(Arc::clone(&self.0), Arc::clone(&self.1))
    }

    fn release(self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct CardConnection(Option<Arc<Card>>);

impl CardTransport for CardConnection {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        let card = self.0.as_ref().ok_or(TransportError::NotConnected)?;
        Ok(Bytes::from(card.respond(command)))
    }

    fn is_connected(&self) -> bool {
        self.0.is_some()
    }

    fn protocol(&self) -> Protocol {
        Protocol::T1
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.0 = None;
        Ok(())
    }
}

/// Answers every request with `PIN`, or cancels
#[derive(Debug, Default)]
pub struct FixedPrompt {
    pub cancel: bool,
    pub cache: bool,
    pub requests: Mutex<Vec<PinRequest>>,
}

impl PinPrompt for FixedPrompt {
    fn request_pin(
        &self,
        request: &PinRequest,
        _bounds: Option<&WindowBounds>,
    ) -> Result<Option<PinEntry>, PromptError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok((!self.cancel).then(|| PinEntry::new(PIN, self.cache)))
    }
}

impl FixedPrompt {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn command_data(command: &[u8]) -> &[u8] {
    if command.len() > 5 {
        &command[5..5 + usize::from(command[4])]
    } else {
        &[]
    }
}
