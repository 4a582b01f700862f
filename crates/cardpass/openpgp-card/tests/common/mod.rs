//! Common test utilities: a virtual OpenPGP card stack

#![allow(dead_code, unreachable_pub)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use cardpass_apdu_core::{
    Bytes, CardTransport, ContextFactory, Protocol, ReaderContext, RemovalCanceller,
    RemovalEvent, TransportError,
};
use cardpass_openpgp_card::{PinEntry, PinPrompt, PinRequest, PromptError, WindowBounds};
use iso7816_tlv::ber::{Tag, Tlv, Value};
use parking_lot::{Condvar, Mutex};

/// Key id of the default card
pub const KEY_ID: &str = "AABBCCDD11223344";

/// PIN of the default card
pub const PIN: &[u8] = b"123456";

/// What the default card deciphers every cryptogram to
pub const SESSION_KEY: &[u8] = &[0x07, 0x10, 0x20, 0x30, 0x00, 0x60];

const MAX_TRIES: u8 = 3;

/// One virtual OpenPGP card
#[derive(Debug, Clone)]
pub struct VirtualCard {
    pub fingerprint: [u8; 20],
    pub key_type: u8,
    pub pin: Vec<u8>,
    pub tries: u8,
    pub capability_flags: u8,
    pub session_key: Vec<u8>,
    verified: bool,
}

impl Default for VirtualCard {
    fn default() -> Self {
        let mut fingerprint = [0x11u8; 20];
        fingerprint[12..].copy_from_slice(&hex::decode(KEY_ID).unwrap());
        Self {
            fingerprint,
            key_type: 0x01,
            pin: PIN.to_vec(),
            tries: MAX_TRIES,
            capability_flags: 0x00,
            session_key: SESSION_KEY.to_vec(),
            verified: false,
        }
    }
}

impl VirtualCard {
    pub fn with_key_id(mut self, key_id: &str) -> Self {
        self.fingerprint[12..].copy_from_slice(&hex::decode(key_id).unwrap());
        self
    }

    pub fn with_key_type(mut self, key_type: u8) -> Self {
        self.key_type = key_type;
        self
    }

    pub fn with_tries(mut self, tries: u8) -> Self {
        self.tries = tries;
        self
    }

    pub fn with_capability_flags(mut self, flags: u8) -> Self {
        self.capability_flags = flags;
        self
    }

    fn historical_bytes(&self) -> Vec<u8> {
        vec![0x00, 0x73, 0x00, 0x00, self.capability_flags, 0x05, 0x90, 0x00]
    }

    fn application_related_data(&self) -> Vec<u8> {
        let primitive = |tag: u8, value: Vec<u8>| {
            Tlv::new(Tag::try_from(tag).unwrap(), Value::Primitive(value)).unwrap()
        };
        let constructed = |tag: u8, children: Vec<Tlv>| {
            Tlv::new(Tag::try_from(tag).unwrap(), Value::Constructed(children)).unwrap()
        };

        let mut fingerprints = vec![0u8; 60];
        fingerprints[20..40].copy_from_slice(&self.fingerprint);

        constructed(
            0x6E,
            vec![
                primitive(0x4F, vec![0xD2, 0x76, 0x00, 0x01, 0x24, 0x01, 0x03, 0x04]),
                constructed(
                    0x73,
                    vec![
                        primitive(0xC1, vec![0x01, 0x08, 0x00, 0x00, 0x20, 0x00]),
                        primitive(0xC2, vec![self.key_type, 0x08, 0x00, 0x00, 0x20, 0x00]),
                        primitive(0xC4, vec![0x00, 0x7F, 0x7F, 0x7F, self.tries, 0x00, 0x03]),
                        primitive(0xC5, fingerprints),
                    ],
                ),
            ],
        )
        .to_vec()
    }

    fn respond(&mut self, ins: u8, p1: u8, p2: u8, data: &[u8]) -> (Vec<u8>, [u8; 2]) {
        match (ins, p1, p2) {
            (0xA4, 0x04, 0x00) if data == [0xD2, 0x76, 0x00, 0x01, 0x24, 0x01] => {
                (Vec::new(), [0x90, 0x00])
            }
            (0xCA, 0x5F, 0x52) => (self.historical_bytes(), [0x90, 0x00]),
            (0xCA, 0x00, 0x6E) => (self.application_related_data(), [0x90, 0x00]),
            (0x20, 0x00, 0x82) => {
                if self.tries == 0 {
                    (Vec::new(), [0x69, 0x83])
                } else if data == self.pin.as_slice() {
                    self.tries = MAX_TRIES;
                    self.verified = true;
                    (Vec::new(), [0x90, 0x00])
                } else {
                    self.tries -= 1;
                    (Vec::new(), [0x69, 0x82])
                }
            }
            (0x2A, 0x80, 0x86) if !self.verified => (Vec::new(), [0x69, 0x82]),
            (0x2A, 0x80, 0x86) if data.first() == Some(&0x00) => {
                (self.session_key.clone(), [0x90, 0x00])
            }
            _ => (Vec::new(), [0x6D, 0x00]),
        }
    }
}

#[derive(Debug)]
struct Slot {
    name: String,
    card: Option<VirtualCard>,
}

#[derive(Debug, Default)]
struct Inner {
    slots: Vec<Slot>,
    commands: Vec<Vec<u8>>,
    verify_pins: Vec<Vec<u8>>,
    contexts_open: usize,
    contexts_established: usize,
    connections_open: usize,
    waiting: usize,
}

/// Readers and cards shared by every context of one test
#[derive(Debug, Default)]
pub struct VirtualReaders {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl VirtualReaders {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_reader(&self, name: &str, card: Option<VirtualCard>) {
        self.inner.lock().slots.push(Slot {
            name: name.to_owned(),
            card,
        });
    }

    pub fn remove_card(&self, reader: &str) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.iter_mut().find(|slot| slot.name == reader) {
            slot.card = None;
        }
        self.changed.notify_all();
    }

    /// Raw command APDUs received, in order
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.inner.lock().commands.clone()
    }

    /// Commands received with instruction `ins`
    pub fn commands_with_ins(&self, ins: u8) -> usize {
        self.inner
            .lock()
            .commands
            .iter()
            .filter(|command| command.get(1) == Some(&ins))
            .count()
    }

    /// PINs presented in VERIFY commands, in order
    pub fn verify_pins(&self) -> Vec<Vec<u8>> {
        self.inner.lock().verify_pins.clone()
    }

    pub fn tries(&self, reader: &str) -> Option<u8> {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .find(|slot| slot.name == reader)
            .and_then(|slot| slot.card.as_ref())
            .map(|card| card.tries)
    }

    pub fn contexts_open(&self) -> usize {
        self.inner.lock().contexts_open
    }

    pub fn contexts_established(&self) -> usize {
        self.inner.lock().contexts_established
    }

    pub fn connections_open(&self) -> usize {
        self.inner.lock().connections_open
    }

    /// Removal waits currently blocked
    pub fn waiting(&self) -> usize {
        self.inner.lock().waiting
    }

    fn transmit(&self, reader: &str, command: &[u8]) -> Result<Bytes, TransportError> {
        let mut inner = self.inner.lock();
        inner.commands.push(command.to_vec());

        let (ins, p1, p2) = (command[1], command[2], command[3]);
        let data = command_data(command);
        if ins == 0x20 {
            inner.verify_pins.push(data.to_vec());
        }

        let card = inner
            .slots
            .iter_mut()
            .find(|slot| slot.name == reader)
            .and_then(|slot| slot.card.as_mut())
            .ok_or(TransportError::CardRemoved)?;

        let (mut response, status) = card.respond(ins, p1, p2, data);
        response.extend_from_slice(&status);
        Ok(Bytes::from(response))
    }
}

fn command_data(command: &[u8]) -> &[u8] {
    match command.len() {
        0..=5 => &[],
        len if command[4] == 0 && len > 7 => {
            let lc = usize::from(u16::from_be_bytes([command[5], command[6]]));
            &command[7..7 + lc]
        }
        _ => {
            let lc = usize::from(command[4]);
            &command[5..5 + lc]
        }
    }
}

/// Factory handing out contexts over shared [`VirtualReaders`]
#[derive(Debug, Clone)]
pub struct VirtualCardFactory {
    readers: Arc<VirtualReaders>,
    available: bool,
}

impl VirtualCardFactory {
    pub fn new(readers: &Arc<VirtualReaders>) -> Self {
        Self {
            readers: Arc::clone(readers),
            available: true,
        }
    }

    /// A factory whose reader subsystem is not running
    pub fn unavailable(readers: &Arc<VirtualReaders>) -> Self {
        Self {
            readers: Arc::clone(readers),
            available: false,
        }
    }
}

impl ContextFactory for VirtualCardFactory {
    type Context = VirtualContext;

    fn establish(&self) -> Result<VirtualContext, TransportError> {
        if !self.available {
            return Err(TransportError::Unavailable("service not running".into()));
        }
        let mut inner = self.readers.inner.lock();
        inner.contexts_open += 1;
        inner.contexts_established += 1;
        Ok(VirtualContext {
            readers: Arc::clone(&self.readers),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[derive(Debug)]
pub struct VirtualContext {
    readers: Arc<VirtualReaders>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct VirtualCanceller {
    readers: Arc<VirtualReaders>,
    cancelled: Arc<AtomicBool>,
}

impl RemovalCanceller for VirtualCanceller {
    fn cancel(&self) -> Result<(), TransportError> {
        let _inner = self.readers.inner.lock();
        self.cancelled.store(true, Ordering::SeqCst);
        self.readers.changed.notify_all();
        Ok(())
    }
}

impl ReaderContext for VirtualContext {
    type Transport = VirtualTransport;
    type Canceller = VirtualCanceller;

    fn is_valid(&self) -> bool {
        true
    }

    fn list_readers(&self) -> Result<Vec<String>, TransportError> {
        Ok(self
            .readers
            .inner
            .lock()
            .slots
            .iter()
            .map(|slot| slot.name.clone())
            .collect())
    }

    fn connect(&self, reader: &str) -> Result<VirtualTransport, TransportError> {
        let mut inner = self.readers.inner.lock();
        let slot = inner
            .slots
            .iter_mut()
            .find(|slot| slot.name == reader)
            .ok_or_else(|| TransportError::connection(reader, "unknown reader"))?;
        let card = slot
            .card
            .as_mut()
            .ok_or_else(|| TransportError::NoCard(reader.to_owned()))?;
        card.verified = false;

        inner.connections_open += 1;
        Ok(VirtualTransport {
            readers: Arc::clone(&self.readers),
            reader: reader.to_owned(),
            connected: true,
            chained: Vec::new(),
        })
    }

    fn wait_for_removal(&self, reader: &str) -> Result<RemovalEvent, TransportError> {
        let mut inner = self.readers.inner.lock();
        inner.waiting += 1;
        let event = loop {
            let present = inner
                .slots
                .iter()
                .any(|slot| slot.name == reader && slot.card.is_some());
            if !present {
                break RemovalEvent::Removed;
            }
            if self.cancelled.load(Ordering::SeqCst) {
                break RemovalEvent::Cancelled;
            }
            self.readers.changed.wait(&mut inner);
        };
        inner.waiting -= 1;
        Ok(event)
    }

    fn removal_canceller(&self) -> VirtualCanceller {
        VirtualCanceller {
            readers: Arc::clone(&self.readers),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    fn release(self) -> Result<(), TransportError> {
        self.readers.inner.lock().contexts_open -= 1;
        Ok(())
    }
}

/// Connection to one virtual card
#[derive(Debug)]
pub struct VirtualTransport {
    readers: Arc<VirtualReaders>,
    reader: String,
    connected: bool,
    chained: Vec<u8>,
}

impl CardTransport for VirtualTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        // Collect chained frames and answer the last one for the whole payload
        if command[0] & 0x10 != 0 {
            self.chained.extend_from_slice(command_data(command));
            self.readers.inner.lock().commands.push(command.to_vec());
            return Ok(Bytes::from_static(&[0x90, 0x00]));
        }
        if !self.chained.is_empty() {
            let mut whole = command[..4].to_vec();
            let mut data = std::mem::take(&mut self.chained);
            data.extend_from_slice(command_data(command));
            whole.extend_from_slice(&[0x00, (data.len() >> 8) as u8, data.len() as u8]);
            whole.extend_from_slice(&data);
            return self.readers.transmit(&self.reader, &whole);
        }

        self.readers.transmit(&self.reader, command)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn protocol(&self) -> Protocol {
        Protocol::T1
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.connected {
            self.connected = false;
            self.readers.inner.lock().connections_open -= 1;
        }
        Ok(())
    }
}

impl Drop for VirtualTransport {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

/// Prompt answering from a script; an exhausted script cancels
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Result<Option<PinEntry>, PromptError>>>,
    requests: Mutex<Vec<PinRequest>>,
    bounds: Mutex<Vec<Option<WindowBounds>>>,
}

impl ScriptedPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, pin: &[u8], cache: bool) -> Self {
        self.answers
            .lock()
            .push_back(Ok(Some(PinEntry::new(pin.to_vec(), cache))));
        self
    }

    pub fn cancel(self) -> Self {
        self.answers.lock().push_back(Ok(None));
        self
    }

    pub fn fail(self) -> Self {
        self.answers
            .lock()
            .push_back(Err(PromptError::Other("no terminal".into())));
        self
    }

    pub fn requests(&self) -> Vec<PinRequest> {
        self.requests.lock().clone()
    }

    pub fn bounds(&self) -> Vec<Option<WindowBounds>> {
        self.bounds.lock().clone()
    }
}

impl PinPrompt for ScriptedPrompt {
    fn request_pin(
        &self,
        request: &PinRequest,
        bounds: Option<&WindowBounds>,
    ) -> Result<Option<PinEntry>, PromptError> {
        self.requests.lock().push(request.clone());
        self.bounds.lock().push(bounds.copied());
        self.answers.lock().pop_front().unwrap_or(Ok(None))
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
