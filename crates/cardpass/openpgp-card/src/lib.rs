//! OpenPGP card support for decrypting password files
//!
//! This crate talks to an OpenPGP card through the reader abstraction of
//! `cardpass-apdu-core` and deciphers RSA encrypted session keys on the card.
//!
//! - [`tlv`] decodes the BER-TLV data objects and COMPACT-TLV historical bytes.
//! - [`CardSession`] is the connection state machine: context, connect, select,
//!   read key information, verify the PIN, decipher, disconnect.
//! - [`PinCache`] keeps verified PINs encrypted in memory until the card is removed or
//!   the workstation locks.
//! - [`SmartCardDecryptor`] finds the card holding one of the wanted keys and drives
//!   the PIN loop through a [`PinPrompt`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod commands;
pub mod constants;
pub mod decrypt;
pub mod error;
pub mod pin_cache;
pub mod prompt;
pub mod session;
pub mod tlv;
pub mod watcher;

pub use decrypt::{SmartCardDecryptor, verify_and_wipe};
pub use error::{Error, Result, TokenUnavailable};
pub use pin_cache::{PinCache, PinCacheError, SystemState};
pub use prompt::{PinEntry, PinPrompt, PinRequest, PromptError, WindowBounds, short_reader_name};
pub use session::{CardSession, KeyType, SessionState};
pub use tlv::{DataObject, TlvError};
pub use watcher::{RemovalWatch, WatchOutcome};
