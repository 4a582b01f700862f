//! OpenPGP message layer for password files
//!
//! Parses binary or armored messages with `pgp`, lists the encrypted session keys
//! per recipient key id, and once a card has unwrapped one, validates it and
//! decrypts the body to the literal data plaintext.
//!
//! ```ignore
//! let message = cardpass_message::parse_pgp_message(&ciphertext)?;
//! let candidates = message.encrypted_session_keys().clone();
//! // ... have a card decrypt one of `candidates` into `raw_session_key`
//! let plaintext = cardpass_message::decrypt_with_session_key(message, &raw_session_key)?;
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

mod decrypt;
mod error;
mod message;
mod session_key;

pub use decrypt::decrypt_with_session_key;
pub use error::{Error, Result};
pub use message::{PgpMessage, parse_pgp_message};
pub use pgp::crypto::sym::SymmetricKeyAlgorithm;
pub use session_key::{SessionKey, checksum};
