//! Decrypt OpenPGP password files with a private key that never leaves a smart card
//!
//! [`PasswordFileDecryptor`] ties the two halves together: the message layer finds
//! the session keys encrypted to each recipient, the card layer finds a card holding
//! one of those keys, unlocks it and unwraps the session key, and the message layer
//! decrypts the body with it.
//!
//! ```no_run
//! use cardpass::{DecryptRequest, PasswordFileDecryptor, Settings};
//! # use cardpass::card::{PinEntry, PinPrompt, PinRequest, PromptError, WindowBounds};
//! # #[derive(Debug)]
//! # struct Terminal;
//! # impl PinPrompt for Terminal {
//! #     fn request_pin(
//! #         &self,
//! #         _: &PinRequest,
//! #         _: Option<&WindowBounds>,
//! #     ) -> Result<Option<PinEntry>, PromptError> {
//! #         Ok(None)
//! #     }
//! # }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(None)?;
//! let decryptor = PasswordFileDecryptor::from_settings(&settings, Terminal);
//!
//! let ciphertext = std::fs::read("github.com.gpg")?;
//! let plaintext = decryptor.decrypt(&DecryptRequest::new(&ciphertext))?;
//! # let _ = plaintext;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

mod decryptor;
mod error;
pub mod settings;

pub use decryptor::{DecryptRequest, PasswordFileDecryptor, normalize_key_id};
pub use error::{Error, Result};
pub use settings::{PcscSettings, PinCacheSettings, Settings};

pub use cardpass_message as message;
pub use cardpass_openpgp_card as card;
