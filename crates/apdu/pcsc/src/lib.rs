//! PC/SC implementation of the APDU reader stack
//!
//! [`PcscContextFactory`] establishes [`PcscContext`]s against the system resource
//! manager. A context opens exclusive [`PcscTransport`] connections and can block until
//! a card leaves its reader, which lets a second context watch for removal while the
//! first one holds the card.
//!
//! ```no_run
//! use cardpass_apdu_core::prelude::*;
//! use cardpass_apdu_transport_pcsc::{PcscConfig, PcscContextFactory};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = PcscContextFactory::new(PcscConfig::default());
//! let context = factory.establish()?;
//!
//! for reader in context.list_readers()? {
//!     println!("{reader}");
//! }
//! context.release()?;
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

mod config;
mod context;
mod error;
mod reader;
mod transport;

pub use config::{ContextScope, DEFAULT_ESTABLISH_TIMEOUT, PcscConfig};
pub use context::{PcscCanceller, PcscContext, PcscContextFactory};
pub use error::PcscError;
pub use reader::PcscReader;
pub use transport::PcscTransport;

/// Re-export pcsc types that appear in the configuration
pub use pcsc::Protocols;
