//! Core traits and types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types and traits for talking to smart cards
//! with APDU commands and responses according to ISO/IEC 7816-4.
//!
//! ## Overview
//!
//! - [`Command`] builds the raw frames of a logical command, choosing between short
//!   and extended length encoding and splitting oversized payloads into a command
//!   chain when the card advertises it.
//! - [`Response`] splits a raw response into payload and [`StatusWord`] and classifies
//!   it as a [`ResponseOutcome`].
//! - [`CardTransport`], [`ReaderContext`] and [`ContextFactory`] abstract the reader
//!   stack so the same session logic runs against PC/SC or a virtual card.
//! - [`CardExecutor`] sends every frame of a command, follows `61 XX` with
//!   GET RESPONSE and hands back the assembled outcome.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod error;
pub mod executor;
pub mod response;
pub mod transport;

pub use command::{Capabilities, Command};
pub use error::{Error, ResultExt};
pub use executor::CardExecutor;
pub use response::status::StatusWord;
pub use response::{Response, ResponseOutcome};
pub use transport::{
    CardTransport, ContextFactory, Protocol, ReaderContext, RemovalCanceller, RemovalEvent,
    TransportError,
};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{Bytes, BytesMut, Error, ResultExt};

    pub use crate::command::{Capabilities, Command};

    pub use crate::response::status::{StatusWord, common as status};
    pub use crate::response::{Response, ResponseOutcome};

    pub use crate::transport::{
        CardTransport, ContextFactory, Protocol, ReaderContext, RemovalCanceller, RemovalEvent,
        TransportError,
    };

    pub use crate::executor::CardExecutor;
}
