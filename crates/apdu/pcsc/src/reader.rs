//! Reader status snapshot

use pcsc::{ReaderState, State};

/// A reader and whether it currently holds a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcscReader {
    name: String,
    card_present: bool,
    atr: Option<Vec<u8>>,
}

impl PcscReader {
    /// Get the reader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if a card is present in the reader
    pub const fn card_present(&self) -> bool {
        self.card_present
    }

    /// Get the ATR of the card if present
    pub fn atr(&self) -> Option<&[u8]> {
        self.atr.as_deref()
    }

    pub(crate) fn from_reader_state(reader_state: &ReaderState) -> Self {
        let state = reader_state.event_state();
        let card_present = state.contains(State::PRESENT) && !state.contains(State::EMPTY);

        Self {
            name: reader_state.name().to_string_lossy().into_owned(),
            card_present,
            atr: card_present.then(|| reader_state.atr().to_vec()),
        }
    }
}
