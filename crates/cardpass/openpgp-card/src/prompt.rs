//! PIN prompt contract
//!
//! The card layer never draws anything itself. When a PIN is needed it hands a
//! [`PinRequest`] and an optional placement hint to a [`PinPrompt`] and gets back the
//! PIN bytes and whether the user wants them cached, or nothing on cancel.

use zeroize::Zeroizing;

/// Width of the PIN dialog
pub const PIN_PROMPT_WIDTH: u32 = 350;

/// Height of the PIN dialog
pub const PIN_PROMPT_HEIGHT: u32 = 200;

/// Distance of the PIN dialog from the top of the screen
pub const PIN_PROMPT_TOP: u32 = 36;

/// Errors a prompt implementation may report
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// The prompt could not talk to the user
    #[error("PIN prompt failed: {0}")]
    Io(#[from] std::io::Error),
    /// Anything else
    #[error("PIN prompt failed: {0}")]
    Other(String),
}

/// Outer bounds of the window the PIN dialog is placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    /// Left edge in pixels
    pub left: u32,
    /// Top edge in pixels
    pub top: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl WindowBounds {
    /// Bounds of a PIN dialog centred on a screen `available_width` pixels wide
    pub const fn pin_prompt(available_width: u32) -> Self {
        Self {
            left: available_width.saturating_sub(PIN_PROMPT_WIDTH) / 2,
            top: PIN_PROMPT_TOP,
            width: PIN_PROMPT_WIDTH,
            height: PIN_PROMPT_HEIGHT,
        }
    }
}

/// What the user is asked to unlock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinRequest {
    /// Full reader name
    pub reader: String,
    /// Reader name for display, see [`short_reader_name`]
    pub reader_label: String,
    /// Key id of the decryption key, uppercase hex
    pub key_id: String,
    /// Retries left before the PIN blocks
    pub tries_remaining: u8,
}

impl PinRequest {
    /// Describe a PIN request for `key_id` on `reader`
    pub fn new(reader: &str, key_id: &str, tries_remaining: u8) -> Self {
        Self {
            reader: reader.to_owned(),
            reader_label: short_reader_name(reader).to_owned(),
            key_id: key_id.to_owned(),
            tries_remaining,
        }
    }
}

/// A PIN typed by the user
#[derive(Debug)]
pub struct PinEntry {
    /// PIN bytes
    pub pin: Zeroizing<Vec<u8>>,
    /// Keep the PIN cached until the card is removed or the workstation locks
    pub cache: bool,
}

impl PinEntry {
    /// Wrap PIN bytes typed by the user
    pub fn new(pin: impl Into<Vec<u8>>, cache: bool) -> Self {
        Self {
            pin: Zeroizing::new(pin.into()),
            cache,
        }
    }
}

/// Collects a PIN from the user
pub trait PinPrompt {
    /// Ask for the PIN. `Ok(None)` means the user cancelled.
    fn request_pin(
        &self,
        request: &PinRequest,
        bounds: Option<&WindowBounds>,
    ) -> Result<Option<PinEntry>, PromptError>;
}

impl<P: PinPrompt + ?Sized> PinPrompt for &P {
    fn request_pin(
        &self,
        request: &PinRequest,
        bounds: Option<&WindowBounds>,
    ) -> Result<Option<PinEntry>, PromptError> {
        (**self).request_pin(request, bounds)
    }
}

/// Display names for common tokens, matched by substring in order
const READER_NAMES: &[(&str, &str)] = &[
    ("Yubikey NEO-N", "YubiKey NEO-N"),
    ("Yubikey NEO", "YubiKey NEO"),
    ("Yubikey 4", "YubiKey 4"),
    ("Nitrokey Start", "Nitrokey Start"),
    ("Nitrokey Pro", "Nitrokey Pro"),
    ("Nitrokey Storage", "Nitrokey Storage"),
    ("Gemalto USB Shell Token", "Gemalto Shell Token"),
    ("Gemalto PC Twin Reader", "Gemalto Twin Reader"),
];

/// Short display name of a reader, or the name itself when it is not a known token
pub fn short_reader_name(reader: &str) -> &str {
    READER_NAMES
        .iter()
        .find(|(pattern, _)| reader.contains(pattern))
        .map_or(reader, |(_, short)| *short)
}
