//! PIN entry on the controlling terminal
//!
//! Input is read in raw mode so the PIN is never echoed. Esc or Ctrl-C cancels.

use std::io::{self, Write};

use cardpass::card::{PinEntry, PinPrompt, PinRequest, PromptError, WindowBounds};
use colored::Colorize;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use zeroize::{Zeroize, Zeroizing};

/// Prompts on stderr so stdout stays clean for plaintext
#[derive(Debug, Default)]
pub(crate) struct TerminalPrompt;

impl PinPrompt for TerminalPrompt {
    fn request_pin(
        &self,
        request: &PinRequest,
        _bounds: Option<&WindowBounds>,
    ) -> Result<Option<PinEntry>, PromptError> {
        let mut stderr = io::stderr();
        write!(
            stderr,
            "PIN for key {} on {} ({} tries left): ",
            request.key_id.bold(),
            request.reader_label,
            request.tries_remaining
        )?;
        stderr.flush()?;

        let Some(pin) = with_raw_mode(read_secret)? else {
            writeln!(stderr)?;
            return Ok(None);
        };
        writeln!(stderr)?;

        write!(stderr, "Remember the PIN until the card is removed? [y/N] ")?;
        stderr.flush()?;
        let cache = with_raw_mode(read_confirmation)?;
        writeln!(stderr, "{}", if cache { "y" } else { "n" })?;

        Ok(Some(PinEntry { pin, cache }))
    }
}

fn with_raw_mode<T>(read: impl FnOnce() -> io::Result<T>) -> io::Result<T> {
    terminal::enable_raw_mode()?;
    let result = read();
    terminal::disable_raw_mode()?;
    result
}

fn next_key() -> io::Result<KeyEvent> {
    loop {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                return Ok(key);
            }
        }
    }
}

fn is_cancel(key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

fn read_secret() -> io::Result<Option<Zeroizing<Vec<u8>>>> {
    read_secret_with(next_key)
}

/// Collect a PIN as UTF-8 from `keys` until Enter, `None` when cancelled
fn read_secret_with(
    mut keys: impl FnMut() -> io::Result<KeyEvent>,
) -> io::Result<Option<Zeroizing<Vec<u8>>>> {
    let mut pin = Zeroizing::new(Vec::new());
    loop {
        let key = keys()?;
        if is_cancel(&key) {
            return Ok(None);
        }
        match key.code {
            KeyCode::Enter => return Ok(Some(pin)),
            KeyCode::Backspace => pop_char(&mut pin),
            KeyCode::Char(c) => {
                let mut buf = [0u8; 4];
                pin.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                buf.zeroize();
            }
            _ => {}
        }
    }
}

/// Remove the last UTF-8 encoded character
fn pop_char(pin: &mut Vec<u8>) {
    while let Some(byte) = pin.pop() {
        if byte & 0xC0 != 0x80 {
            break;
        }
    }
}

fn read_confirmation() -> io::Result<bool> {
    let key = next_key()?;
    Ok(matches!(key.code, KeyCode::Char('y' | 'Y')))
}
