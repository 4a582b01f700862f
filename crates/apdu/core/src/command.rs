//! APDU command definitions and framing
//!
//! A [`Command`] is the logical request. The bytes that actually go over the wire
//! depend on what the card supports, so a command is turned into one or more frames
//! with [`Command::frames`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::Error;

/// Largest payload carried by a short-length frame
pub const MAX_SHORT_LC: usize = 255;

/// Largest payload carried by an extended-length frame
pub const MAX_EXTENDED_LC: usize = 65535;

/// Class byte bit set on every frame of a chain except the last one
pub const CLA_CHAINING: u8 = 0x10;

/// Framing capabilities negotiated with a card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// The card accepts command chaining
    pub chaining: bool,
    /// The card accepts extended length Lc/Le fields
    pub extended_length: bool,
}

impl Capabilities {
    /// Capabilities of a card that supports neither chaining nor extended length
    pub const NONE: Self = Self::new(false, false);

    /// Create a new capability set
    pub const fn new(chaining: bool, extended_length: bool) -> Self {
        Self {
            chaining,
            extended_length,
        }
    }
}

/// A logical APDU command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Bytes,
    expect_response: bool,
}

impl Command {
    /// Create a command without payload that expects response data
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Bytes::new(),
            expect_response: true,
        }
    }

    /// Create a command carrying a payload
    pub fn new_with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: impl Into<Bytes>) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Replace the payload
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Mark the command as not expecting response data, omitting the Le field
    pub fn without_response(mut self) -> Self {
        self.expect_response = false;
        self
    }

    /// The ISO7816-4 `GET RESPONSE` command
    pub const fn get_response() -> Self {
        Self::new(0x00, 0xC0, 0x00, 0x00)
    }

    /// Command class (CLA)
    pub const fn class(&self) -> u8 {
        self.cla
    }

    /// Instruction code (INS)
    pub const fn instruction(&self) -> u8 {
        self.ins
    }

    /// First parameter (P1)
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter (P2)
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Command payload
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Whether the frames carry an Le field
    pub const fn expects_response(&self) -> bool {
        self.expect_response
    }

    /// The four header bytes
    pub const fn header(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    /// Encode the command into the frames to transmit, in order.
    ///
    /// - Without payload a single frame is produced, with a 3-byte Le when extended
    ///   length is supported, a 1-byte Le otherwise, and no Le at all when no response
    ///   is expected.
    /// - A payload of up to [`MAX_EXTENDED_LC`] bytes goes in a single extended-length
    ///   frame when the card supports it.
    /// - Otherwise the payload is cut into chunks of at most [`MAX_SHORT_LC`] bytes.
    ///   Every chunk but the last has [`CLA_CHAINING`] set in its class byte. More than
    ///   one chunk requires chaining support.
    ///
    /// # Errors
    ///
    /// [`Error::PayloadTooLarge`] when the payload cannot be framed with the given
    /// capabilities.
    pub fn frames(&self, capabilities: Capabilities) -> Result<Vec<Bytes>, Error> {
        let length = self.data.len();

        if length == 0 {
            let mut frame = BytesMut::with_capacity(7);
            frame.put_slice(&self.header());
            if self.expect_response {
                if capabilities.extended_length {
                    frame.put_slice(&[0x00, 0x00, 0x00]);
                } else {
                    frame.put_u8(0x00);
                }
            }
            return Ok(vec![frame.freeze()]);
        }

        if capabilities.extended_length && length <= MAX_EXTENDED_LC {
            let mut frame = BytesMut::with_capacity(4 + 3 + length + 2);
            frame.put_slice(&self.header());
            frame.put_u8(0x00);
            frame.put_u16(length as u16);
            frame.put_slice(&self.data);
            if self.expect_response {
                frame.put_slice(&[0x00, 0x00]);
            }
            return Ok(vec![frame.freeze()]);
        }

        if length <= MAX_SHORT_LC || capabilities.chaining {
            let count = length.div_ceil(MAX_SHORT_LC);
            let frames = (0..count)
                .map(|index| {
                    let start = index * MAX_SHORT_LC;
                    let end = (start + MAX_SHORT_LC).min(length);
                    let last = index + 1 == count;

                    let mut frame = BytesMut::with_capacity(4 + 1 + (end - start) + 1);
                    frame.put_u8(if last {
                        self.cla
                    } else {
                        self.cla | CLA_CHAINING
                    });
                    frame.put_slice(&[self.ins, self.p1, self.p2]);
                    frame.put_u8((end - start) as u8);
                    frame.put_slice(&self.data[start..end]);
                    if self.expect_response {
                        frame.put_u8(0x00);
                    }
                    frame.freeze()
                })
                .collect();
            return Ok(frames);
        }

        Err(Error::PayloadTooLarge {
            length,
            limit: MAX_SHORT_LC,
        })
    }
}
