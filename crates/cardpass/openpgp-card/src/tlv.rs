//! BER-TLV and COMPACT-TLV decoding of card data objects
//!
//! [`decode`] builds a [`DataObject`] tree from a card response. Decoding works on
//! `[start, end)` index ranges of the response buffer, recursing into constructed
//! objects, so no cursor state is shared between calls.

use std::fmt;

use cardpass_apdu_core::Capabilities;

/// Tag of the synthetic root wrapping several top-level objects
pub const ROOT_TAG: u32 = 0;

/// Deepest nesting of constructed objects accepted by [`decode`]
pub const MAX_DEPTH: usize = 16;

/// COMPACT-TLV tag carrying the card capabilities in the historical bytes
const CAPABILITIES_TAG: u8 = 0x73;

/// Errors raised while decoding BER-TLV data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    /// The input holds nothing but padding
    #[error("no data object in input")]
    Empty,

    /// A tag, length or value runs past the end of its enclosing range
    #[error("data object truncated at offset {0}")]
    Truncated(usize),

    /// Tag longer than four bytes
    #[error("tag at offset {0} is too long")]
    TagTooLong(usize),

    /// Length field using an unsupported form
    #[error("unsupported length encoding at offset {0}")]
    UnsupportedLength(usize),

    /// Constructed objects nested deeper than [`MAX_DEPTH`]
    #[error("data object at offset {0} is nested too deeply")]
    TooDeep(usize),

    /// Range lies outside the input
    #[error("range {start}..{end} outside input of {len} bytes")]
    OutOfBounds {
        /// Range start
        start: usize,
        /// Range end
        end: usize,
        /// Input length
        len: usize,
    },
}

/// Tag class, the top two bits of the first tag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagClass {
    /// `00`
    Universal,
    /// `01`
    Application,
    /// `10`
    ContextSpecific,
    /// `11`
    Private,
}

impl TagClass {
    const fn from_tag_byte(byte: u8) -> Self {
        match byte >> 6 {
            0 => Self::Universal,
            1 => Self::Application,
            2 => Self::ContextSpecific,
            _ => Self::Private,
        }
    }

    /// Lower case class name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Universal => "universal",
            Self::Application => "application",
            Self::ContextSpecific => "context-specific",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for TagClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of a data object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    /// Raw value of a primitive object
    Primitive(Vec<u8>),
    /// Children of a constructed object, in encoding order
    Constructed(Vec<DataObject>),
}

/// Result of [`DataObject::lookup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// The matching object is primitive
    Value(&'a [u8]),
    /// The matching object is constructed
    Children(&'a [DataObject]),
}

/// A decoded BER-TLV node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObject {
    tag: u32,
    class: TagClass,
    number: u32,
    contents: Contents,
}

impl DataObject {
    /// Full tag as a big-endian number of its encoded bytes, e.g. `0x5F52`
    pub const fn tag(&self) -> u32 {
        self.tag
    }

    /// Tag class
    pub const fn class(&self) -> TagClass {
        self.class
    }

    /// Tag number with class and constructed bits removed
    pub const fn tag_number(&self) -> u32 {
        self.number
    }

    /// Whether the object holds children rather than a value
    pub const fn is_constructed(&self) -> bool {
        matches!(self.contents, Contents::Constructed(_))
    }

    /// Human readable name of well-known OpenPGP card tags
    pub const fn label(&self) -> Option<&'static str> {
        label(self.tag)
    }

    /// Object contents
    pub const fn contents(&self) -> &Contents {
        &self.contents
    }

    /// Value of a primitive object
    pub fn value(&self) -> Option<&[u8]> {
        match &self.contents {
            Contents::Primitive(value) => Some(value),
            Contents::Constructed(_) => None,
        }
    }

    /// Children of a constructed object
    pub fn children(&self) -> Option<&[Self]> {
        match &self.contents {
            Contents::Constructed(children) => Some(children),
            Contents::Primitive(_) => None,
        }
    }

    /// Pre-order depth-first search for the first object with `tag`
    pub fn lookup(&self, tag: u32) -> Option<Lookup<'_>> {
        if self.tag == tag {
            return Some(match &self.contents {
                Contents::Primitive(value) => Lookup::Value(value),
                Contents::Constructed(children) => Lookup::Children(children),
            });
        }

        self.children()?
            .iter()
            .find_map(|child| child.lookup(tag))
    }

    /// Value of the first primitive object with `tag`
    pub fn lookup_value(&self, tag: u32) -> Option<&[u8]> {
        match self.lookup(tag)? {
            Lookup::Value(value) => Some(value),
            Lookup::Children(_) => None,
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = depth * 2;
        let name = self.label().unwrap_or("Unknown");
        write!(
            f,
            "{:indent$}{name} [{:#06X}, {}, {}]",
            "",
            self.tag,
            self.class,
            if self.is_constructed() { "constructed" } else { "primitive" },
        )?;
        match &self.contents {
            Contents::Primitive(value) => writeln!(f, ": {}", hex::encode_upper(value)),
            Contents::Constructed(children) => {
                writeln!(f)?;
                children
                    .iter()
                    .try_for_each(|child| child.write_tree(f, depth + 1))
            }
        }
    }
}

impl fmt::Display for DataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

/// Decode a card response into one data object.
///
/// Several top-level objects are wrapped in a synthetic constructed root with tag
/// [`ROOT_TAG`], so [`DataObject::lookup`] always has a single entry point.
pub fn decode(bytes: &[u8]) -> Result<DataObject, TlvError> {
    let mut objects = decode_all(bytes, 0, bytes.len(), 0)?;
    match objects.len() {
        0 => Err(TlvError::Empty),
        1 => Ok(objects.remove(0)),
        _ => Ok(DataObject {
            tag: ROOT_TAG,
            class: TagClass::Universal,
            number: 0,
            contents: Contents::Constructed(objects),
        }),
    }
}

/// Decode the first data object within `bytes[start..end]`.
///
/// Returns the object and the offset just past it, or `None` when only padding
/// (`0x00` / `0xFF`) remains in the range.
pub fn decode_range(
    bytes: &[u8],
    start: usize,
    end: usize,
) -> Result<Option<(DataObject, usize)>, TlvError> {
    decode_nested(bytes, start, end, 0)
}

fn decode_nested(
    bytes: &[u8],
    start: usize,
    end: usize,
    depth: usize,
) -> Result<Option<(DataObject, usize)>, TlvError> {
    if start > end || end > bytes.len() {
        return Err(TlvError::OutOfBounds {
            start,
            end,
            len: bytes.len(),
        });
    }

    let mut pos = start;
    while pos < end && matches!(bytes[pos], 0x00 | 0xFF) {
        pos += 1;
    }
    if pos == end {
        return Ok(None);
    }

    let tag_start = pos;
    if depth >= MAX_DEPTH {
        return Err(TlvError::TooDeep(tag_start));
    }
    let first = bytes[pos];
    pos += 1;

    let class = TagClass::from_tag_byte(first);
    let constructed = first & 0x20 != 0;
    let mut tag = u32::from(first);
    let mut number = u32::from(first & 0x1F);

    if number == 0x1F {
        number = 0;
        loop {
            if pos >= end {
                return Err(TlvError::Truncated(pos));
            }
            if tag > 0x00FF_FFFF {
                return Err(TlvError::TagTooLong(tag_start));
            }
            let byte = bytes[pos];
            pos += 1;
            tag = (tag << 8) | u32::from(byte);
            number = (number << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                break;
            }
        }
    }

    if pos >= end {
        return Err(TlvError::Truncated(pos));
    }
    let length_byte = bytes[pos];
    pos += 1;

    let length = if length_byte & 0x80 == 0 {
        usize::from(length_byte)
    } else {
        let count = usize::from(length_byte & 0x7F);
        if count == 0 || count > 4 {
            return Err(TlvError::UnsupportedLength(pos - 1));
        }
        if pos + count > end {
            return Err(TlvError::Truncated(pos));
        }
        let length = bytes[pos..pos + count]
            .iter()
            .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte));
        pos += count;
        length
    };

    let value_end = pos
        .checked_add(length)
        .filter(|value_end| *value_end <= end)
        .ok_or(TlvError::Truncated(pos))?;

    let contents = if constructed {
        Contents::Constructed(decode_all(bytes, pos, value_end, depth + 1)?)
    } else {
        Contents::Primitive(bytes[pos..value_end].to_vec())
    };

    Ok(Some((
        DataObject {
            tag,
            class,
            number,
            contents,
        },
        value_end,
    )))
}

fn decode_all(
    bytes: &[u8],
    start: usize,
    end: usize,
    depth: usize,
) -> Result<Vec<DataObject>, TlvError> {
    let mut objects = Vec::new();
    let mut pos = start;
    while let Some((object, next)) = decode_nested(bytes, pos, end, depth)? {
        objects.push(object);
        pos = next;
    }
    Ok(objects)
}

/// Find the capabilities in the historical bytes returned for GET DATA `5F52`.
///
/// The first byte is the category indicator and the last three are the status
/// indicator. In between, COMPACT-TLV objects carry their length in the low nibble
/// of the tag byte. Tag `0x73` holds three capability bytes; in the third one bit 7
/// flags command chaining and bit 6 extended length.
pub fn parse_capabilities(historical: &[u8]) -> Option<Capabilities> {
    if historical.len() < 4 {
        return None;
    }

    let compact = &historical[1..historical.len() - 3];
    let mut pos = 0;
    while pos < compact.len() {
        let tag = compact[pos];
        if tag == CAPABILITIES_TAG {
            let capabilities = compact.get(pos + 1..pos + 4)?;
            let flags = capabilities[2];
            return Some(Capabilities::new(flags & 0x80 != 0, flags & 0x40 != 0));
        }
        pos += 1 + usize::from(tag & 0x0F);
    }

    None
}

/// Label of a well-known OpenPGP card tag
pub const fn label(tag: u32) -> Option<&'static str> {
    Some(match tag {
        ROOT_TAG => "Root",
        0x5E => "Login data",
        0x5F50 => "URL to public keys",
        0x65 => "Cardholder related data",
        0x5B => "Name",
        0x5F2D => "Language preference",
        0x5F35 => "Sex",
        0x6E => "Application related data",
        0x4F => "Application identifier",
        0x5F52 => "Historical bytes",
        0x73 => "Discretionary data objects",
        0xC0 => "Extended capabilities",
        0xC1 => "Algorithm attributes: signature",
        0xC2 => "Algorithm attributes: decryption",
        0xC3 => "Algorithm attributes: authentication",
        0xC4 => "PW status bytes",
        0xC5 => "Fingerprints",
        0xC6 => "CA fingerprints",
        0xCD => "Generation times",
        0x7A => "Security support template",
        0x93 => "Digital signature counter",
        _ => return None,
    })
}
