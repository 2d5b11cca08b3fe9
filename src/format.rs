//! Defines the physical layout of an encoded object graph.
//!
//! ```text
//! [Magic "OGC1"] [Version u16] [Format kind u8]     <- header, never compressed
//! { TYPE_DECL }*                                      <- emitted lazily, on first use
//! OBJ_INSTANCE | OBJ_COLLECTION                       <- the root, nesting every first visit
//! [TRAILER tag] [instances u32] [types u32]
//! ```
//!
//! Everything after the header is passed through the compressor named by the format-kind byte.
//! All integers are little-endian.

use crate::error::{CodecError, Result};

/// Magic bytes identifying the stream format.
pub const MAGIC_BYTES: [u8; 4] = *b"OGC1";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

/// Magic(4) + Version(2) + Kind(1).
pub const HEADER_SIZE: usize = 7;

/// Separates the qualified type name from the member list in a declaration string.
pub const TYPEDEC_SEP: char = '\u{1D}';
/// Separates members from each other.
pub const MEMBERS_SEP: char = '\u{1E}';
/// Separates a member name from its declared type.
pub const MEMBER_TYPIFICATION_SEP: char = '\u{1F}';

/// Pseudo-field that carries the underlying type of an enum declaration.
pub const ENUM_VALUE_FIELD: &str = "value__";

/// Single-byte block tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Type id + kind + declaration string.
    TypeDecl = 0x01,
    /// Composite instance with sparse field blocks.
    ObjInstance = 0x02,
    /// Collection with one item block per element.
    ObjCollection = 0x03,
    /// One element of a collection.
    CollectionItem = 0x04,
    /// One non-default field of an instance.
    FieldValue = 0x05,
    /// End of stream.
    Trailer = 0xFF,
}

impl Tag {
    /// Decodes a tag byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        let tag = match byte {
            0x01 => Self::TypeDecl,
            0x02 => Self::ObjInstance,
            0x03 => Self::ObjCollection,
            0x04 => Self::CollectionItem,
            0x05 => Self::FieldValue,
            0xFF => Self::Trailer,
            other => return Err(CodecError::Format(format!("unknown block tag {other:#04x}"))),
        };
        Ok(tag)
    }

    /// The raw byte.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Kind byte stored in a `TYPE_DECL` block.
pub mod decl_kind {
    /// Whitelisted scalar; the declaration name is the scalar's canonical name.
    pub const SCALAR: u8 = 1;
    /// Enum; the single `value__` member names the underlying integer type.
    pub const ENUM: u8 = 2;
    /// Composite instance.
    pub const INSTANCE: u8 = 3;
    /// Collection.
    pub const COLLECTION: u8 = 4;
}

/// The fixed-size stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Always [`MAGIC_BYTES`].
    pub magic: [u8; 4],
    /// Format version.
    pub version: u16,
    /// Compressor id applied to the body.
    pub kind: u8,
}

impl Header {
    /// Creates a header for the current version.
    pub fn new(kind: u8) -> Self {
        Self {
            magic: MAGIC_BYTES,
            version: FORMAT_VERSION,
            kind,
        }
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6] = self.kind;
        buf
    }

    /// Parses and validates a header from the front of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let Some(raw) = bytes.get(..HEADER_SIZE) else {
            return Err(CodecError::Format("stream shorter than header".into()));
        };
        if raw[0..4] != MAGIC_BYTES {
            return Err(CodecError::Format("Invalid Magic Bytes".into()));
        }
        let version = u16::from_le_bytes([raw[4], raw[5]]);
        if version != FORMAT_VERSION {
            return Err(CodecError::Format(format!("Unsupported version: {version}")));
        }
        Ok(Self {
            magic: MAGIC_BYTES,
            version,
            kind: raw[6],
        })
    }
}

/// Totals written after the root block, checked by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Distinct instances written.
    pub instance_count: u32,
    /// Types declared.
    pub type_count: u32,
}

impl Trailer {
    /// Size after the tag byte.
    pub const SIZE: usize = 8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_and_validates() {
        let bytes = Header::new(3).to_bytes();
        assert_eq!(&bytes[..4], b"OGC1");
        assert_eq!(Header::parse(&bytes).unwrap().kind, 3);

        let mut bad = bytes;
        bad[0] = b'X';
        assert!(Header::parse(&bad).is_err());
        let mut future = bytes;
        future[4] = 9;
        assert!(Header::parse(&future).is_err());
        assert!(Header::parse(&bytes[..5]).is_err());
    }

    #[test]
    fn tags_are_distinct_bytes() {
        let tags = [
            Tag::TypeDecl,
            Tag::ObjInstance,
            Tag::ObjCollection,
            Tag::CollectionItem,
            Tag::FieldValue,
            Tag::Trailer,
        ];
        for tag in tags {
            assert_eq!(Tag::from_byte(tag.as_u8()).unwrap(), tag);
        }
        assert!(Tag::from_byte(0x42).is_err());
    }
}
