//! The dynamic value model walked by the codec.
//!
//! A [`Value`] is either `Null`, a scalar from the fixed whitelist, or a [`Value::Ref`] edge to a
//! composite object living in an [`ObjectGraph`](crate::graph::ObjectGraph) arena.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::graph::ObjectId;

/// Integer representations usable as scalar values and as enum underlying types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    /// 1-byte unsigned.
    U8,
    /// 1-byte signed.
    I8,
    /// 2-byte signed.
    I16,
    /// 2-byte unsigned.
    U16,
    /// 4-byte signed.
    I32,
    /// 4-byte unsigned.
    U32,
    /// 8-byte signed.
    I64,
    /// 8-byte unsigned.
    U64,
}

impl IntKind {
    /// Encoded width in bytes.
    pub const fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 => 4,
            Self::I64 | Self::U64 => 8,
        }
    }

    /// Whether values of this kind are sign-extended.
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Mask selecting the bits that fit the kind.
    pub const fn mask(self) -> u64 {
        match self.width() {
            8 => u64::MAX,
            w => (1u64 << (w * 8)) - 1,
        }
    }

    /// The matching scalar kind.
    pub const fn scalar(self) -> ScalarKind {
        match self {
            Self::U8 => ScalarKind::U8,
            Self::I8 => ScalarKind::I8,
            Self::I16 => ScalarKind::I16,
            Self::U16 => ScalarKind::U16,
            Self::I32 => ScalarKind::I32,
            Self::U32 => ScalarKind::U32,
            Self::I64 => ScalarKind::I64,
            Self::U64 => ScalarKind::U64,
        }
    }

    /// Canonical name, shared with [`ScalarKind::name`].
    pub const fn name(self) -> &'static str {
        self.scalar().name()
    }

    /// Resolves an integer type name (canonical or alias).
    pub fn from_name(name: &str) -> Option<Self> {
        match ScalarKind::from_name(name)? {
            ScalarKind::U8 => Some(Self::U8),
            ScalarKind::I8 => Some(Self::I8),
            ScalarKind::I16 => Some(Self::I16),
            ScalarKind::U16 => Some(Self::U16),
            ScalarKind::I32 => Some(Self::I32),
            ScalarKind::U32 => Some(Self::U32),
            ScalarKind::I64 => Some(Self::I64),
            ScalarKind::U64 => Some(Self::U64),
            _ => None,
        }
    }
}

/// The whitelist of types the scalar encoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// `bool`, one byte.
    Bool,
    /// `u8`.
    U8,
    /// `i8`.
    I8,
    /// `i16`.
    I16,
    /// `u16`.
    U16,
    /// `i32`.
    I32,
    /// `u32`.
    U32,
    /// `i64`.
    I64,
    /// `u64`.
    U64,
    /// IEEE-754 single.
    F32,
    /// IEEE-754 double.
    F64,
    /// 16-byte GUID.
    Guid,
    /// Date-time as an 8-byte tick ordinal.
    DateTime,
    /// 2D point (two `f32`).
    Point,
    /// 2D size (two `f32`).
    Size,
    /// 128-bit decimal as four 32-bit words.
    Decimal,
    /// Length-prefixed UTF-16 string.
    String,
    /// Length-prefixed raw bytes.
    Bytes,
}

impl ScalarKind {
    /// Every scalar kind, in tag order.
    pub const ALL: [Self; 18] = [
        Self::Bool,
        Self::U8,
        Self::I8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Guid,
        Self::DateTime,
        Self::Point,
        Self::Size,
        Self::Decimal,
        Self::String,
        Self::Bytes,
    ];

    /// Canonical type name used in declaration blocks.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Guid => "guid",
            Self::DateTime => "datetime",
            Self::Point => "point",
            Self::Size => "size",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }

    /// Fixed encoded width, or `None` for length-prefixed kinds.
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Bool | Self::U8 | Self::I8 => Some(1),
            Self::I16 | Self::U16 => Some(2),
            Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 | Self::DateTime | Self::Point | Self::Size => {
                Some(8)
            }
            Self::Guid | Self::Decimal => Some(16),
            Self::String | Self::Bytes => None,
        }
    }

    /// Resolves a declared type name. Accepts canonical names and the Rust spellings the
    /// derive macro produces (`String`, `Vec<u8>`, `Uuid`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "bool" => Self::Bool,
            "u8" => Self::U8,
            "i8" => Self::I8,
            "i16" => Self::I16,
            "u16" => Self::U16,
            "i32" => Self::I32,
            "u32" => Self::U32,
            "i64" => Self::I64,
            "u64" => Self::U64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            "guid" | "Uuid" | "uuid::Uuid" => Self::Guid,
            "datetime" | "NaiveDateTime" | "chrono::NaiveDateTime" => Self::DateTime,
            "point" | "PointF" => Self::Point,
            "size" | "SizeF" => Self::Size,
            "decimal" | "Decimal" => Self::Decimal,
            "string" | "String" => Self::String,
            "bytes" | "Vec<u8>" => Self::Bytes,
            _ => return None,
        };
        Some(kind)
    }

    /// The zero value of this kind.
    pub fn default_value(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::U8 => Value::U8(0),
            Self::I8 => Value::I8(0),
            Self::I16 => Value::I16(0),
            Self::U16 => Value::U16(0),
            Self::I32 => Value::I32(0),
            Self::U32 => Value::U32(0),
            Self::I64 => Value::I64(0),
            Self::U64 => Value::U64(0),
            Self::F32 => Value::F32(0.0),
            Self::F64 => Value::F64(0.0),
            Self::Guid => Value::Guid(Uuid::nil()),
            Self::DateTime => Value::DateTime(tick_epoch()),
            Self::Point => Value::Point(PointF::default()),
            Self::Size => Value::Size(SizeF::default()),
            Self::Decimal => Value::Decimal(Decimal::ZERO),
            // Strings and byte arrays are references; their default is null.
            Self::String | Self::Bytes => Value::Null,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Start of the tick ordinal: 0001-01-01T00:00:00.
pub fn tick_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap_or_default()
        .and_time(NaiveTime::default())
}

/// A 2D point of two single-precision floats.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointF {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl PointF {
    /// Creates a point.
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A 2D extent of two single-precision floats.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SizeF {
    /// Horizontal extent.
    pub width: f32,
    /// Vertical extent.
    pub height: f32,
}

impl SizeF {
    /// Creates a size.
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// A 96-bit scaled decimal stored in the classic four-word layout:
/// `lo`, `mid`, `hi` hold the unsigned mantissa, `flags` holds the scale in bits 16..=23 and the
/// sign in bit 31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    lo: u32,
    mid: u32,
    hi: u32,
    flags: u32,
}

impl Decimal {
    /// Largest supported scale.
    pub const MAX_SCALE: u8 = 28;

    const SCALE_SHIFT: u32 = 16;
    const SIGN_MASK: u32 = 0x8000_0000;
    const SCALE_MASK: u32 = 0x00FF_0000;

    /// Zero with scale 0.
    pub const ZERO: Self = Self {
        lo: 0,
        mid: 0,
        hi: 0,
        flags: 0,
    };

    /// Builds `mantissa * 10^-scale`. Returns `None` if the mantissa needs more than 96 bits
    /// or the scale exceeds [`Decimal::MAX_SCALE`].
    pub fn new(mantissa: i128, scale: u8) -> Option<Self> {
        let magnitude = mantissa.unsigned_abs();
        if magnitude >> 96 != 0 || scale > Self::MAX_SCALE {
            return None;
        }
        let mut flags = u32::from(scale) << Self::SCALE_SHIFT;
        if mantissa < 0 {
            flags |= Self::SIGN_MASK;
        }
        Some(Self {
            lo: magnitude as u32,
            mid: (magnitude >> 32) as u32,
            hi: (magnitude >> 64) as u32,
            flags,
        })
    }

    /// Reassembles a decimal from its four words, validating the flags word.
    pub fn from_bits(bits: [u32; 4]) -> Option<Self> {
        let [lo, mid, hi, flags] = bits;
        let reserved = flags & !(Self::SIGN_MASK | Self::SCALE_MASK);
        let scale = (flags & Self::SCALE_MASK) >> Self::SCALE_SHIFT;
        if reserved != 0 || scale > u32::from(Self::MAX_SCALE) {
            return None;
        }
        Some(Self { lo, mid, hi, flags })
    }

    /// The four words `[lo, mid, hi, flags]`.
    pub const fn to_bits(self) -> [u32; 4] {
        [self.lo, self.mid, self.hi, self.flags]
    }

    /// Signed mantissa.
    pub fn mantissa(self) -> i128 {
        let magnitude =
            i128::from(self.lo) | (i128::from(self.mid) << 32) | (i128::from(self.hi) << 64);
        if self.is_negative() { -magnitude } else { magnitude }
    }

    /// Number of decimal digits after the point.
    pub const fn scale(self) -> u8 {
        ((self.flags & Self::SCALE_MASK) >> Self::SCALE_SHIFT) as u8
    }

    /// Whether the sign bit is set.
    pub const fn is_negative(self) -> bool {
        self.flags & Self::SIGN_MASK != 0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa().unsigned_abs().to_string();
        let scale = usize::from(self.scale());
        let sign = if self.is_negative() { "-" } else { "" };
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int, frac) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int}.{frac}")
    }
}

/// A value of a named enumeration, carried through its underlying integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    /// Qualified name of the enum type.
    pub type_name: String,
    /// Underlying integer representation.
    pub repr: IntKind,
    raw: u64,
}

impl EnumValue {
    /// Creates an enum value, truncating `value` to the width of `repr`.
    pub fn new(type_name: impl Into<String>, repr: IntKind, value: i64) -> Self {
        Self::from_raw(type_name, repr, value as u64)
    }

    /// Creates an enum value from its raw (zero-extended) bits.
    pub fn from_raw(type_name: impl Into<String>, repr: IntKind, raw: u64) -> Self {
        Self {
            type_name: type_name.into(),
            repr,
            raw: raw & repr.mask(),
        }
    }

    /// Raw bits, zero-extended to 64.
    pub const fn raw(&self) -> u64 {
        self.raw
    }

    /// Numeric value, sign-extended for signed representations.
    pub fn value(&self) -> i64 {
        let bits = self.repr.width() * 8;
        if self.repr.is_signed() && bits < 64 {
            let shift = 64 - bits;
            ((self.raw << shift) as i64) >> shift
        } else {
            self.raw as i64
        }
    }
}

/// A node-local value: null, a scalar, or an edge to a composite object.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent reference.
    #[default]
    Null,
    /// See [`ScalarKind::Bool`].
    Bool(bool),
    /// See [`ScalarKind::U8`].
    U8(u8),
    /// See [`ScalarKind::I8`].
    I8(i8),
    /// See [`ScalarKind::I16`].
    I16(i16),
    /// See [`ScalarKind::U16`].
    U16(u16),
    /// See [`ScalarKind::I32`].
    I32(i32),
    /// See [`ScalarKind::U32`].
    U32(u32),
    /// See [`ScalarKind::I64`].
    I64(i64),
    /// See [`ScalarKind::U64`].
    U64(u64),
    /// See [`ScalarKind::F32`].
    F32(f32),
    /// See [`ScalarKind::F64`].
    F64(f64),
    /// See [`ScalarKind::Guid`].
    Guid(Uuid),
    /// See [`ScalarKind::DateTime`].
    DateTime(NaiveDateTime),
    /// See [`ScalarKind::Point`].
    Point(PointF),
    /// See [`ScalarKind::Size`].
    Size(SizeF),
    /// See [`ScalarKind::Decimal`].
    Decimal(Decimal),
    /// An enum value, encoded through its underlying integer.
    Enum(EnumValue),
    /// See [`ScalarKind::String`].
    String(String),
    /// See [`ScalarKind::Bytes`].
    Bytes(Vec<u8>),
    /// Edge to a composite object in the arena.
    Ref(ObjectId),
}

impl Value {
    /// Scalar kind of this value, if it is a whitelisted scalar (enums report their
    /// underlying kind).
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        let kind = match self {
            Self::Null | Self::Ref(_) => return None,
            Self::Bool(_) => ScalarKind::Bool,
            Self::U8(_) => ScalarKind::U8,
            Self::I8(_) => ScalarKind::I8,
            Self::I16(_) => ScalarKind::I16,
            Self::U16(_) => ScalarKind::U16,
            Self::I32(_) => ScalarKind::I32,
            Self::U32(_) => ScalarKind::U32,
            Self::I64(_) => ScalarKind::I64,
            Self::U64(_) => ScalarKind::U64,
            Self::F32(_) => ScalarKind::F32,
            Self::F64(_) => ScalarKind::F64,
            Self::Guid(_) => ScalarKind::Guid,
            Self::DateTime(_) => ScalarKind::DateTime,
            Self::Point(_) => ScalarKind::Point,
            Self::Size(_) => ScalarKind::Size,
            Self::Decimal(_) => ScalarKind::Decimal,
            Self::Enum(e) => e.repr.scalar(),
            Self::String(_) => ScalarKind::String,
            Self::Bytes(_) => ScalarKind::Bytes,
        };
        Some(kind)
    }

    /// The object this value points at, if it is a reference.
    pub const fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns `true` for `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the value equals the zero/default of its own type.
    ///
    /// Floats compare by bit pattern so `-0.0` is not mistaken for the default and survives
    /// sparse encoding. Strings, byte arrays and references are never default unless null.
    pub fn is_default(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(v) => !v,
            Self::U8(v) => *v == 0,
            Self::I8(v) => *v == 0,
            Self::I16(v) => *v == 0,
            Self::U16(v) => *v == 0,
            Self::I32(v) => *v == 0,
            Self::U32(v) => *v == 0,
            Self::I64(v) => *v == 0,
            Self::U64(v) => *v == 0,
            Self::F32(v) => v.to_bits() == 0,
            Self::F64(v) => v.to_bits() == 0,
            Self::Guid(v) => v.is_nil(),
            Self::DateTime(v) => *v == tick_epoch(),
            Self::Point(p) => p.x.to_bits() == 0 && p.y.to_bits() == 0,
            Self::Size(s) => s.width.to_bits() == 0 && s.height.to_bits() == 0,
            Self::Decimal(d) => d.to_bits() == [0; 4],
            Self::Enum(e) => e.raw() == 0,
            Self::String(_) | Self::Bytes(_) | Self::Ref(_) => false,
        }
    }
}

macro_rules! impl_value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    }
}

impl_value_from!(
    bool => Bool, u8 => U8, i8 => I8, i16 => I16, u16 => U16, i32 => I32, u32 => U32,
    i64 => I64, u64 => U64, f32 => F32, f64 => F64, Uuid => Guid, NaiveDateTime => DateTime,
    PointF => Point, SizeF => Size, Decimal => Decimal, EnumValue => Enum, String => String,
    Vec<u8> => Bytes, ObjectId => Ref,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}
