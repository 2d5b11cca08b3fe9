//! Scalar encoder: fixed-length primitives and length-prefixed strings/byte arrays.
//!
//! [`encode_scalar`] returns `None` for anything outside the whitelist (nulls and object
//! references). That is not an error: it tells the walker to fall back to object encoding.

use chrono::{NaiveDateTime, TimeDelta};
use uuid::Uuid;

use crate::bytes::{fuse, read_framed};
use crate::error::{CodecError, Result};
use crate::value::{Decimal, EnumValue, IntKind, PointF, ScalarKind, SizeF, Value, tick_epoch};

const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

/// Encodes a whitelisted scalar value; returns `Ok(None)` if `value` is not a scalar.
///
/// # Errors
/// Only fails when a string or byte array is too large for a `u32` length prefix.
pub fn encode_scalar(value: &Value) -> Result<Option<Vec<u8>>> {
    let bytes = match value {
        Value::Null | Value::Ref(_) => return Ok(None),
        Value::Bool(v) => vec![u8::from(*v)],
        Value::U8(v) => vec![*v],
        Value::I8(v) => v.to_le_bytes().to_vec(),
        Value::I16(v) => v.to_le_bytes().to_vec(),
        Value::U16(v) => v.to_le_bytes().to_vec(),
        Value::I32(v) => v.to_le_bytes().to_vec(),
        Value::U32(v) => v.to_le_bytes().to_vec(),
        Value::I64(v) => v.to_le_bytes().to_vec(),
        Value::U64(v) => v.to_le_bytes().to_vec(),
        Value::F32(v) => v.to_le_bytes().to_vec(),
        Value::F64(v) => v.to_le_bytes().to_vec(),
        Value::Guid(v) => v.to_bytes_le().to_vec(),
        Value::DateTime(v) => to_ticks(*v).to_le_bytes().to_vec(),
        Value::Point(p) => fuse(&[p.x.to_le_bytes(), p.y.to_le_bytes()], false)?,
        Value::Size(s) => fuse(&[s.width.to_le_bytes(), s.height.to_le_bytes()], false)?,
        Value::Decimal(d) => d.to_bits().iter().flat_map(|w| w.to_le_bytes()).collect(),
        Value::Enum(e) => e.raw().to_le_bytes()[..e.repr.width()].to_vec(),
        Value::String(s) => {
            let utf16: Vec<u8> = s.encode_utf16().flat_map(u16::to_le_bytes).collect();
            fuse(&[utf16], true)?
        }
        Value::Bytes(b) => fuse(&[b], true)?,
    };
    Ok(Some(bytes))
}

/// Decodes one scalar of `kind` from the front of `data`.
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
/// [`CodecError::Format`] if `data` is too short or holds an invalid encoding
/// (bad boolean, unpaired UTF-16 surrogate, reserved decimal bits, out-of-range date).
pub fn decode_scalar(kind: ScalarKind, data: &[u8]) -> Result<(Value, usize)> {
    if let Some(width) = kind.fixed_width() {
        let raw = data.get(..width).ok_or_else(|| {
            CodecError::Format(format!(
                "truncated {kind}: need {width} bytes, have {}",
                data.len()
            ))
        })?;
        return Ok((decode_fixed(kind, raw)?, width));
    }

    let (body, consumed) = read_framed(data, 0)
        .map_err(|e| CodecError::Format(format!("truncated {kind}: {e}")))?;
    let value = match kind {
        ScalarKind::String => Value::String(decode_utf16(body)?),
        _ => Value::Bytes(body.to_vec()),
    };
    Ok((value, consumed))
}

/// Decodes an enum value whose underlying representation is `repr`.
pub fn decode_enum(type_name: &str, repr: IntKind, data: &[u8]) -> Result<(Value, usize)> {
    let width = repr.width();
    let raw = data
        .get(..width)
        .ok_or_else(|| CodecError::Format(format!("truncated enum {type_name}")))?;
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(raw);
    let value = EnumValue::from_raw(type_name, repr, u64::from_le_bytes(buf));
    Ok((Value::Enum(value), width))
}

fn decode_fixed(kind: ScalarKind, raw: &[u8]) -> Result<Value> {
    let value = match kind {
        ScalarKind::Bool => match raw[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            b => return Err(CodecError::Format(format!("invalid boolean byte {b:#04x}"))),
        },
        ScalarKind::U8 => Value::U8(raw[0]),
        ScalarKind::I8 => Value::I8(i8::from_le_bytes(array(raw)?)),
        ScalarKind::I16 => Value::I16(i16::from_le_bytes(array(raw)?)),
        ScalarKind::U16 => Value::U16(u16::from_le_bytes(array(raw)?)),
        ScalarKind::I32 => Value::I32(i32::from_le_bytes(array(raw)?)),
        ScalarKind::U32 => Value::U32(u32::from_le_bytes(array(raw)?)),
        ScalarKind::I64 => Value::I64(i64::from_le_bytes(array(raw)?)),
        ScalarKind::U64 => Value::U64(u64::from_le_bytes(array(raw)?)),
        ScalarKind::F32 => Value::F32(f32::from_le_bytes(array(raw)?)),
        ScalarKind::F64 => Value::F64(f64::from_le_bytes(array(raw)?)),
        ScalarKind::Guid => Value::Guid(Uuid::from_bytes_le(array(raw)?)),
        ScalarKind::DateTime => Value::DateTime(from_ticks(i64::from_le_bytes(array(raw)?))?),
        ScalarKind::Point => {
            let (x, y) = float_pair(raw)?;
            Value::Point(PointF::new(x, y))
        }
        ScalarKind::Size => {
            let (w, h) = float_pair(raw)?;
            Value::Size(SizeF::new(w, h))
        }
        ScalarKind::Decimal => {
            let mut words = [0u32; 4];
            for (word, chunk) in words.iter_mut().zip(raw.chunks_exact(4)) {
                *word = u32::from_le_bytes(array(chunk)?);
            }
            Value::Decimal(
                Decimal::from_bits(words)
                    .ok_or_else(|| CodecError::Format("invalid decimal flags word".into()))?,
            )
        }
        ScalarKind::String | ScalarKind::Bytes => {
            return Err(CodecError::InternalConsistency(format!(
                "{kind} is not a fixed-width scalar"
            )));
        }
    };
    Ok(value)
}

fn array<const N: usize>(raw: &[u8]) -> Result<[u8; N]> {
    raw.get(..N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| CodecError::Format(format!("expected {N} bytes, have {}", raw.len())))
}

fn float_pair(raw: &[u8]) -> Result<(f32, f32)> {
    let a = f32::from_le_bytes(array(raw)?);
    let b = f32::from_le_bytes(array(raw.get(4..).unwrap_or_default())?);
    Ok((a, b))
}

fn decode_utf16(body: &[u8]) -> Result<String> {
    if body.len() % 2 != 0 {
        return Err(CodecError::Format("odd byte count in UTF-16 string".into()));
    }
    let units = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| CodecError::Format(format!("invalid UTF-16 string: {e}")))
}

/// Converts a date-time to 100 ns ticks since 0001-01-01.
pub fn to_ticks(dt: NaiveDateTime) -> i64 {
    let delta = dt - tick_epoch();
    delta.num_seconds() * TICKS_PER_SECOND + i64::from(delta.subsec_nanos()) / NANOS_PER_TICK
}

/// Converts 100 ns ticks since 0001-01-01 back to a date-time.
pub fn from_ticks(ticks: i64) -> Result<NaiveDateTime> {
    let out_of_range = || CodecError::Format(format!("tick count {ticks} is out of range"));
    let secs = TimeDelta::try_seconds(ticks / TICKS_PER_SECOND).ok_or_else(out_of_range)?;
    let nanos = TimeDelta::nanoseconds((ticks % TICKS_PER_SECOND) * NANOS_PER_TICK);
    tick_epoch()
        .checked_add_signed(secs)
        .and_then(|dt| dt.checked_add_signed(nanos))
        .ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn round_trip(value: Value) {
        let kind = value.scalar_kind().unwrap();
        let bytes = encode_scalar(&value).unwrap().unwrap();
        let (decoded, consumed) = decode_scalar(kind, &bytes).unwrap();
        assert_eq!(consumed, bytes.len(), "{kind}");
        assert_eq!(decoded, value, "{kind}");
    }

    #[test]
    fn every_whitelisted_kind_round_trips() {
        let when = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_nano_opt(13, 45, 10, 123_456_700)
            .unwrap();
        let samples = vec![
            Value::Bool(true),
            Value::U8(200),
            Value::I8(-5),
            Value::I16(-30_000),
            Value::U16(65_000),
            Value::I32(i32::MIN),
            Value::U32(u32::MAX),
            Value::I64(-1 << 40),
            Value::U64(u64::MAX - 1),
            Value::F32(1.5),
            Value::F64(-0.0),
            Value::Guid(Uuid::new_v4()),
            Value::DateTime(when),
            Value::Point(PointF::new(1.25, -3.5)),
            Value::Size(SizeF::new(640.0, 480.0)),
            Value::Decimal(Decimal::new(-987_654_321_012, 6).unwrap()),
            Value::String("grüße, 世界 🚀".into()),
            Value::Bytes(vec![0, 1, 2, 255]),
        ];
        for value in samples {
            round_trip(value);
        }
    }

    #[test]
    fn non_scalars_fall_through() {
        assert!(encode_scalar(&Value::Null).unwrap().is_none());
        let mut graph = crate::graph::ObjectGraph::new();
        let id = graph.add_instance("demo.Node").unwrap();
        assert!(encode_scalar(&Value::Ref(id)).unwrap().is_none());
    }

    #[test]
    fn enums_use_their_underlying_width() {
        let value = Value::Enum(EnumValue::new("demo.Color", IntKind::I16, -3));
        let bytes = encode_scalar(&value).unwrap().unwrap();
        assert_eq!(bytes, (-3i16).to_le_bytes());
        let (decoded, used) = decode_enum("demo.Color", IntKind::I16, &bytes).unwrap();
        assert_eq!(used, 2);
        assert_eq!(decoded, value);
    }

    #[test]
    fn strings_are_length_prefixed_utf16() {
        let bytes = encode_scalar(&Value::from("hi")).unwrap().unwrap();
        assert_eq!(bytes, [4, 0, 0, 0, b'h', 0, b'i', 0]);
    }

    #[test]
    fn guid_uses_mixed_endian_layout() {
        let id = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let bytes = encode_scalar(&Value::Guid(id)).unwrap().unwrap();
        assert_eq!(&bytes[..4], &[0x33, 0x22, 0x11, 0x00]);
    }

    #[test]
    fn ticks_match_known_ordinals() {
        assert_eq!(to_ticks(tick_epoch()), 0);
        let unix = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(to_ticks(unix), 621_355_968_000_000_000);
        assert_eq!(from_ticks(621_355_968_000_000_000).unwrap(), unix);
    }

    #[test]
    fn malformed_payloads_are_format_errors() {
        assert!(matches!(decode_scalar(ScalarKind::I64, &[1, 2]), Err(CodecError::Format(_))));
        assert!(matches!(decode_scalar(ScalarKind::Bool, &[7]), Err(CodecError::Format(_))));
        assert!(matches!(
            decode_scalar(ScalarKind::String, &[3, 0, 0, 0, b'a', 0, b'b']),
            Err(CodecError::Format(_))
        ));
        // Lone high surrogate.
        assert!(matches!(
            decode_scalar(ScalarKind::String, &[2, 0, 0, 0, 0x00, 0xD8]),
            Err(CodecError::Format(_))
        ));
    }
}
