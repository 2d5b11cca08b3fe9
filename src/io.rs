//! Low-level block framing over byte sinks and sources.
//!
//! [`BlockWriter`] appends tags, integers and framed payloads to any [`Write`] sink while
//! tracking the current offset. [`BlockReader`] is the matching cursor over an in-memory slice;
//! every short read surfaces as [`CodecError::Format`].

use std::io::Write;

use crate::bytes::length_prefix;
use crate::error::{CodecError, Result};
use crate::format::Tag;

/// A sequential writer that tracks how many bytes it has produced.
#[derive(Debug)]
pub struct BlockWriter<W: Write> {
    sink: W,
    offset: u64,
}

impl<W: Write> BlockWriter<W> {
    /// Wraps a sink.
    pub fn new(sink: W) -> Self {
        Self { sink, offset: 0 }
    }

    /// Writes raw bytes.
    pub fn write_all(&mut self, buffer: &[u8]) -> Result<u64> {
        let start = self.offset;
        self.sink.write_all(buffer)?;
        self.offset += buffer.len() as u64;
        Ok(start)
    }

    /// Writes a block tag.
    pub fn tag(&mut self, tag: Tag) -> Result<()> {
        self.write_all(&[tag.as_u8()]).map(drop)
    }

    /// Writes a single byte.
    pub fn u8(&mut self, v: u8) -> Result<()> {
        self.write_all(&[v]).map(drop)
    }

    /// Writes a little-endian `u32`.
    pub fn u32(&mut self, v: u32) -> Result<()> {
        self.write_all(&v.to_le_bytes()).map(drop)
    }

    /// Writes a length-prefixed payload.
    pub fn framed(&mut self, payload: &[u8]) -> Result<()> {
        self.write_all(&length_prefix(payload.len())?)?;
        self.write_all(payload).map(drop)
    }

    /// Bytes written so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Flushes the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    /// Returns the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// A forward cursor over an encoded block stream.
#[derive(Debug, Clone)]
pub struct BlockReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BlockReader<'a> {
    /// Starts reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The unread tail, without consuming it.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Consumes `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(CodecError::Format(format!(
                "truncated stream: need {n} bytes at offset {}, have {}",
                self.pos,
                self.remaining()
            )));
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Skips `n` bytes.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        self.take(n).map(drop)
    }

    /// Reads one byte.
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a little-endian `u32`.
    pub fn u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Reads a block tag.
    pub fn tag(&mut self) -> Result<Tag> {
        Tag::from_byte(self.u8()?)
    }

    /// Reads a length-prefixed payload.
    pub fn framed(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_and_reader_agree_on_framing() {
        let mut w = BlockWriter::new(Vec::new());
        w.tag(Tag::FieldValue).unwrap();
        w.u32(7).unwrap();
        w.framed(b"abc").unwrap();
        assert_eq!(w.offset(), 1 + 4 + 4 + 3);

        let bytes = w.into_inner();
        let mut r = BlockReader::new(&bytes);
        assert_eq!(r.tag().unwrap(), Tag::FieldValue);
        assert_eq!(r.u32().unwrap(), 7);
        assert_eq!(r.framed().unwrap(), b"abc");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_reads_are_format_errors() {
        let mut r = BlockReader::new(&[1, 2]);
        assert!(matches!(r.u32(), Err(CodecError::Format(_))));
        assert_eq!(r.position(), 0);
    }
}
