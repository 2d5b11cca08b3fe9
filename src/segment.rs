//! Delimited segment capture with limit marks.
//!
//! A capture reads forward from a byte source and returns everything up to (but excluding) the
//! first *limit mark* it meets. The mark itself is consumed exactly once: after a successful
//! capture the source cursor sits right after the mark, so repeated captures walk a delimited
//! stream piece by piece.
//!
//! There are two paths:
//!
//! - [`capture_bytes`] handles sets of single-byte marks. It reads one byte at a time and never
//!   seeks, so it works over any forward-only [`Read`].
//! - [`capture`] accepts marks of any length up to [`MAX_MARK_LEN`]. It reads 256-byte chunks
//!   from a [`Read`] + [`Seek`] source, re-scans the tail of each chunk on the next read so a mark
//!   straddling a chunk boundary is still found, and seeks back after a match so the cursor lands
//!   exactly after the mark. When every mark is one byte long it defers to the fast path.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use crate::bytes::search;
use crate::error::{CodecError, Result};

/// Longest limit mark accepted by either capture path.
pub const MAX_MARK_LEN: usize = 32;

/// Granularity of buffer growth (fast path) and of chunked reads (multi-byte path).
pub const CHUNK_SIZE: usize = 256;

/// How a captured segment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// The limit mark at this index in the mark set was found (and consumed).
    Mark(usize),
    /// The source ended before any mark; the segment holds the trailing bytes.
    EndOfStream,
}

/// Bytes captured by one call, plus how the capture stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Everything read before the terminator. Never contains the matched mark.
    pub bytes: Vec<u8>,
    /// Which mark stopped the capture.
    pub terminator: Terminator,
}

impl Segment {
    /// Index of the matched mark, if the capture stopped on one.
    pub fn mark_index(&self) -> Option<usize> {
        match self.terminator {
            Terminator::Mark(i) => Some(i),
            Terminator::EndOfStream => None,
        }
    }
}

/// Single-byte-mark fast path.
///
/// Reads one byte at a time until a byte equal to any of `marks` shows up, consuming at most
/// `budget` bytes (mark included).
///
/// # Errors
/// - [`CodecError::Usage`] if `marks` is empty.
/// - [`CodecError::StreamExhausted`] if the budget runs out without a match, or if the source
///   is already at its end (nothing left to capture).
pub fn capture_bytes<R: Read>(source: &mut R, marks: &[u8], budget: usize) -> Result<Segment> {
    if marks.is_empty() {
        return Err(CodecError::Usage("segment capture needs at least one limit mark".into()));
    }

    let mut out = Vec::with_capacity(CHUNK_SIZE);
    let mut consumed = 0;
    let mut byte = [0u8; 1];

    while consumed < budget {
        if out.len() == out.capacity() {
            out.reserve(CHUNK_SIZE);
        }
        match source.read(&mut byte) {
            Ok(0) => return end_of_stream(out),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
        consumed += 1;

        if let Some(index) = marks.iter().position(|m| *m == byte[0]) {
            return Ok(Segment {
                bytes: out,
                terminator: Terminator::Mark(index),
            });
        }
        out.push(byte[0]);
    }

    Err(CodecError::StreamExhausted { consumed })
}

/// Multi-byte-mark capture over a seekable source.
///
/// Consumes at most `budget` bytes (the matched mark included). When several marks match at the
/// same position the one listed first wins.
///
/// # Errors
/// - [`CodecError::Usage`] if `marks` is empty or any mark is empty or longer than
///   [`MAX_MARK_LEN`].
/// - [`CodecError::StreamExhausted`] if the budget runs out without a match, or if the source
///   is already at its end.
pub fn capture<R, M>(source: &mut R, marks: &[M], budget: usize) -> Result<Segment>
where
    R: Read + Seek,
    M: AsRef<[u8]>,
{
    let max_len = validate_marks(marks)?;
    if max_len == 1 {
        let single: Vec<u8> = marks.iter().map(|m| m.as_ref()[0]).collect();
        return capture_bytes(source, &single, budget);
    }

    let mut out: Vec<u8> = Vec::with_capacity(CHUNK_SIZE);
    let mut chunk = [0u8; CHUNK_SIZE];
    let overlap = max_len - 1;

    loop {
        let want = CHUNK_SIZE.min(budget - out.len());
        if want == 0 {
            return Err(CodecError::StreamExhausted { consumed: out.len() });
        }

        let read = read_up_to(source, &mut chunk[..want])?;
        let window = &chunk[..read];
        let at_end = read < want;
        let budget_edge = out.len() + read == budget;

        // A match is only final once every mark starting at or before it fits in the window.
        if let Some((pos, index, len)) = earliest_match(window, marks)
            && (at_end || budget_edge || pos + max_len <= read)
        {
            out.extend_from_slice(&window[..pos]);
            rewind(source, read - (pos + len))?;
            return Ok(Segment {
                bytes: out,
                terminator: Terminator::Mark(index),
            });
        }

        if at_end || budget_edge {
            // No more bytes can complete a partial mark in the tail.
            out.extend_from_slice(window);
            if at_end {
                return end_of_stream(out);
            }
            continue;
        }

        // Keep the last `overlap` bytes unconsumed so the next chunk re-examines them.
        let keep = read - overlap;
        out.extend_from_slice(&window[..keep]);
        rewind(source, overlap)?;
    }
}

fn validate_marks<M: AsRef<[u8]>>(marks: &[M]) -> Result<usize> {
    if marks.is_empty() {
        return Err(CodecError::Usage("segment capture needs at least one limit mark".into()));
    }
    let mut max_len = 0;
    for (i, mark) in marks.iter().enumerate() {
        let len = mark.as_ref().len();
        if len == 0 || len > MAX_MARK_LEN {
            return Err(CodecError::Usage(format!(
                "limit mark #{i} has length {len}; expected 1..={MAX_MARK_LEN}"
            )));
        }
        max_len = max_len.max(len);
    }
    Ok(max_len)
}

/// Returns `(position, mark index, mark length)` of the leftmost complete match.
fn earliest_match<M: AsRef<[u8]>>(window: &[u8], marks: &[M]) -> Option<(usize, usize, usize)> {
    marks
        .iter()
        .enumerate()
        .filter_map(|(index, mark)| {
            let mark = mark.as_ref();
            search(window, mark).map(|pos| (pos, index, mark.len()))
        })
        .min_by_key(|(pos, index, _)| (*pos, *index))
}

fn read_up_to<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn rewind<S: Seek>(source: &mut S, by: usize) -> Result<()> {
    if by > 0 {
        let offset = i64::try_from(by)
            .map_err(|_| CodecError::InternalConsistency("seek distance overflow".into()))?;
        source.seek(SeekFrom::Current(-offset))?;
    }
    Ok(())
}

fn end_of_stream(out: Vec<u8>) -> Result<Segment> {
    if out.is_empty() {
        return Err(CodecError::StreamExhausted { consumed: 0 });
    }
    Ok(Segment {
        bytes: out,
        terminator: Terminator::EndOfStream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn pipe_delimited_fields_come_back_in_order() {
        let mut src = Cursor::new(b"ABC|DEF|GHI|".to_vec());
        for expected in [b"ABC", b"DEF", b"GHI"] {
            let seg = capture_bytes(&mut src, b"|", 64).unwrap();
            assert_eq!(seg.bytes, expected);
            assert_eq!(seg.mark_index(), Some(0));
        }
        assert!(capture_bytes(&mut src, b"|", 64).unwrap_err().is_end_of_data());
    }

    #[test]
    fn trailing_segment_without_mark_ends_with_stream() {
        let mut src = Cursor::new(b"ABC|DEF|GHI".to_vec());
        assert_eq!(capture_bytes(&mut src, b"|", 64).unwrap().bytes, b"ABC");
        assert_eq!(capture_bytes(&mut src, b"|", 64).unwrap().bytes, b"DEF");
        let last = capture_bytes(&mut src, b"|", 64).unwrap();
        assert_eq!(last.bytes, b"GHI");
        assert_eq!(last.mark_index(), None);
        assert_eq!(last.terminator, Terminator::EndOfStream);
        assert!(capture_bytes(&mut src, b"|", 64).unwrap_err().is_end_of_data());
    }

    #[test]
    fn tie_at_chunk_edge_prefers_first_listed_mark() {
        let mut data = vec![b'x'; CHUNK_SIZE - 2];
        data.extend_from_slice(b"abcdone");
        let mut src = Cursor::new(data);
        let marks: [&[u8]; 2] = [b"abc", b"a"];

        let seg = capture(&mut src, &marks, 4096).unwrap();
        assert_eq!(seg.bytes.len(), CHUNK_SIZE - 2);
        assert_eq!(seg.mark_index(), Some(0));
        assert_eq!(src.position() as usize, CHUNK_SIZE + 1);

        let rest = capture(&mut src, &marks, 4096).unwrap();
        assert_eq!(rest.bytes, b"done");
        assert_eq!(rest.terminator, Terminator::EndOfStream);
    }

    #[test]
    fn budget_exhaustion_fails() {
        let mut src = Cursor::new(b"ABC".to_vec());
        let err = capture_bytes(&mut src, b"|", 2).unwrap_err();
        assert!(matches!(err, CodecError::StreamExhausted { consumed: 2 }));

        let mut src = Cursor::new(b"ABC".to_vec());
        let err = capture(&mut src, &[b"||"], 2).unwrap_err();
        assert!(matches!(err, CodecError::StreamExhausted { .. }));
    }

    #[test]
    fn reports_which_single_byte_mark_matched() {
        let mut src = Cursor::new(b"key=value;next".to_vec());
        let seg = capture_bytes(&mut src, b";=", 64).unwrap();
        assert_eq!(seg.bytes, b"key");
        assert_eq!(seg.mark_index(), Some(1));
        let seg = capture_bytes(&mut src, b";=", 64).unwrap();
        assert_eq!(seg.bytes, b"value");
        assert_eq!(seg.mark_index(), Some(0));
    }

    #[test]
    fn multi_byte_mark_split_across_chunk_boundary() {
        let mut data = vec![b'a'; CHUNK_SIZE - 1];
        data.extend_from_slice(b"||tail");
        let mut src = Cursor::new(data);

        let seg = capture(&mut src, &[b"||"], 4096).unwrap();
        assert_eq!(seg.bytes.len(), CHUNK_SIZE - 1);
        assert_eq!(seg.mark_index(), Some(0));
        // The mark is consumed exactly once.
        assert_eq!(src.position() as usize, CHUNK_SIZE + 1);

        let rest = capture(&mut src, &[b"||"], 4096).unwrap();
        assert_eq!(rest.bytes, b"tail");
        assert_eq!(rest.terminator, Terminator::EndOfStream);
    }

    #[test]
    fn straddling_long_mark_beats_later_short_mark() {
        let mut data = vec![b'a'; CHUNK_SIZE - 4];
        data.extend_from_slice(b"<<<<>>>>tail");
        let mut src = Cursor::new(data);
        let marks: [&[u8]; 2] = [b"<<<<>>>>", b">"];

        let seg = capture(&mut src, &marks, 4096).unwrap();
        assert_eq!(seg.bytes.len(), CHUNK_SIZE - 4);
        assert_eq!(seg.mark_index(), Some(0));
        assert_eq!(capture(&mut src, &marks, 4096).unwrap().bytes, b"tail");
    }

    #[test]
    fn multi_byte_capture_leaves_cursor_after_mark() {
        let mut src = Cursor::new(b"one<>two<>three".to_vec());
        let marks: [&[u8]; 2] = [b"<>", b"##"];
        assert_eq!(capture(&mut src, &marks, 100).unwrap().bytes, b"one");
        assert_eq!(src.position(), 5);
        assert_eq!(capture(&mut src, &marks, 100).unwrap().bytes, b"two");
    }

    #[test]
    fn leftmost_match_wins_across_marks() {
        let mut src = Cursor::new(b"ab##cd<>ef".to_vec());
        let marks: [&[u8]; 2] = [b"<>", b"##"];
        let seg = capture(&mut src, &marks, 100).unwrap();
        assert_eq!(seg.bytes, b"ab");
        assert_eq!(seg.mark_index(), Some(1));
    }

    #[test]
    fn single_byte_marks_take_the_fast_path() {
        let mut src = Cursor::new(b"x,y".to_vec());
        let marks: [&[u8]; 1] = [b","];
        assert_eq!(capture(&mut src, &marks, 10).unwrap().bytes, b"x");
        assert_eq!(src.position(), 2);
    }

    #[test]
    fn malformed_marks_are_usage_errors() {
        let mut src = Cursor::new(b"abc".to_vec());
        let empty: [&[u8]; 0] = [];
        assert!(matches!(capture(&mut src, &empty, 10), Err(CodecError::Usage(_))));
        let blank: [&[u8]; 1] = [b""];
        assert!(matches!(capture(&mut src, &blank, 10), Err(CodecError::Usage(_))));
        let long = vec![b'x'; MAX_MARK_LEN + 1];
        assert!(matches!(capture(&mut src, &[long], 10), Err(CodecError::Usage(_))));
        assert!(matches!(capture_bytes(&mut src, b"", 10), Err(CodecError::Usage(_))));
    }
}
