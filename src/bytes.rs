//! Byte-block primitives: framing, concatenation, comparison and search.
//!
//! A *length-prefixed* block always starts with a 4-byte little-endian count followed by exactly
//! that many payload bytes. Everything the codec writes above this layer is built from these
//! helpers.

use crate::error::{CodecError, Result};

/// Size of the little-endian length prefix of a framed block.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Concatenates `parts` into a single block.
///
/// When `prepend_length` is set, the result starts with the combined length of all parts as a
/// `u32` (little-endian), which makes the block self-delimiting inside a larger stream.
///
/// # Errors
/// Returns [`CodecError::Usage`] if the combined length does not fit in a `u32` prefix.
pub fn fuse<P: AsRef<[u8]>>(parts: &[P], prepend_length: bool) -> Result<Vec<u8>> {
    let payload_len: usize = parts.iter().map(|p| p.as_ref().len()).sum();
    let prefix = if prepend_length { LENGTH_PREFIX_SIZE } else { 0 };

    let mut out = Vec::with_capacity(prefix + payload_len);
    if prepend_length {
        out.extend_from_slice(&length_prefix(payload_len)?);
    }
    for part in parts {
        out.extend_from_slice(part.as_ref());
    }
    Ok(out)
}

/// Encodes `len` as a 4-byte length prefix.
pub fn length_prefix(len: usize) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
    let len = u32::try_from(len)
        .map_err(|_| CodecError::Usage(format!("block of {len} bytes exceeds u32 framing")))?;
    Ok(len.to_le_bytes())
}

/// Bounds-checked copy of `count` bytes starting at `start`.
///
/// # Errors
/// Returns [`CodecError::Range`] if `start + count` exceeds `data.len()`.
pub fn extract(data: &[u8], start: usize, count: usize) -> Result<Vec<u8>> {
    let range_error = CodecError::Range {
        start,
        count,
        len: data.len(),
    };
    let end = start.checked_add(count).ok_or_else(|| range_error.clone())?;
    data.get(start..end)
        .map(<[u8]>::to_vec)
        .ok_or(range_error)
}

/// Reads a length-prefixed block starting at `start`.
///
/// Returns the payload and the total number of bytes consumed (prefix included).
pub fn read_framed(data: &[u8], start: usize) -> Result<(&[u8], usize)> {
    let prefix = data
        .get(start..start + LENGTH_PREFIX_SIZE)
        .ok_or(CodecError::Range {
            start,
            count: LENGTH_PREFIX_SIZE,
            len: data.len(),
        })?;
    let mut raw = [0u8; LENGTH_PREFIX_SIZE];
    raw.copy_from_slice(prefix);
    let len = u32::from_le_bytes(raw) as usize;

    let body_start = start + LENGTH_PREFIX_SIZE;
    let body = data
        .get(body_start..body_start + len)
        .ok_or(CodecError::Range {
            start: body_start,
            count: len,
            len: data.len(),
        })?;
    Ok((body, LENGTH_PREFIX_SIZE + len))
}

/// Byte-wise equality of two blocks.
pub fn equals(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

/// Searches the whole of `haystack` for `needle`.
///
/// See [`search_within`].
pub fn search(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.is_empty() {
        return None;
    }
    search_within(haystack, needle, 0, haystack.len() - 1)
}

/// Finds the first occurrence of `needle` that lies entirely within `haystack[from..=to]`.
///
/// This is a naive restart-on-mismatch scan: on a mismatch the match attempt restarts one byte
/// after the previous candidate start. Needles are capped at 32 bytes by every caller, so the
/// quadratic worst case is irrelevant. An empty needle never matches.
pub fn search_within(haystack: &[u8], needle: &[u8], from: usize, to: usize) -> Option<usize> {
    if needle.is_empty() || haystack.is_empty() {
        return None;
    }
    let end = to.min(haystack.len() - 1) + 1;
    if from >= end || end - from < needle.len() {
        return None;
    }

    let last_start = end - needle.len();
    let mut candidate = from;
    while candidate <= last_start {
        let mut matched = 0;
        while matched < needle.len() && haystack[candidate + matched] == needle[matched] {
            matched += 1;
        }
        if matched == needle.len() {
            return Some(candidate);
        }
        candidate += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuse_with_prefix_is_self_delimiting() {
        let block = fuse(&[b"ab".as_slice(), b"cde".as_slice()], true).unwrap();
        assert_eq!(&block[..4], &5u32.to_le_bytes());
        assert_eq!(&block[4..], b"abcde");

        let (body, consumed) = read_framed(&block, 0).unwrap();
        assert_eq!(body, b"abcde");
        assert_eq!(consumed, 9);
    }

    #[test]
    fn fuse_without_prefix_concatenates() {
        let parts: [&[u8]; 3] = [b"x", b"", b"yz"];
        assert_eq!(fuse(&parts, false).unwrap(), b"xyz");
    }

    #[test]
    fn extract_is_bounds_checked() {
        assert_eq!(extract(b"hello", 1, 3).unwrap(), b"ell");
        assert_eq!(extract(b"hello", 5, 0).unwrap(), b"");
        assert!(matches!(
            extract(b"hello", 4, 2),
            Err(CodecError::Range { start: 4, count: 2, len: 5 })
        ));
        assert!(extract(b"hello", usize::MAX, 2).is_err());
    }

    #[test]
    fn truncated_frame_is_a_range_error() {
        let mut block = fuse(&[b"abcdef"], true).unwrap();
        block.truncate(7);
        assert!(read_framed(&block, 0).is_err());
    }

    #[test]
    fn search_restarts_after_partial_match() {
        // "aab" inside "aaab" requires restarting one byte after the failed candidate.
        assert_eq!(search(b"aaab", b"aab"), Some(1));
        assert_eq!(search(b"abcabd", b"abd"), Some(3));
        assert_eq!(search(b"abc", b"abcd"), None);
        assert_eq!(search(b"abc", b""), None);
    }

    #[test]
    fn search_within_respects_window() {
        let hay = b"--||--||";
        assert_eq!(search_within(hay, b"||", 0, 7), Some(2));
        assert_eq!(search_within(hay, b"||", 3, 7), Some(6));
        // The needle must fit entirely inside [from, to].
        assert_eq!(search_within(hay, b"||", 3, 6), None);
    }

    #[test]
    fn equality_is_bytewise() {
        assert!(equals(b"abc", b"abc"));
        assert!(!equals(b"abc", b"abd"));
        assert!(!equals(b"abc", b"ab"));
    }
}
