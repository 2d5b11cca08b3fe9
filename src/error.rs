//! Centralized error handling for graphcodec.
//!
//! Every fallible operation in the crate returns [`Result`], and no library code path panics:
//! `#![deny(clippy::unwrap_used)]` and `#![deny(clippy::panic)]` are enforced at the crate root.
//!
//! ## Error Categories
//!
//! - **Usage** ([`CodecError::Usage`]): the caller violated a precondition (non-serializable root,
//!   malformed limit marks, recursion limit exceeded).
//! - **Range** ([`CodecError::Range`]): a bounds-checked byte copy was asked to read past the end.
//! - **Stream exhaustion** ([`CodecError::StreamExhausted`]): a delimiter was not found before the
//!   read budget or the source ran out. Recoverable when used as an end-of-data signal, see
//!   [`CodecError::is_end_of_data`].
//! - **Internal consistency** ([`CodecError::InternalConsistency`]): a bug in traversal ordering,
//!   never caused by bad input.
//! - **Missing centralizer** ([`CodecError::MissingCentralizerTable`]): a store box points at a
//!   shared table that was never registered.
//! - **Format**, **Compression**, **Serialization**, **Io**: decode-side and plumbing failures.
//!
//! ```rust
//! use graphcodec::bytes::extract;
//! use graphcodec::CodecError;
//!
//! match extract(b"abc", 2, 5) {
//!     Err(CodecError::Range { start, count, len }) => {
//!         assert_eq!((start, count, len), (2, 5, 3));
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

use uuid::Uuid;

/// A specialized `Result` type for graphcodec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// The master error enum covering all failure domains of the codec.
///
/// This type is `Clone` so a failure captured on a worker thread (see
/// [`GraphCodec::encode_batch`](crate::GraphCodec::encode_batch)) can be handed back to the
/// caller. I/O errors are wrapped in `Arc` for that reason.
#[derive(Debug, Clone)]
pub enum CodecError {
    /// Low-level I/O failure on the byte sink or source.
    Io(Arc<io::Error>),

    /// The caller violated a precondition.
    ///
    /// ## Common Causes
    ///
    /// - The root value is not a composite object or its type is not in the catalog
    /// - Segment-capture limit marks are empty, duplicated in length zero, or longer than 32 bytes
    /// - The configured maximum nesting depth was exceeded while walking
    Usage(String),

    /// A bounds-checked copy would have read past the end of the data.
    Range {
        /// Requested start index.
        start: usize,
        /// Requested number of bytes.
        count: usize,
        /// Actual length of the data.
        len: usize,
    },

    /// The read budget (or the source) was consumed without finding a delimiter.
    StreamExhausted {
        /// Number of bytes consumed before giving up.
        consumed: usize,
    },

    /// A type that must already be registered is missing from the session registry.
    ///
    /// This indicates a bug in traversal ordering, not a bad input.
    InternalConsistency(String),

    /// A store box references a centralizer whose shared table was never registered.
    MissingCentralizerTable(Uuid),

    /// The stream does not follow the block layout (bad magic, unknown tag, truncation, ...).
    Format(String),

    /// Compression or decompression failure.
    Compression(String),

    /// Bincode failure while exporting or importing a shared reference table.
    Serialization(String),
}

impl CodecError {
    /// Returns `true` when this error only signals that no more delimited data is available.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::StreamExhausted { .. })
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Usage(s) => write!(f, "Usage Error: {s}"),
            Self::Range { start, count, len } => write!(
                f,
                "Range Error: cannot take {count} bytes at {start} from a block of {len} bytes"
            ),
            Self::StreamExhausted { consumed } => write!(
                f,
                "Stream Exhausted: no limit mark found after {consumed} bytes"
            ),
            Self::InternalConsistency(s) => write!(f, "Internal Consistency Error: {s}"),
            Self::MissingCentralizerTable(id) => {
                write!(f, "Missing Centralizer Table: {id} was never registered")
            }
            Self::Format(s) => write!(f, "Format Error: {s}"),
            Self::Compression(s) => write!(f, "Compression Error: {s}"),
            Self::Serialization(s) => write!(f, "Serialization Error: {s}"),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn io_errors_keep_their_source() {
        let err = CodecError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("short read"));
    }

    #[test]
    fn only_exhaustion_counts_as_end_of_data() {
        assert!(CodecError::StreamExhausted { consumed: 3 }.is_end_of_data());
        assert!(!CodecError::Usage("x".into()).is_end_of_data());
    }
}
