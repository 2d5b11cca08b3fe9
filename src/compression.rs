//! Pluggable compression backend.
//!
//! The codec itself never depends on compression; it is applied to the block stream after the
//! header, and the chosen algorithm id is recorded in the header's format-kind byte.
//!
//! Two free functions cover the common case:
//! [`compress`] / [`decompress`] pick gzip (checksummed, for output handed to external consumers
//! such as files) or raw deflate (internal round-trips).

use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::Compression as Level;
use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};

use crate::error::{CodecError, Result};

/// Interface for compression algorithms.
///
/// Each compressor is identified by a unique id stored in the stream header.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// Returns the id written to the format-kind byte. 0 is reserved for no compression.
    fn id(&self) -> u8;

    /// Compresses the data.
    ///
    /// Returns a `Cow<[u8]>` which may borrow the input if no compression is performed.
    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;

    /// Decompresses the data.
    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;

    /// Compresses the data and appends it to the output vector.
    fn compress_append(&self, data: &[u8], output: &mut Vec<u8>) -> Result<()> {
        output.extend_from_slice(&self.compress(data)?);
        Ok(())
    }
}

// --- No Compression (Pass-through) ---

/// A compressor that performs no compression (pass-through, id 0).
#[derive(Debug, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn id(&self) -> u8 {
        0
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }

    fn compress_append(&self, data: &[u8], output: &mut Vec<u8>) -> Result<()> {
        output.extend_from_slice(data);
        Ok(())
    }
}

// --- LZ4 Implementation ---

#[cfg(feature = "lz4_flex")]
/// A compressor using the LZ4 block format with a size prefix (id 1).
#[derive(Debug, Clone, Copy)]
pub struct Lz4Compressor;

#[cfg(feature = "lz4_flex")]
impl Compressor for Lz4Compressor {
    fn id(&self) -> u8 {
        1
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Owned(lz4_flex::compress_prepend_size(data)))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let vec = lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(Cow::Owned(vec))
    }
}

// --- Deflate / Gzip ---

/// Raw deflate (id 2). No checksum; meant for internal round-trips.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor;

impl Compressor for DeflateCompressor {
    fn id(&self) -> u8 {
        2
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Level::default());
        encoder.write_all(data)?;
        Ok(Cow::Owned(encoder.finish()?))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut out = Vec::with_capacity(data.len() * 2);
        DeflateDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Compression(format!("deflate: {e}")))?;
        Ok(Cow::Owned(out))
    }
}

/// Gzip (id 3). Carries a CRC32, used for output consumed outside the process.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn id(&self) -> u8 {
        3
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Level::default());
        encoder.write_all(data)?;
        Ok(Cow::Owned(encoder.finish()?))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut out = Vec::with_capacity(data.len() * 2);
        GzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Compression(format!("gzip: {e}")))?;
        Ok(Cow::Owned(out))
    }
}

/// Compresses `data` with gzip when `use_gzip` is set, raw deflate otherwise.
pub fn compress(data: &[u8], use_gzip: bool) -> Result<Vec<u8>> {
    let out = if use_gzip {
        GzipCompressor.compress(data)?
    } else {
        DeflateCompressor.compress(data)?
    };
    Ok(out.into_owned())
}

/// Inverse of [`compress`]; `use_gzip` must match the value used to compress.
pub fn decompress(data: &[u8], use_gzip: bool) -> Result<Vec<u8>> {
    let out = if use_gzip {
        GzipCompressor.decompress(data)?
    } else {
        DeflateCompressor.decompress(data)?
    };
    Ok(out.into_owned())
}

// --- REGISTRY ---

/// Maps format-kind ids found in stream headers to [`Compressor`] implementations.
#[derive(Debug)]
pub struct CompressorRegistry {
    algorithms: Vec<Option<Box<dyn Compressor>>>,
}

impl CompressorRegistry {
    /// Creates a registry with the built-in algorithms.
    ///
    /// *   ID 0: `NoCompression`
    /// *   ID 1: `Lz4Compressor` (if the `lz4_flex` feature is enabled)
    /// *   ID 2: `DeflateCompressor`
    /// *   ID 3: `GzipCompressor`
    pub fn new() -> Self {
        let mut reg = Self {
            algorithms: (0..8).map(|_| None).collect(),
        };

        reg.register(Box::new(NoCompression));
        #[cfg(feature = "lz4_flex")]
        reg.register(Box::new(Lz4Compressor));
        reg.register(Box::new(DeflateCompressor));
        reg.register(Box::new(GzipCompressor));

        reg
    }

    /// Registers a compressor under its own id, replacing any previous one.
    pub fn register(&mut self, algo: Box<dyn Compressor>) {
        let id = usize::from(algo.id());
        if id >= self.algorithms.len() {
            self.algorithms.resize_with(id + 1, || None);
        }
        if let Some(slot) = self.algorithms.get_mut(id) {
            *slot = Some(algo);
        }
    }

    /// Retrieves a compressor by its id.
    ///
    /// # Errors
    /// Returns [`CodecError::Compression`] if the id is not registered.
    pub fn get(&self, id: u8) -> Result<&dyn Compressor> {
        if let Some(algo) = self
            .algorithms
            .get(usize::from(id))
            .and_then(|opt| opt.as_ref())
        {
            return Ok(algo.as_ref());
        }

        Err(CodecError::Compression(format!(
            "Algorithm ID {id} is not registered or available"
        )))
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
