//! The main entry point: [`GraphCodec`].
//!
//! A codec bundles a [`TypeCatalog`] with a [`CodecConfig`]. Every call opens an independent
//! session, so one codec can be shared freely between threads.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use rayon::prelude::*;
use tracing::debug;

use crate::compression::CompressorRegistry;
use crate::constants::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_DEPTH};
use crate::error::Result;
use crate::format::{HEADER_SIZE, Header};
use crate::graph::{ObjectGraph, ObjectId};
use crate::reader::{Decoded, GraphReader, open_body};
use crate::reflect::TypeCatalog;
use crate::writer::{GraphWriter, WalkSummary};

/// Compression applied to everything after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Stored as-is.
    #[default]
    None,
    /// LZ4 block compression.
    #[cfg(feature = "lz4_flex")]
    Lz4,
    /// Raw deflate, for internal round-trips.
    Deflate,
    /// Gzip (deflate plus header and CRC), for streams handed to other consumers.
    Gzip,
}

impl Compression {
    /// The format-kind byte recorded in the header.
    pub const fn id(self) -> u8 {
        match self {
            Self::None => 0,
            #[cfg(feature = "lz4_flex")]
            Self::Lz4 => 1,
            Self::Deflate => 2,
            Self::Gzip => 3,
        }
    }
}

/// Codec settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Body compression.
    pub compression: Compression,
    /// Deepest object nesting the walker and the reader accept.
    pub max_depth: usize,
    /// Initial capacity of encode buffers and of the file writer.
    pub buffer_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            max_depth: DEFAULT_MAX_DEPTH,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Builder for [`GraphCodec`].
#[derive(Debug)]
pub struct CodecBuilder {
    catalog: TypeCatalog,
    config: CodecConfig,
}

impl CodecBuilder {
    /// Sets the body compression.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Sets the nesting limit.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Sets the buffer size.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size;
        self
    }

    /// Finishes the codec.
    pub fn build(self) -> GraphCodec {
        GraphCodec {
            config: self.config,
            catalog: Arc::new(self.catalog),
            compressors: Arc::new(CompressorRegistry::new()),
        }
    }
}

/// Encodes and decodes object graphs.
///
/// ```rust
/// use graphcodec::{GraphCodec, ObjectGraph, TypeCatalog, TypeShape};
///
/// let mut catalog = TypeCatalog::new();
/// catalog.insert(TypeShape::instance("demo.Node").field("name", "string").field("next", "demo.Node"));
/// let codec = GraphCodec::new(catalog);
///
/// let mut graph = ObjectGraph::new();
/// let node = graph.instantiate(codec.catalog(), "demo.Node")?;
/// graph.set_field(node, "name", "loop")?;
/// graph.set_field(node, "next", node)?;
///
/// let bytes = codec.encode(&graph, node)?;
/// let decoded = codec.decode(&bytes)?;
/// assert!(graphcodec::graph::equivalent(&graph, node, &decoded.graph, decoded.root));
/// # Ok::<(), graphcodec::CodecError>(())
/// ```
#[derive(Debug, Clone)]
pub struct GraphCodec {
    config: CodecConfig,
    catalog: Arc<TypeCatalog>,
    compressors: Arc<CompressorRegistry>,
}

impl GraphCodec {
    /// Creates a codec with the default configuration.
    pub fn new(catalog: TypeCatalog) -> Self {
        Self::builder(catalog).build()
    }

    /// Starts configuring a codec.
    pub fn builder(catalog: TypeCatalog) -> CodecBuilder {
        CodecBuilder {
            catalog,
            config: CodecConfig::default(),
        }
    }

    /// The type catalog.
    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// The configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encodes the graph reachable from `root` into a new buffer.
    ///
    /// # Errors
    /// See [`GraphWriter::write`]; compression failures surface as
    /// [`CodecError::Compression`](crate::CodecError::Compression).
    pub fn encode(&self, graph: &ObjectGraph, root: ObjectId) -> Result<Vec<u8>> {
        let header = Header::new(self.config.compression.id());
        let body = Vec::with_capacity(self.config.buffer_size);
        let (body, _) =
            GraphWriter::new(graph, &self.catalog, body, self.config.max_depth).write(root)?;

        let compressor = self.compressors.get(header.kind)?;
        let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
        out.extend_from_slice(&header.to_bytes());
        compressor.compress_append(&body, &mut out)?;
        debug!(body = body.len(), total = out.len(), kind = header.kind, "encoded stream");
        Ok(out)
    }

    /// Encodes straight into `writer`.
    ///
    /// Uncompressed streams are written block by block; compressed ones are buffered first,
    /// since the compressor needs the whole body.
    pub fn write_to<W: Write>(
        &self,
        mut writer: W,
        graph: &ObjectGraph,
        root: ObjectId,
    ) -> Result<Option<WalkSummary>> {
        if self.config.compression != Compression::None {
            let bytes = self.encode(graph, root)?;
            writer.write_all(&bytes)?;
            writer.flush()?;
            return Ok(None);
        }

        writer.write_all(&Header::new(Compression::None.id()).to_bytes())?;
        let (_, summary) =
            GraphWriter::new(graph, &self.catalog, writer, self.config.max_depth).write(root)?;
        Ok(Some(summary))
    }

    /// Encodes into a file, creating or truncating it.
    pub fn save<P: AsRef<Path>>(&self, path: P, graph: &ObjectGraph, root: ObjectId) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let writer = BufWriter::with_capacity(self.config.buffer_size, file);
        self.write_to(writer, graph, root)?;
        debug!(path = %path.display(), "saved object graph");
        Ok(())
    }

    /// Decodes a full stream (header included).
    ///
    /// # Errors
    /// [`CodecError::Format`](crate::CodecError::Format) for a malformed stream.
    pub fn decode(&self, bytes: &[u8]) -> Result<Decoded> {
        let (_, body) = open_body(bytes, &self.compressors)?;
        GraphReader::new(&self.catalog, self.config.max_depth).read(&body)
    }

    /// Decodes a file through a memory map.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Decoded> {
        let file = File::open(path)?;

        // Safety: Mmap is fundamentally unsafe as external processes could modify the file.
        // The map only lives for the duration of this decode.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        self.decode(&mmap)
    }

    /// Encodes several independent graphs in parallel, one session each.
    ///
    /// Output order matches input order. The first failure is returned.
    pub fn encode_batch(&self, items: &[(&ObjectGraph, ObjectId)]) -> Result<Vec<Vec<u8>>> {
        items
            .par_iter()
            .map(|(graph, root)| self.encode(graph, *root))
            .collect()
    }
}
