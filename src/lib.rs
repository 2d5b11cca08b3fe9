//! # Graphcodec
//!
//! A self-describing binary codec for arbitrary, possibly cyclic, object graphs, plus a
//! reference-sharing store that lets independently stored records point at one physical copy
//! of a value.
//!
//! ## Overview
//!
//! Graphcodec walks an object graph from a root and writes a compact block stream that carries
//! both the data and enough type metadata to rebuild the graph. Types are declared lazily, the
//! first time the walk needs them, so a stream only describes what it actually contains.
//!
//! ### Key Features
//!
//! *   **Identity Preservation:** Objects reached twice are written once. Back-references decode
//!     to the same handle, so sharing and cycles survive a round trip.
//! *   **Sparse Encoding:** Fields at their type's default are left out of the stream entirely.
//! *   **Lazy Type Declarations:** Each type is declared once per stream, right before the first
//!     block that needs it.
//! *   **Reference Sharing:** [`StoreBox`] values under the same centralizer share one encoded
//!     copy in the [`SharedReferenceStore`], resolved lazily and cached per box.
//! *   **Compression:** Optional deflate, gzip or LZ4 (feature: `lz4_flex`) for the stream body.
//!
//! ## Architecture
//!
//! ### The Object Arena
//!
//! Objects live in an [`ObjectGraph`] and refer to each other through [`ObjectId`] handles
//! (see [`Value::Ref`]). Identity is handle identity, which keeps the walker independent of
//! pointer equality.
//!
//! ### Stream Format
//!
//! ```text
//! [Magic "OGC1"] [Version u16] [Format kind u8]
//! { TYPE_DECL }*  OBJ_INSTANCE | OBJ_COLLECTION  [TRAILER]
//! ```
//!
//! See [`format`] for the block layout.
//!
//! ### Type Catalog
//!
//! The walker learns about types from a [`TypeCatalog`]: ordered fields and declared types per
//! qualified name. `#[derive(GraphType)]` fills it from Rust structs and enums.
//!
//! ## Usage Patterns
//!
//! ### Round trip
//!
//! ```rust
//! use graphcodec::{GraphCodec, GraphType, ObjectGraph, TypeCatalog};
//!
//! #[derive(GraphType)]
//! #[graph(name = "demo.Person")]
//! struct Person {
//!     name: String,
//!     age: i32,
//!     #[graph(declared = "demo.Person")]
//!     friend: Option<Box<Person>>,
//! }
//!
//! let mut catalog = TypeCatalog::new();
//! catalog.register::<Person>();
//! let codec = GraphCodec::new(catalog);
//!
//! let mut graph = ObjectGraph::new();
//! let ada = graph.instantiate(codec.catalog(), "demo.Person")?;
//! let bob = graph.instantiate(codec.catalog(), "demo.Person")?;
//! graph.set_field(ada, "name", "Ada")?;
//! graph.set_field(bob, "name", "Bob")?;
//! graph.set_field(ada, "friend", bob)?;
//! graph.set_field(bob, "friend", ada)?;
//!
//! let bytes = codec.encode(&graph, ada)?;
//! let decoded = codec.decode(&bytes)?;
//! assert!(graphcodec::graph::equivalent(&graph, ada, &decoded.graph, decoded.root));
//! # Ok::<(), graphcodec::CodecError>(())
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** the only `unsafe` is the memory map in [`GraphCodec::load`].
//! * **No Panics:** No `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **Comprehensive Errors:** All failures correspond to a [`CodecError`] type.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

extern crate self as graphcodec;

// --- PUBLIC API MODULES ---
pub mod api;
pub mod bytes;
pub mod compression;
pub mod error;
pub mod format;
pub mod graph;
pub mod inspector;
pub mod reader;
pub mod reflect;
pub mod registry;
pub mod scalar;
pub mod segment;
pub mod store;
pub mod value;
pub mod writer;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod io;
#[doc(hidden)]
pub mod trace;

// --- RE-EXPORTS ---

#[cfg(feature = "lz4_flex")]
pub use compression::Lz4Compressor;
pub use compression::{Compressor, DeflateCompressor, GzipCompressor, NoCompression};

pub use api::{CodecBuilder, CodecConfig, Compression, GraphCodec};
pub use error::{CodecError, Result};
pub use graph::{ObjectGraph, ObjectId};
pub use inspector::{StreamInspector, StreamReport};
pub use reader::Decoded;
pub use reflect::{FieldShape, Reflect, TypeCatalog, TypeKind, TypeShape};
pub use store::{GraphDocument, SharedReferenceStore, Storable, StoreBox};
pub use value::{Decimal, EnumValue, IntKind, PointF, ScalarKind, SizeF, Value};

// Re-export the derive macro so it is accessible as `graphcodec::GraphType`
pub use graphcodec_derive::GraphType;

/// Constants used throughout the library.
pub mod constants {
    /// The default buffer size for I/O operations.
    pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;
    /// The default nesting limit for encoding, decoding and inspection (root is depth 0).
    pub const DEFAULT_MAX_DEPTH: usize = 1024;
}
