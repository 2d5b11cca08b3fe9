//! Cross-document reference sharing.
//!
//! A [`StoreBox`] holds one value on behalf of a record. Left alone it keeps the value's
//! encoding inline. Once centralized, reference-typed values are interned in the
//! [`SharedReferenceStore`] table of their centralizer and the box only keeps a 16-byte id, so
//! every box under that centralizer holding an equal value shares one physical copy.

/// Defines the `SharedReferenceStore` and its per-centralizer tables.
pub mod shared;
/// Defines the lazily resolving `StoreBox`.
pub mod store_box;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::api::GraphCodec;
use crate::error::{CodecError, Result};
use crate::graph::{ObjectGraph, ObjectId};
use crate::scalar::{decode_scalar, encode_scalar};
use crate::value::{Decimal, PointF, ScalarKind, SizeF, Value};

pub use shared::SharedReferenceStore;
pub use store_box::StoreBox;

/// A value a [`StoreBox`] can hold.
pub trait Storable: Default + Clone {
    /// Value types are always stored inline, never shared: a 16-byte id would cost as much as
    /// the value itself.
    const VALUE_TYPE: bool;

    /// Encodes the value.
    fn store(&self, codec: &GraphCodec) -> Result<Vec<u8>>;

    /// Decodes a value produced by [`store`](Self::store).
    fn restore(bytes: &[u8], codec: &GraphCodec) -> Result<Self>;

    /// Null values are kept inline even in a centralized box.
    fn is_null(&self) -> bool {
        false
    }
}

fn restore_scalar(kind: ScalarKind, bytes: &[u8]) -> Result<Value> {
    let (value, used) = decode_scalar(kind, bytes)?;
    if used != bytes.len() {
        return Err(CodecError::Format(format!(
            "{} trailing bytes after stored {kind}",
            bytes.len() - used
        )));
    }
    Ok(value)
}

fn store_scalar(value: Value) -> Result<Vec<u8>> {
    encode_scalar(&value)?.ok_or_else(|| {
        CodecError::InternalConsistency(format!("{value:?} is not scalar-encodable"))
    })
}

macro_rules! impl_storable_scalar {
    ($($t:ty => $variant:ident, $value_type:expr);* $(;)?) => {
        $(
            impl Storable for $t {
                const VALUE_TYPE: bool = $value_type;

                fn store(&self, _codec: &GraphCodec) -> Result<Vec<u8>> {
                    store_scalar(Value::$variant(self.clone()))
                }

                fn restore(bytes: &[u8], _codec: &GraphCodec) -> Result<Self> {
                    match restore_scalar(ScalarKind::$variant, bytes)? {
                        Value::$variant(v) => Ok(v),
                        Value::Null => Ok(Self::default()),
                        other => Err(CodecError::Format(format!(
                            "stored {other:?} where {} was expected",
                            ScalarKind::$variant
                        ))),
                    }
                }
            }
        )*
    };
}

impl_storable_scalar!(
    bool => Bool, true;
    u8 => U8, true;
    i8 => I8, true;
    i16 => I16, true;
    u16 => U16, true;
    i32 => I32, true;
    u32 => U32, true;
    i64 => I64, true;
    u64 => U64, true;
    f32 => F32, true;
    f64 => F64, true;
    Uuid => Guid, true;
    NaiveDateTime => DateTime, true;
    PointF => Point, true;
    SizeF => Size, true;
    Decimal => Decimal, true;
    String => String, false;
    Vec<u8> => Bytes, false;
);

/// An object graph with a designated root, storable as a whole.
///
/// An empty document (no root) is null and is never shared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDocument {
    /// The arena.
    pub graph: ObjectGraph,
    /// The root object, if any.
    pub root: Option<ObjectId>,
}

impl GraphDocument {
    /// Wraps a graph and its root.
    pub fn new(graph: ObjectGraph, root: ObjectId) -> Self {
        Self {
            graph,
            root: Some(root),
        }
    }
}

impl Storable for GraphDocument {
    const VALUE_TYPE: bool = false;

    fn store(&self, codec: &GraphCodec) -> Result<Vec<u8>> {
        match self.root {
            Some(root) => codec.encode(&self.graph, root),
            None => Ok(Vec::new()),
        }
    }

    fn restore(bytes: &[u8], codec: &GraphCodec) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let decoded = codec.decode(bytes)?;
        Ok(Self::new(decoded.graph, decoded.root))
    }

    fn is_null(&self) -> bool {
        self.root.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::TypeCatalog;

    #[test]
    fn scalars_restore_exactly() {
        let codec = GraphCodec::new(TypeCatalog::new());
        let bytes = 42i64.store(&codec).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(i64::restore(&bytes, &codec).unwrap(), 42);
        assert_eq!(String::restore(&"héllo".to_string().store(&codec).unwrap(), &codec).unwrap(), "héllo");
        assert!(matches!(u32::restore(&[1, 2, 3, 4, 5], &codec), Err(CodecError::Format(_))));
    }

    #[test]
    fn empty_documents_are_null() {
        let codec = GraphCodec::new(TypeCatalog::new());
        let doc = GraphDocument::default();
        assert!(doc.is_null());
        assert!(doc.store(&codec).unwrap().is_empty());
        assert_eq!(GraphDocument::restore(&[], &codec).unwrap(), doc);
    }
}
