//! The object graph walker.
//!
//! [`GraphWriter`] walks an [`ObjectGraph`] depth first from a root handle and appends blocks to
//! a [`BlockWriter`]. Every type is registered (and its `TYPE_DECL` emitted) at a block boundary
//! before the first block that refers to it. Objects already in the [`TravelTrace`] are written
//! as bare instance ids, which is what keeps cycles finite and shared sub-objects single.

use std::io::Write;

use tracing::{debug, trace};

use crate::error::{CodecError, Result};
use crate::format::{Tag, Trailer};
use crate::graph::{Object, ObjectGraph, ObjectId};
use crate::io::BlockWriter;
use crate::reflect::{TypeCatalog, TypeKind};
use crate::registry::DetectedTypes;
use crate::scalar::encode_scalar;
use crate::trace::{TravelTrace, Visit};
use crate::value::Value;

/// Totals of a finished walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkSummary {
    /// Distinct objects written.
    pub instances: u32,
    /// Types declared.
    pub types: u32,
    /// Body bytes written, trailer included.
    pub bytes: u64,
}

/// One serialization session.
///
/// The registry and the trace live exactly as long as the session, so type ids and instance ids
/// are never shared between two walks.
#[derive(Debug)]
pub struct GraphWriter<'a, W: Write> {
    graph: &'a ObjectGraph,
    catalog: &'a TypeCatalog,
    types: DetectedTypes,
    trace: TravelTrace,
    out: BlockWriter<W>,
    max_depth: usize,
}

impl<'a, W: Write> GraphWriter<'a, W> {
    /// Starts a session writing into `sink`.
    pub fn new(graph: &'a ObjectGraph, catalog: &'a TypeCatalog, sink: W, max_depth: usize) -> Self {
        Self {
            graph,
            catalog,
            types: DetectedTypes::new(),
            trace: TravelTrace::new(),
            out: BlockWriter::new(sink),
            max_depth,
        }
    }

    /// Writes the whole graph reachable from `root`, followed by the trailer.
    ///
    /// The walk keeps its own stack of open objects, so nesting costs heap rather than call
    /// stack; `max_depth` is a policy limit, not a guard against overflow.
    ///
    /// # Errors
    /// [`CodecError::Usage`] if `root` does not belong to the graph, a reachable instance type is
    /// not in the catalog, or nesting exceeds the depth limit. A failed walk leaves a partial
    /// stream in the sink that must be discarded.
    pub fn write(mut self, root: ObjectId) -> Result<(W, WalkSummary)> {
        let graph = self.graph;
        let object = graph.get(root)?;
        let type_id = self.prepare_object(object)?;
        let Visit::New(instance_id) = self.trace.enter(root) else {
            return Err(CodecError::InternalConsistency("fresh session already saw the root".into()));
        };
        debug!(root = %root, type_name = object.type_name(), "walking object graph");

        let mut open = vec![self.open_object(root, type_id, instance_id, 0)?];
        while let Some(frame) = open.last_mut() {
            let Some((pos, value)) = frame.slots.next() else {
                open.pop();
                continue;
            };
            let (tag, depth) = (frame.tag, frame.depth);

            self.prepare(value)?;
            self.out.tag(tag)?;
            if tag == Tag::FieldValue {
                self.out.u32(pos)?;
            }
            if let Some(child) = self.write_slot(value, depth)? {
                open.push(child);
            }
        }

        let trailer = Trailer {
            instance_count: to_u32(self.trace.len())?,
            type_count: to_u32(self.types.len())?,
        };
        self.out.tag(Tag::Trailer)?;
        self.out.u32(trailer.instance_count)?;
        self.out.u32(trailer.type_count)?;
        self.out.flush()?;

        let summary = WalkSummary {
            instances: trailer.instance_count,
            types: trailer.type_count,
            bytes: self.out.offset(),
        };
        debug!(
            instances = summary.instances,
            types = summary.types,
            bytes = summary.bytes,
            "object graph written"
        );
        Ok((self.out.into_inner(), summary))
    }

    /// Registers the type of a composite object.
    fn prepare_object(&mut self, object: &Object) -> Result<u32> {
        let kind = match object {
            Object::Instance(_) => TypeKind::Instance,
            Object::Collection(_) => TypeKind::Collection,
        };
        self.types
            .register_kind(object.type_name(), kind, self.catalog, &mut self.out)
    }

    /// Registers whatever type a slot value needs. Must run at a block boundary.
    fn prepare(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::Ref(target) => {
                let graph = self.graph;
                self.prepare_object(graph.get(*target)?).map(drop)
            }
            Value::Enum(e) => self
                .types
                .register_kind(&e.type_name, TypeKind::Enum(e.repr), self.catalog, &mut self.out)
                .map(drop),
            scalar => {
                let kind = scalar.scalar_kind().ok_or_else(|| {
                    CodecError::InternalConsistency(format!("{scalar:?} has no scalar kind"))
                })?;
                self.types
                    .register_kind(kind.name(), TypeKind::Scalar(kind), self.catalog, &mut self.out)
                    .map(drop)
            }
        }
    }

    /// Writes an object header and returns the slots its body still owes.
    fn open_object(
        &mut self,
        id: ObjectId,
        type_id: u32,
        instance_id: u32,
        depth: usize,
    ) -> Result<OpenObject<'a>> {
        if depth > self.max_depth {
            return Err(CodecError::Usage(format!(
                "object nesting exceeds the configured depth of {}",
                self.max_depth
            )));
        }

        let graph = self.graph;
        let (tag, slots): (Tag, Vec<(u32, &'a Value)>) = match graph.get(id)? {
            Object::Instance(instance) => {
                let descriptor = self.types.get(type_id).ok_or_else(|| {
                    CodecError::InternalConsistency(format!("type id {type_id} not registered"))
                })?;
                // Sparse: fields at their default are left out entirely.
                let present = descriptor
                    .fields
                    .iter()
                    .enumerate()
                    .filter_map(|(pos, field)| {
                        instance
                            .fields
                            .get(&field.name)
                            .filter(|v| !v.is_default())
                            .map(|v| (pos as u32, v))
                    })
                    .collect();
                (Tag::ObjInstance, present)
            }
            Object::Collection(collection) => (
                Tag::ObjCollection,
                collection.items.iter().map(|item| (0, item)).collect(),
            ),
        };

        self.out.tag(tag)?;
        self.out.u32(type_id)?;
        self.out.u32(instance_id)?;
        self.out.u32(to_u32(slots.len())?)?;
        trace!(instance_id, type_id, blocks = slots.len(), depth, "object");

        Ok(OpenObject {
            tag: if tag == Tag::ObjInstance {
                Tag::FieldValue
            } else {
                Tag::CollectionItem
            },
            slots: slots.into_iter(),
            depth,
        })
    }

    /// Writes a slot payload. A first visit to a composite opens it and hands it back.
    fn write_slot(&mut self, value: &Value, depth: usize) -> Result<Option<OpenObject<'a>>> {
        match value {
            Value::Null => self.out.u32(0).map(|()| None),
            Value::Ref(target) => {
                let graph = self.graph;
                let type_id = self.types.require(graph.get(*target)?.type_name())?.type_id;
                let visit = self.trace.enter(*target);
                self.out.u32(type_id)?;
                self.out.u32(visit.instance_id())?;
                match visit {
                    Visit::New(instance_id) => self
                        .open_object(*target, type_id, instance_id, depth + 1)
                        .map(Some),
                    Visit::Seen(instance_id) => {
                        trace!(instance_id, "back-reference");
                        Ok(None)
                    }
                }
            }
            scalar => {
                let name = match scalar {
                    Value::Enum(e) => e.type_name.as_str(),
                    other => other.scalar_kind().map(|k| k.name()).unwrap_or_default(),
                };
                let type_id = self.types.require(name)?.type_id;
                let payload = encode_scalar(scalar)?.ok_or_else(|| {
                    CodecError::InternalConsistency(format!("{scalar:?} is not scalar-encodable"))
                })?;
                self.out.u32(type_id)?;
                self.out.write_all(&payload).map(|_| None)
            }
        }
    }
}

/// An object whose header is written and whose sub-blocks are still pending.
#[derive(Debug)]
struct OpenObject<'a> {
    /// `FIELD_VALUE` or `COLLECTION_ITEM`.
    tag: Tag,
    /// Field position (0 for items) and value of each pending sub-block.
    slots: std::vec::IntoIter<(u32, &'a Value)>,
    depth: usize,
}

fn to_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| CodecError::Usage("graph exceeds u32 counts".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BlockReader;
    use crate::reflect::TypeShape;

    fn catalog() -> TypeCatalog {
        let mut c = TypeCatalog::new();
        c.insert(
            TypeShape::instance("demo.Node")
                .field("value", "i32")
                .field("next", "demo.Node"),
        );
        c
    }

    #[test]
    fn self_reference_is_written_once() {
        let catalog = catalog();
        let mut g = ObjectGraph::new();
        let a = g.add_instance("demo.Node").unwrap();
        g.set_field(a, "next", a).unwrap();

        let (bytes, summary) = GraphWriter::new(&g, &catalog, Vec::new(), 8).write(a).unwrap();
        assert_eq!(summary.instances, 1);
        assert_eq!(summary.types, 1);
        assert_eq!(bytes.iter().filter(|b| **b == Tag::ObjInstance.as_u8()).count(), 1);
    }

    #[test]
    fn default_instance_has_no_field_blocks() {
        let catalog = catalog();
        let mut g = ObjectGraph::new();
        let a = g.instantiate(&catalog, "demo.Node").unwrap();

        let (bytes, _) = GraphWriter::new(&g, &catalog, Vec::new(), 8).write(a).unwrap();
        let mut r = BlockReader::new(&bytes);
        assert_eq!(r.tag().unwrap(), Tag::TypeDecl);
        r.u32().unwrap();
        r.u8().unwrap();
        r.framed().unwrap();
        assert_eq!(r.tag().unwrap(), Tag::ObjInstance);
        assert_eq!((r.u32().unwrap(), r.u32().unwrap(), r.u32().unwrap()), (1, 1, 0));
        assert_eq!(r.tag().unwrap(), Tag::Trailer);
    }

    #[test]
    fn depth_limit_is_a_usage_error() {
        let catalog = catalog();
        let mut g = ObjectGraph::new();
        let mut head = g.add_instance("demo.Node").unwrap();
        for _ in 0..5 {
            let n = g.add_instance("demo.Node").unwrap();
            g.set_field(n, "next", head).unwrap();
            head = n;
        }
        let err = GraphWriter::new(&g, &catalog, Vec::new(), 3).write(head).unwrap_err();
        assert!(matches!(err, CodecError::Usage(_)));
    }

    #[test]
    fn uncatalogued_instances_are_rejected() {
        let mut g = ObjectGraph::new();
        let a = g.add_instance("demo.Ghost").unwrap();
        let err = GraphWriter::new(&g, &TypeCatalog::new(), Vec::new(), 8)
            .write(a)
            .unwrap_err();
        assert!(matches!(err, CodecError::Usage(_)));
    }
}
