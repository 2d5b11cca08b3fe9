//! The read side: rebuilds an [`ObjectGraph`] from an encoded stream.
//!
//! Declarations are replayed in arrival order, so type ids are never assumed. An arena slot is
//! allocated as soon as an object header is read, before its body, which lets a field refer back
//! to the object that contains it. Back-references resolve to the same [`ObjectId`], so the
//! decoded graph has exactly the sharing and cycles of the encoded one.

use std::borrow::Cow;

use tracing::{debug, trace};

use crate::compression::CompressorRegistry;
use crate::error::{CodecError, Result};
use crate::format::{HEADER_SIZE, Header, Tag, Trailer};
use crate::graph::{Instance, Object, ObjectGraph, ObjectId};
use crate::io::BlockReader;
use crate::reflect::{TypeCatalog, TypeKind};
use crate::registry::{DetectedTypes, TypeDescriptor};
use crate::scalar::{decode_enum, decode_scalar};
use crate::value::Value;

/// A decoded graph and the handle of its root.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The rebuilt arena.
    pub graph: ObjectGraph,
    /// The root object.
    pub root: ObjectId,
}

/// Hooks called while a stream is decoded. Every method defaults to doing nothing.
///
/// Used by [`StreamInspector`](crate::inspector::StreamInspector) to describe a stream without
/// duplicating the decoder.
pub trait BlockObserver {
    /// A `TYPE_DECL` block was replayed.
    fn declared(&mut self, _descriptor: &TypeDescriptor) {}

    /// An `OBJ_INSTANCE` / `OBJ_COLLECTION` header was read; `blocks` sub-blocks follow.
    fn object_started(
        &mut self,
        _tag: Tag,
        _descriptor: &TypeDescriptor,
        _instance_id: u32,
        _blocks: u32,
        _depth: usize,
    ) {
    }

    /// A `FIELD_VALUE` / `COLLECTION_ITEM` slot was decoded. A slot that opens a nested object
    /// is reported after that object's header and before its body.
    fn slot(&mut self, _tag: Tag, _value: &Value, _depth: usize) {}

    /// A slot pointed back at an already decoded object.
    fn back_reference(&mut self, _instance_id: u32, _depth: usize) {}

    /// The body of the object most recently started at `depth` is complete.
    fn object_finished(&mut self, _depth: usize) {}

    /// The trailer was read and validated.
    fn trailer(&mut self, _trailer: &Trailer) {}
}

impl BlockObserver for () {}

/// Splits a full stream into its header and its decompressed body.
///
/// # Errors
/// [`CodecError::Format`] for a bad header, [`CodecError::Compression`] for an unknown format
/// kind or a corrupt body.
pub fn open_body<'a>(
    bytes: &'a [u8],
    compressors: &CompressorRegistry,
) -> Result<(Header, Cow<'a, [u8]>)> {
    let header = Header::parse(bytes)?;
    let body = compressors
        .get(header.kind)?
        .decompress(&bytes[HEADER_SIZE..])?;
    Ok((header, body))
}

/// Decoder configuration; each [`read`](Self::read) is an independent session.
#[derive(Debug, Clone, Copy)]
pub struct GraphReader<'c> {
    catalog: &'c TypeCatalog,
    max_depth: usize,
}

impl<'c> GraphReader<'c> {
    /// Creates a reader resolving field defaults against `catalog`.
    pub fn new(catalog: &'c TypeCatalog, max_depth: usize) -> Self {
        Self { catalog, max_depth }
    }

    /// Decodes a stream body (everything after the header, already decompressed).
    ///
    /// # Errors
    /// [`CodecError::Format`] for any structural violation: unknown tags, out-of-order ids,
    /// type mismatches on back-references, trailer count mismatches, trailing bytes, or
    /// nesting deeper than the configured limit.
    pub fn read(&self, body: &[u8]) -> Result<Decoded> {
        self.read_observed(body, &mut ())
    }

    /// Like [`read`](Self::read), reporting every block to `observer`.
    pub fn read_observed(&self, body: &[u8], observer: &mut dyn BlockObserver) -> Result<Decoded> {
        let mut session = Session {
            catalog: self.catalog,
            max_depth: self.max_depth,
            input: BlockReader::new(body),
            types: DetectedTypes::new(),
            graph: ObjectGraph::new(),
            instances: Vec::new(),
            observer,
        };

        let root = session.read_graph()?;

        if session.next_tag()? != Tag::Trailer {
            return Err(CodecError::Format("expected trailer after the root block".into()));
        }
        let trailer = Trailer {
            instance_count: session.input.u32()?,
            type_count: session.input.u32()?,
        };
        if trailer.instance_count as usize != session.instances.len()
            || trailer.type_count as usize != session.types.len()
        {
            return Err(CodecError::Format(format!(
                "trailer claims {} instances / {} types, stream held {} / {}",
                trailer.instance_count,
                trailer.type_count,
                session.instances.len(),
                session.types.len()
            )));
        }
        if session.input.remaining() != 0 {
            return Err(CodecError::Format(format!(
                "{} trailing bytes after trailer",
                session.input.remaining()
            )));
        }
        session.observer.trailer(&trailer);

        debug!(
            instances = trailer.instance_count,
            types = trailer.type_count,
            bytes = body.len(),
            "object graph decoded"
        );
        Ok(Decoded {
            graph: session.graph,
            root,
        })
    }
}

/// An object whose header is read and whose sub-blocks are still pending.
struct OpenObject {
    id: ObjectId,
    type_id: u32,
    /// `FIELD_VALUE` or `COLLECTION_ITEM`.
    item_tag: Tag,
    remaining: u32,
    depth: usize,
}

struct Session<'a, 'o> {
    catalog: &'a TypeCatalog,
    max_depth: usize,
    input: BlockReader<'a>,
    types: DetectedTypes,
    graph: ObjectGraph,
    /// `instances[i]` is the handle of instance id `i + 1`.
    instances: Vec<ObjectId>,
    observer: &'o mut dyn BlockObserver,
}

impl Session<'_, '_> {
    /// Reads the next block tag, replaying any declarations in front of it.
    fn next_tag(&mut self) -> Result<Tag> {
        loop {
            let tag = self.input.tag()?;
            if tag != Tag::TypeDecl {
                return Ok(tag);
            }
            let descriptor = self.types.read_declaration(&mut self.input)?;
            self.observer.declared(descriptor);
        }
    }

    fn descriptor(&self, type_id: u32) -> Result<&TypeDescriptor> {
        self.types
            .get(type_id)
            .ok_or_else(|| CodecError::Format(format!("type id {type_id} used before declaration")))
    }

    /// Reads the root object and everything nested in it.
    ///
    /// Open objects are tracked on an explicit stack, so nesting costs heap rather than call
    /// stack and hostile depths end in the `max_depth` check.
    fn read_graph(&mut self) -> Result<ObjectId> {
        let root = self.open_object(None, 0)?;
        let root_id = root.id;
        let mut open = vec![root];

        while let Some(frame) = open.last_mut() {
            if frame.remaining == 0 {
                let depth = frame.depth;
                open.pop();
                self.observer.object_finished(depth);
                continue;
            }
            frame.remaining -= 1;
            let (id, type_id, item_tag, depth) = (frame.id, frame.type_id, frame.item_tag, frame.depth);

            let found = self.next_tag()?;
            if found != item_tag {
                return Err(CodecError::Format(format!("expected {item_tag:?}, found {found:?}")));
            }
            let field = if item_tag == Tag::FieldValue {
                let pos = self.input.u32()?;
                let name = self
                    .descriptor(type_id)?
                    .fields
                    .get(pos as usize)
                    .map(|f| f.name.clone())
                    .ok_or_else(|| {
                        CodecError::Format(format!("field position {pos} out of range for type {type_id}"))
                    })?;
                Some(name)
            } else {
                None
            };

            let (value, child) = self.read_slot(depth)?;
            self.observer.slot(item_tag, &value, depth);
            match field {
                Some(name) => self.graph.set_field(id, &name, value)?,
                None => self.graph.push_item(id, value)?,
            }
            if let Some(child) = child {
                open.push(child);
            }
        }
        Ok(root_id)
    }

    /// Reads an object header and allocates its arena slot. `expected` carries the ids announced
    /// by the enclosing slot.
    fn open_object(&mut self, expected: Option<(u32, u32)>, depth: usize) -> Result<OpenObject> {
        if depth > self.max_depth {
            return Err(CodecError::Format(format!(
                "object nesting exceeds the configured depth of {}",
                self.max_depth
            )));
        }

        let tag = self.next_tag()?;
        let type_id = self.input.u32()?;
        let instance_id = self.input.u32()?;
        let blocks = self.input.u32()?;

        if let Some(announced) = expected
            && announced != (type_id, instance_id)
        {
            return Err(CodecError::Format(format!(
                "slot announced type {} instance {}, block holds type {type_id} instance {instance_id}",
                announced.0, announced.1
            )));
        }
        let next_id = self.instances.len() + 1;
        if instance_id as usize != next_id {
            return Err(CodecError::Format(format!(
                "instance id {instance_id} out of order (expected {next_id})"
            )));
        }

        let descriptor = self.descriptor(type_id)?;
        let (item_tag, id) = match (tag, descriptor.kind) {
            (Tag::ObjInstance, TypeKind::Instance) => (Tag::FieldValue, self.allocate_instance(type_id)?),
            (Tag::ObjCollection, TypeKind::Collection) => {
                let name = descriptor.qualified_name.clone();
                let capacity = (blocks as usize).min(self.input.remaining());
                (
                    Tag::CollectionItem,
                    self.graph.add_collection(name, Vec::with_capacity(capacity))?,
                )
            }
            (tag, kind) => {
                return Err(CodecError::Format(format!(
                    "{tag:?} block cannot hold a value of kind {kind:?}"
                )));
            }
        };
        self.instances.push(id);
        if let Some(descriptor) = self.types.get(type_id) {
            self.observer
                .object_started(tag, descriptor, instance_id, blocks, depth);
        }
        trace!(instance_id, type_id, blocks, depth, "decoding object");

        Ok(OpenObject {
            id,
            type_id,
            item_tag,
            remaining: blocks,
            depth,
        })
    }

    /// Creates an instance with every declared (and catalogued) field at its default.
    fn allocate_instance(&mut self, type_id: u32) -> Result<ObjectId> {
        let descriptor = self
            .types
            .get(type_id)
            .ok_or_else(|| CodecError::Format(format!("type id {type_id} used before declaration")))?;
        let name = &descriptor.qualified_name;
        if self
            .catalog
            .shape(name)
            .is_some_and(|shape| shape.kind == TypeKind::Instance)
        {
            return self.graph.instantiate(self.catalog, name);
        }
        let fields = descriptor
            .fields
            .iter()
            .map(|f| (f.name.clone(), self.catalog.default_for(&f.declared_type)))
            .collect();
        self.graph.add(Object::Instance(Instance {
            type_name: name.clone(),
            fields,
        }))
    }

    /// Reads a slot payload. A first visit to a composite opens it; its body follows.
    fn read_slot(&mut self, depth: usize) -> Result<(Value, Option<OpenObject>)> {
        let type_id = self.input.u32()?;
        if type_id == 0 {
            return Ok((Value::Null, None));
        }

        let descriptor = self.descriptor(type_id)?;
        match descriptor.kind {
            TypeKind::Scalar(kind) => {
                let (value, used) = decode_scalar(kind, self.input.rest())?;
                self.input.advance(used)?;
                Ok((value, None))
            }
            TypeKind::Enum(repr) => {
                let (value, used) = decode_enum(&descriptor.qualified_name, repr, self.input.rest())?;
                self.input.advance(used)?;
                Ok((value, None))
            }
            TypeKind::Instance | TypeKind::Collection => {
                let instance_id = self.input.u32()?;
                let known = self.instances.len();
                match instance_id as usize {
                    0 => Err(CodecError::Format("instance id 0 is reserved".into())),
                    n if n <= known => {
                        let target = self.instances[n - 1];
                        let target_type = self.graph.get(target)?.type_name();
                        if target_type != self.descriptor(type_id)?.qualified_name {
                            return Err(CodecError::Format(format!(
                                "back-reference to instance {instance_id} ({target_type}) under type {type_id}"
                            )));
                        }
                        self.observer.back_reference(instance_id, depth + 1);
                        Ok((Value::Ref(target), None))
                    }
                    n if n == known + 1 => {
                        let child = self.open_object(Some((type_id, instance_id)), depth + 1)?;
                        Ok((Value::Ref(child.id), Some(child)))
                    }
                    _ => Err(CodecError::Format(format!(
                        "instance id {instance_id} refers past the {known} objects read so far"
                    ))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::equivalent;
    use crate::reflect::TypeShape;
    use crate::writer::GraphWriter;

    fn catalog() -> TypeCatalog {
        let mut c = TypeCatalog::new();
        c.insert(
            TypeShape::instance("demo.Node")
                .field("label", "string")
                .field("next", "demo.Node")
                .field("other", "demo.Node"),
        );
        c
    }

    fn encode(g: &ObjectGraph, root: ObjectId, catalog: &TypeCatalog) -> Vec<u8> {
        GraphWriter::new(g, catalog, Vec::new(), 64).write(root).unwrap().0
    }

    #[test]
    fn cycles_decode_to_the_same_handle() {
        let catalog = catalog();
        let mut g = ObjectGraph::new();
        let a = g.instantiate(&catalog, "demo.Node").unwrap();
        g.set_field(a, "label", "a").unwrap();
        g.set_field(a, "next", a).unwrap();

        let decoded = GraphReader::new(&catalog, 64).read(&encode(&g, a, &catalog)).unwrap();
        let next = decoded.graph.field(decoded.root, "next").unwrap();
        assert_eq!(next, Some(&Value::Ref(decoded.root)));
        assert!(equivalent(&g, a, &decoded.graph, decoded.root));
    }

    #[test]
    fn shared_children_stay_shared() {
        let catalog = catalog();
        let mut g = ObjectGraph::new();
        let root = g.instantiate(&catalog, "demo.Node").unwrap();
        let child = g.instantiate(&catalog, "demo.Node").unwrap();
        g.set_field(child, "label", "leaf").unwrap();
        g.set_field(root, "next", child).unwrap();
        g.set_field(root, "other", child).unwrap();

        let decoded = GraphReader::new(&catalog, 64).read(&encode(&g, root, &catalog)).unwrap();
        assert_eq!(decoded.graph.len(), 2);
        let next = decoded.graph.field(decoded.root, "next").unwrap().cloned();
        let other = decoded.graph.field(decoded.root, "other").unwrap().cloned();
        assert_eq!(next, other);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let catalog = catalog();
        let mut g = ObjectGraph::new();
        let a = g.instantiate(&catalog, "demo.Node").unwrap();
        let mut bytes = encode(&g, a, &catalog);
        bytes.push(0);
        let err = GraphReader::new(&catalog, 64).read(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Format(_)));
    }

    #[test]
    fn truncated_streams_are_rejected() {
        let catalog = catalog();
        let mut g = ObjectGraph::new();
        let a = g.instantiate(&catalog, "demo.Node").unwrap();
        g.set_field(a, "label", "truncate me").unwrap();
        let bytes = encode(&g, a, &catalog);
        for cut in [1, bytes.len() / 2, bytes.len() - 1] {
            assert!(GraphReader::new(&catalog, 64).read(&bytes[..cut]).is_err());
        }
    }

    #[test]
    fn unknown_types_decode_with_declared_defaults() {
        let writer_catalog = catalog();
        let mut g = ObjectGraph::new();
        let a = g.instantiate(&writer_catalog, "demo.Node").unwrap();
        g.set_field(a, "label", "x").unwrap();
        let bytes = encode(&g, a, &writer_catalog);

        let decoded = GraphReader::new(&TypeCatalog::new(), 64).read(&bytes).unwrap();
        assert_eq!(
            decoded.graph.field(decoded.root, "label").unwrap(),
            Some(&Value::String("x".into()))
        );
        assert_eq!(decoded.graph.field(decoded.root, "next").unwrap(), Some(&Value::Null));
    }
}
