// src/inspector.rs

//! Tools for inspecting the block structure of encoded object graphs.
//! Useful for checking sparse encoding, declaration dedup and sharing.

use std::path::Path;

use serde::Serialize;

use crate::compression::CompressorRegistry;
use crate::constants::DEFAULT_MAX_DEPTH;
use crate::error::{CodecError, Result};
use crate::format::Tag;
use crate::reader::{BlockObserver, GraphReader, open_body};
use crate::reflect::TypeCatalog;
use crate::registry::TypeDescriptor;
use crate::value::Value;

/// A structural report of an encoded stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamReport {
    /// Total stream size, header included.
    pub total_size: usize,
    /// Decompressed body size.
    pub body_size: usize,
    /// Compression algorithm named by the header.
    pub compression_algo: String,
    /// Number of `TYPE_DECL` blocks.
    pub type_decls: usize,
    /// Number of `OBJ_INSTANCE` blocks.
    pub instances: usize,
    /// Number of `OBJ_COLLECTION` blocks.
    pub collections: usize,
    /// Number of `FIELD_VALUE` blocks.
    pub field_values: usize,
    /// Number of `COLLECTION_ITEM` blocks.
    pub collection_items: usize,
    /// Slots that pointed at an already written object.
    pub back_references: usize,
    /// Null slots.
    pub null_slots: usize,
    /// Deepest object nesting (root is 0).
    pub max_depth: usize,
    /// Declared type names in id order.
    pub declared_types: Vec<String>,
    /// The object tree, in write order.
    pub tree: Option<ObjectInfo>,
}

/// One object block in the tree.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectInfo {
    /// Instance id.
    pub instance_id: u32,
    /// Qualified type name.
    pub type_name: String,
    /// Whether this is a collection block.
    pub is_collection: bool,
    /// Number of `FIELD_VALUE` or `COLLECTION_ITEM` sub-blocks.
    pub blocks: u32,
    /// Instance ids this object points back at.
    pub back_references: Vec<u32>,
    /// Objects first written inside this one.
    pub children: Vec<ObjectInfo>,
}

impl StreamReport {
    /// Number of `TYPE_DECL` blocks naming `type_name` (0 or 1 in a well-formed stream).
    pub fn declarations_of(&self, type_name: &str) -> usize {
        self.declared_types.iter().filter(|n| *n == type_name).count()
    }
}

/// The stream inspector tool.
#[derive(Debug)]
pub struct StreamInspector;

impl StreamInspector {
    /// Analyzes an encoded stream and returns a structural report.
    ///
    /// Nesting is bounded by [`DEFAULT_MAX_DEPTH`]; deeper streams are a
    /// [`CodecError::Format`], as they are for [`GraphCodec::decode`](crate::GraphCodec::decode).
    pub fn inspect(bytes: &[u8]) -> Result<StreamReport> {
        Self::inspect_with_depth(bytes, DEFAULT_MAX_DEPTH)
    }

    /// Like [`inspect`](Self::inspect), for streams written with a different depth limit.
    pub fn inspect_with_depth(bytes: &[u8], max_depth: usize) -> Result<StreamReport> {
        let (header, body) = open_body(bytes, &CompressorRegistry::new())?;
        let mut collector = Collector {
            report: StreamReport {
                total_size: bytes.len(),
                body_size: body.len(),
                compression_algo: algo_name(header.kind),
                ..StreamReport::default()
            },
            open: Vec::new(),
        };

        // Field defaults do not matter for the report.
        let catalog = TypeCatalog::new();
        GraphReader::new(&catalog, max_depth).read_observed(&body, &mut collector)?;

        if !collector.open.is_empty() {
            return Err(CodecError::InternalConsistency(
                "inspector finished with unclosed objects".into(),
            ));
        }
        Ok(collector.report)
    }

    /// Analyzes an encoded file.
    pub fn inspect_file<P: AsRef<Path>>(path: P) -> Result<StreamReport> {
        let bytes = std::fs::read(path)?;
        Self::inspect(&bytes)
    }
}

fn algo_name(kind: u8) -> String {
    match kind {
        0 => "None".to_string(),
        1 => "LZ4".to_string(),
        2 => "Deflate".to_string(),
        3 => "Gzip".to_string(),
        _ => format!("Unknown({})", kind),
    }
}

struct Collector {
    report: StreamReport,
    open: Vec<ObjectInfo>,
}

impl BlockObserver for Collector {
    fn declared(&mut self, descriptor: &TypeDescriptor) {
        self.report.type_decls += 1;
        self.report
            .declared_types
            .push(descriptor.qualified_name.clone());
    }

    fn object_started(
        &mut self,
        tag: Tag,
        descriptor: &TypeDescriptor,
        instance_id: u32,
        blocks: u32,
        depth: usize,
    ) {
        let is_collection = tag == Tag::ObjCollection;
        if is_collection {
            self.report.collections += 1;
        } else {
            self.report.instances += 1;
        }
        self.report.max_depth = self.report.max_depth.max(depth);
        self.open.push(ObjectInfo {
            instance_id,
            type_name: descriptor.qualified_name.clone(),
            is_collection,
            blocks,
            back_references: Vec::new(),
            children: Vec::new(),
        });
    }

    fn slot(&mut self, tag: Tag, value: &Value, _depth: usize) {
        match tag {
            Tag::FieldValue => self.report.field_values += 1,
            _ => self.report.collection_items += 1,
        }
        if value.is_null() {
            self.report.null_slots += 1;
        }
    }

    fn back_reference(&mut self, instance_id: u32, _depth: usize) {
        self.report.back_references += 1;
        if let Some(current) = self.open.last_mut() {
            current.back_references.push(instance_id);
        }
    }

    fn object_finished(&mut self, _depth: usize) {
        let Some(done) = self.open.pop() else {
            return;
        };
        match self.open.last_mut() {
            Some(parent) => parent.children.push(done),
            None => self.report.tree = Some(done),
        }
    }
}

impl std::fmt::Display for StreamReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== GRAPHCODEC INSPECTOR REPORT ===")?;
        writeln!(
            f,
            "Size:           {}b ({}b body, {})",
            self.total_size, self.body_size, self.compression_algo
        )?;
        writeln!(
            f,
            "Blocks:         {} decl | {} inst | {} coll | {} field | {} item",
            self.type_decls,
            self.instances,
            self.collections,
            self.field_values,
            self.collection_items
        )?;
        writeln!(f, "Back-refs:      {}", self.back_references)?;
        writeln!(f, "Max depth:      {}", self.max_depth)?;
        writeln!(f, "\n[TYPES]")?;
        for (i, name) in self.declared_types.iter().enumerate() {
            writeln!(f, "  #{} {}", i + 1, name)?;
        }
        writeln!(f, "\n[GRAPH LAYOUT]")?;
        match &self.tree {
            Some(root) => root.fmt_tree(f),
            None => Ok(()),
        }
    }
}

// Nesting can be as deep as the inspection limit; unlink children instead of recursing.
impl Drop for ObjectInfo {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

impl ObjectInfo {
    fn fmt_tree(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // (node, prefix of its line, last among its siblings)
        let mut pending: Vec<(&ObjectInfo, String, bool)> = vec![(self, String::new(), true)];
        while let Some((node, prefix, is_last)) = pending.pop() {
            let connector = if is_last { "└── " } else { "├── " };
            let child_prefix = if is_last { "    " } else { "│   " };
            let refs = if node.back_references.is_empty() {
                String::new()
            } else {
                let ids: Vec<String> =
                    node.back_references.iter().map(|id| format!("#{id}")).collect();
                format!(" -> {}", ids.join(", "))
            };
            let kind = if node.is_collection { "items" } else { "fields" };

            writeln!(
                f,
                "{}{}#{} {} | {} {}{}",
                prefix, connector, node.instance_id, node.type_name, node.blocks, kind, refs
            )?;

            let nested = format!("{prefix}{child_prefix}");
            let last = node.children.len().saturating_sub(1);
            for (i, child) in node.children.iter().enumerate().rev() {
                pending.push((child, nested.clone(), i == last));
            }
        }
        Ok(())
    }
}
