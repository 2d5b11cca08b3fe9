//! Session-scoped type registry (`DetectedTypes`).
//!
//! The first time a walk needs a type, the registry assigns it the next sequential id (starting
//! at 1; 0 means null/unknown), snapshots its serializable fields, and emits a `TYPE_DECL` block.
//! Later lookups return the cached descriptor without emitting anything. Ids are only meaningful
//! within one stream: readers rebuild the same registry by replaying declarations in the order
//! they arrive.

use std::collections::HashMap;
use std::io::Write;

use tracing::trace;

use crate::error::{CodecError, Result};
use crate::format::{
    ENUM_VALUE_FIELD, MEMBER_TYPIFICATION_SEP, MEMBERS_SEP, TYPEDEC_SEP, Tag, decl_kind,
};
use crate::io::{BlockReader, BlockWriter};
use crate::reflect::{TypeCatalog, TypeKind};
use crate::scalar::{decode_scalar, encode_scalar};
use crate::value::{IntKind, ScalarKind, Value};

/// A declared member: name and declared type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Member name.
    pub name: String,
    /// Declared type name.
    pub declared_type: String,
}

/// Everything a stream says about one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Session-local id, in first-encounter order.
    pub type_id: u32,
    /// Qualified type name.
    pub qualified_name: String,
    /// Type kind.
    pub kind: TypeKind,
    /// Serializable members, in the order `FIELD_VALUE` positions refer to.
    pub fields: Vec<FieldDecl>,
}

impl TypeDescriptor {
    /// Renders `Name<TYPEDEC_SEP>field<TYPESEP>Type<MEMBERS_SEP>...`.
    pub fn declaration(&self) -> String {
        let members: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{}{MEMBER_TYPIFICATION_SEP}{}", f.name, f.declared_type))
            .collect();
        format!(
            "{}{TYPEDEC_SEP}{}",
            self.qualified_name,
            members.join(&MEMBERS_SEP.to_string())
        )
    }

    /// The kind byte written next to the declaration.
    pub fn kind_byte(&self) -> u8 {
        match self.kind {
            TypeKind::Scalar(_) => decl_kind::SCALAR,
            TypeKind::Enum(_) => decl_kind::ENUM,
            TypeKind::Instance => decl_kind::INSTANCE,
            TypeKind::Collection => decl_kind::COLLECTION,
        }
    }

    /// Rebuilds a descriptor from its wire form.
    pub fn parse(type_id: u32, kind: u8, declaration: &str) -> Result<Self> {
        let (name, members) = declaration
            .split_once(TYPEDEC_SEP)
            .unwrap_or((declaration, ""));
        let fields = members
            .split(MEMBERS_SEP)
            .filter(|m| !m.is_empty())
            .map(|member| {
                let (name, declared_type) =
                    member.split_once(MEMBER_TYPIFICATION_SEP).ok_or_else(|| {
                        CodecError::Format(format!("member `{member}` has no declared type"))
                    })?;
                Ok(FieldDecl {
                    name: name.to_owned(),
                    declared_type: declared_type.to_owned(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let kind = match kind {
            decl_kind::SCALAR => TypeKind::Scalar(ScalarKind::from_name(name).ok_or_else(|| {
                CodecError::Format(format!("`{name}` is declared scalar but is not one"))
            })?),
            decl_kind::ENUM => {
                let repr = fields
                    .iter()
                    .find(|f| f.name == ENUM_VALUE_FIELD)
                    .and_then(|f| IntKind::from_name(&f.declared_type))
                    .ok_or_else(|| {
                        CodecError::Format(format!("enum `{name}` lacks an integer value__ member"))
                    })?;
                TypeKind::Enum(repr)
            }
            decl_kind::INSTANCE => TypeKind::Instance,
            decl_kind::COLLECTION => TypeKind::Collection,
            other => return Err(CodecError::Format(format!("unknown declaration kind {other}"))),
        };

        Ok(Self {
            type_id,
            qualified_name: name.to_owned(),
            kind,
            fields,
        })
    }

    /// Position of a member, as used by `FIELD_VALUE` blocks.
    pub fn position_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == field)
    }
}

/// Type registry for one serialization or deserialization session.
#[derive(Debug, Default)]
pub struct DetectedTypes {
    ids: HashMap<String, u32>,
    descriptors: Vec<TypeDescriptor>,
}

impl DetectedTypes {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of declared types.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if nothing has been declared.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Id of a declared type.
    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    /// Descriptor by id.
    pub fn get(&self, type_id: u32) -> Option<&TypeDescriptor> {
        let index = (type_id as usize).checked_sub(1)?;
        self.descriptors.get(index)
    }

    /// Descriptor of a type that must already be registered.
    ///
    /// # Errors
    /// [`CodecError::InternalConsistency`] if it is not: the walker registers every type before
    /// writing a block that refers to it, so a miss is a traversal-ordering bug.
    pub fn require(&self, name: &str) -> Result<&TypeDescriptor> {
        self.id_of(name).and_then(|id| self.get(id)).ok_or_else(|| {
            CodecError::InternalConsistency(format!("type `{name}` used before registration"))
        })
    }

    /// Declared types in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.descriptors.iter()
    }

    /// Registers `name` on first sight and emits its `TYPE_DECL` block to `out`.
    ///
    /// Returns the type id; repeated calls for the same name emit nothing.
    ///
    /// # Errors
    /// [`CodecError::Usage`] if the type is neither a scalar nor in the catalog.
    pub fn register<W: Write>(
        &mut self,
        name: &str,
        catalog: &TypeCatalog,
        out: &mut BlockWriter<W>,
    ) -> Result<u32> {
        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }
        let kind = catalog
            .kind_of(name)
            .ok_or_else(|| CodecError::Usage(format!("type `{name}` is not serializable")))?;
        self.register_kind(name, kind, catalog, out)
    }

    /// Like [`register`](Self::register), but with the kind already known from the value.
    ///
    /// Enums and collections need no catalog entry this way; instances still do, since their
    /// field list comes from the catalog.
    ///
    /// # Errors
    /// [`CodecError::Usage`] if `kind` is an instance kind and the catalog has no matching
    /// instance shape.
    pub fn register_kind<W: Write>(
        &mut self,
        name: &str,
        kind: TypeKind,
        catalog: &TypeCatalog,
        out: &mut BlockWriter<W>,
    ) -> Result<u32> {
        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }

        let fields = match kind {
            TypeKind::Enum(repr) => vec![FieldDecl {
                name: ENUM_VALUE_FIELD.to_owned(),
                declared_type: repr.name().to_owned(),
            }],
            TypeKind::Instance => {
                let shape = catalog
                    .shape(name)
                    .filter(|shape| shape.kind == TypeKind::Instance)
                    .ok_or_else(|| {
                        CodecError::Usage(format!("type `{name}` is not serializable"))
                    })?;
                shape
                    .serializable_fields()
                    .map(|f| FieldDecl {
                        name: f.name.clone(),
                        declared_type: f.declared_type.clone(),
                    })
                    .collect()
            }
            TypeKind::Scalar(_) | TypeKind::Collection => Vec::new(),
        };

        let type_id = u32::try_from(self.descriptors.len() + 1)
            .map_err(|_| CodecError::Usage("too many distinct types in one stream".into()))?;
        let descriptor = TypeDescriptor {
            type_id,
            qualified_name: name.to_owned(),
            kind,
            fields,
        };
        write_declaration(&descriptor, out)?;
        trace!(type_id, name, fields = descriptor.fields.len(), "declared type");

        self.ids.insert(name.to_owned(), type_id);
        self.descriptors.push(descriptor);
        Ok(type_id)
    }

    /// Accepts a declaration read from a stream (after its `TYPE_DECL` tag).
    ///
    /// # Errors
    /// [`CodecError::Format`] if the id is not the next one in sequence.
    pub fn read_declaration(&mut self, input: &mut BlockReader<'_>) -> Result<&TypeDescriptor> {
        let type_id = input.u32()?;
        let kind = input.u8()?;
        let (decl, used) = decode_scalar(ScalarKind::String, input.rest())?;
        input.advance(used)?;
        let Value::String(decl) = decl else {
            return Err(CodecError::InternalConsistency("string decoder returned non-string".into()));
        };

        let expected = self.descriptors.len() + 1;
        if type_id as usize != expected {
            return Err(CodecError::Format(format!(
                "type id {type_id} declared out of order (expected {expected})"
            )));
        }
        let descriptor = TypeDescriptor::parse(type_id, kind, &decl)?;
        if self.ids.contains_key(&descriptor.qualified_name) {
            return Err(CodecError::Format(format!(
                "type `{}` declared twice",
                descriptor.qualified_name
            )));
        }
        trace!(type_id, name = %descriptor.qualified_name, "replayed type declaration");

        self.ids.insert(descriptor.qualified_name.clone(), type_id);
        self.descriptors.push(descriptor);
        let index = self.descriptors.len() - 1;
        Ok(&self.descriptors[index])
    }
}

fn write_declaration<W: Write>(descriptor: &TypeDescriptor, out: &mut BlockWriter<W>) -> Result<()> {
    let decl = encode_scalar(&Value::String(descriptor.declaration()))?.ok_or_else(|| {
        CodecError::InternalConsistency("string declaration is not scalar-encodable".into())
    })?;
    out.tag(Tag::TypeDecl)?;
    out.u32(descriptor.type_id)?;
    out.u8(descriptor.kind_byte())?;
    out.write_all(&decl).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{FieldShape, TypeShape};

    fn catalog() -> TypeCatalog {
        let mut c = TypeCatalog::new();
        c.insert(
            TypeShape::instance("demo.Person")
                .field("name", "string")
                .field("age", "i32")
                .with_field(FieldShape::new("scratch", "i32").transient(true))
                .field("status", "demo.Status"),
        );
        c.enum_type("demo.Status", IntKind::U8);
        c
    }

    #[test]
    fn first_sight_declares_once() {
        let catalog = catalog();
        let mut types = DetectedTypes::new();
        let mut out = BlockWriter::new(Vec::new());

        assert_eq!(types.register("demo.Person", &catalog, &mut out).unwrap(), 1);
        let after_first = out.offset();
        assert_eq!(types.register("demo.Person", &catalog, &mut out).unwrap(), 1);
        assert_eq!(out.offset(), after_first);
        assert_eq!(types.register("i32", &catalog, &mut out).unwrap(), 2);

        let person = types.require("demo.Person").unwrap();
        let names: Vec<&str> = person.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["name", "age", "status"]);
        assert!(matches!(types.require("demo.Other"), Err(CodecError::InternalConsistency(_))));
    }

    #[test]
    fn unknown_types_are_not_serializable() {
        let mut types = DetectedTypes::new();
        let mut out = BlockWriter::new(Vec::new());
        let err = types.register("demo.Ghost", &TypeCatalog::new(), &mut out).unwrap_err();
        assert!(matches!(err, CodecError::Usage(_)));
        assert!(types.is_empty());
    }

    #[test]
    fn declarations_replay_in_order() {
        let catalog = catalog();
        let mut writer_side = DetectedTypes::new();
        let mut out = BlockWriter::new(Vec::new());
        writer_side.register("demo.Person", &catalog, &mut out).unwrap();
        writer_side.register("demo.Status", &catalog, &mut out).unwrap();
        let bytes = out.into_inner();

        let mut reader_side = DetectedTypes::new();
        let mut input = BlockReader::new(&bytes);
        for expected in writer_side.iter() {
            assert_eq!(input.tag().unwrap(), Tag::TypeDecl);
            let replayed = reader_side.read_declaration(&mut input).unwrap();
            assert_eq!(replayed, expected);
        }
        assert_eq!(
            reader_side.get(2).unwrap().kind,
            TypeKind::Enum(IntKind::U8)
        );
    }

    #[test]
    fn declaration_string_uses_separators() {
        let d = TypeDescriptor {
            type_id: 1,
            qualified_name: "demo.P".into(),
            kind: TypeKind::Instance,
            fields: vec![
                FieldDecl { name: "a".into(), declared_type: "i32".into() },
                FieldDecl { name: "b".into(), declared_type: "string".into() },
            ],
        };
        assert_eq!(d.declaration(), "demo.P\u{1D}a\u{1F}i32\u{1E}b\u{1F}string");
        assert_eq!(TypeDescriptor::parse(1, decl_kind::INSTANCE, &d.declaration()).unwrap(), d);
    }
}
