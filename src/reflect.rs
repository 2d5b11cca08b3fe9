//! Field enumeration for composite types.
//!
//! The walker never inspects Rust types at runtime. Instead every serializable type publishes a
//! [`TypeShape`] (its ordered fields and their declared types) into a [`TypeCatalog`], either by
//! hand or through `#[derive(GraphType)]`:
//!
//! ```rust
//! use graphcodec::{GraphType, TypeCatalog};
//!
//! #[derive(GraphType)]
//! #[graph(name = "shop.Order")]
//! struct Order {
//!     id: u64,
//!     customer: String,
//!     #[graph(transient)]
//!     cached_total: f64,
//! }
//!
//! let mut catalog = TypeCatalog::new();
//! catalog.register::<Order>();
//! let shape = catalog.shape("shop.Order").unwrap();
//! assert_eq!(shape.serializable_fields().count(), 2);
//! ```

use std::collections::HashMap;

use crate::value::{EnumValue, IntKind, ScalarKind, Value};

/// What kind of type a shape describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// A whitelisted scalar.
    Scalar(ScalarKind),
    /// An enumeration carried by an integer.
    Enum(IntKind),
    /// A composite with named fields.
    Instance,
    /// An ordered/unordered container of items.
    Collection,
}

impl TypeKind {
    /// Whether values of this kind are encoded as objects (with instance ids).
    pub const fn is_composite(self) -> bool {
        matches!(self, Self::Instance | Self::Collection)
    }
}

/// One field of a composite type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldShape {
    /// Field name.
    pub name: String,
    /// Declared type name (scalar name, catalogued type name, or any other spelling).
    pub declared_type: String,
    /// Excluded from serialization.
    pub transient: bool,
    /// Function/delegate-typed; always excluded from serialization.
    pub delegate: bool,
}

impl FieldShape {
    /// A plain serializable field.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            transient: false,
            delegate: false,
        }
    }

    /// Marks the field transient.
    pub fn transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    /// Marks the field as holding a function or delegate.
    pub fn delegate(mut self, delegate: bool) -> Self {
        self.delegate = delegate;
        self
    }

    /// Whether the walker writes this field.
    pub fn is_serializable(&self) -> bool {
        !self.transient && !self.delegate
    }
}

/// Ordered description of a type's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeShape {
    /// Qualified name (`namespace.TypeName`).
    pub name: String,
    /// Type kind.
    pub kind: TypeKind,
    /// Fields in declaration order.
    pub fields: Vec<FieldShape>,
}

impl TypeShape {
    /// Shape of a composite instance type with no fields yet.
    pub fn instance(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Instance,
            fields: Vec::new(),
        }
    }

    /// Shape of a collection type.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Collection,
            fields: Vec::new(),
        }
    }

    /// Shape of an enum type over `repr`.
    pub fn enumeration(name: impl Into<String>, repr: IntKind) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Enum(repr),
            fields: Vec::new(),
        }
    }

    /// Appends a field.
    pub fn with_field(mut self, field: FieldShape) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends a plain field by name and declared type.
    pub fn field(self, name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        self.with_field(FieldShape::new(name, declared_type))
    }

    /// Fields the walker writes, in declaration order.
    pub fn serializable_fields(&self) -> impl Iterator<Item = &FieldShape> {
        self.fields.iter().filter(|f| f.is_serializable())
    }
}

/// Implemented by Rust types that publish a [`TypeShape`]. Usually derived.
pub trait Reflect {
    /// The type's shape.
    fn shape() -> TypeShape;
}

/// Name-indexed registry of type shapes: the metamodel the codec consults.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    shapes: HashMap<String, TypeShape>,
}

impl TypeCatalog {
    /// Creates an empty catalog. Scalars never need registering.
    pub fn new() -> Self {
        Self {
            shapes: HashMap::new(),
        }
    }

    /// Registers the shape of `T`.
    pub fn register<T: Reflect>(&mut self) -> &mut Self {
        self.insert(T::shape())
    }

    /// Registers (or replaces) a shape.
    pub fn insert(&mut self, shape: TypeShape) -> &mut Self {
        self.shapes.insert(shape.name.clone(), shape);
        self
    }

    /// Registers an enum type carried by `repr`.
    pub fn enum_type(&mut self, name: impl Into<String>, repr: IntKind) -> &mut Self {
        self.insert(TypeShape::enumeration(name, repr))
    }

    /// Looks up a registered shape.
    pub fn shape(&self, name: &str) -> Option<&TypeShape> {
        self.shapes.get(name)
    }

    /// Kind of a type name: scalars resolve without registration.
    pub fn kind_of(&self, name: &str) -> Option<TypeKind> {
        ScalarKind::from_name(name)
            .map(TypeKind::Scalar)
            .or_else(|| self.shape(name).map(|s| s.kind))
    }

    /// Default value for a field declared as `declared_type`.
    ///
    /// Scalars default to zero, catalogued enums to their zero member, everything else
    /// (references, strings, byte arrays, unknown names) to `Null`.
    pub fn default_for(&self, declared_type: &str) -> Value {
        match self.kind_of(declared_type) {
            Some(TypeKind::Scalar(kind)) => kind.default_value(),
            Some(TypeKind::Enum(repr)) => Value::Enum(EnumValue::from_raw(declared_type, repr, 0)),
            _ => Value::Null,
        }
    }

    /// Number of registered shapes.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}
