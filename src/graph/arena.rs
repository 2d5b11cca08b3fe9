use std::collections::{BTreeMap, HashMap, VecDeque};

use super::id::ObjectId;
use crate::error::{CodecError, Result};
use crate::reflect::{TypeCatalog, TypeKind};
use crate::value::Value;

/// A composite object with named fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Instance {
    /// Qualified type name, resolved against the [`TypeCatalog`].
    pub type_name: String,
    /// Field values by name. A missing field reads as `Null`.
    pub fields: BTreeMap<String, Value>,
}

impl Instance {
    /// Returns the value of a field, if set.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// An ordered collection of items (which may themselves be null, scalars or references).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collection {
    /// Qualified type name of the collection itself.
    pub type_name: String,
    /// Items in enumeration order.
    pub items: Vec<Value>,
}

/// A node of the object graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Plain composite instance.
    Instance(Instance),
    /// Ordered or unordered collection.
    Collection(Collection),
}

impl Object {
    /// Qualified type name of the object.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Instance(i) => &i.type_name,
            Self::Collection(c) => &c.type_name,
        }
    }
}

/// Arena owning every object of a graph.
///
/// Handles are dense and allocation-ordered; objects are never removed, so a handle stays valid
/// for the lifetime of the arena.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectGraph {
    objects: Vec<Object>,
}

impl ObjectGraph {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Adds an object and returns its handle.
    ///
    /// # Errors
    /// [`CodecError::Usage`] once the arena holds `u32::MAX + 1` objects; handles are `u32`.
    pub fn add(&mut self, object: Object) -> Result<ObjectId> {
        let id = handle_for(self.objects.len())?;
        self.objects.push(object);
        Ok(id)
    }

    /// Adds an instance with no fields set.
    pub fn add_instance(&mut self, type_name: impl Into<String>) -> Result<ObjectId> {
        self.add(Object::Instance(Instance {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }))
    }

    /// Adds a collection holding `items`.
    pub fn add_collection(
        &mut self,
        type_name: impl Into<String>,
        items: Vec<Value>,
    ) -> Result<ObjectId> {
        self.add(Object::Collection(Collection {
            type_name: type_name.into(),
            items,
        }))
    }

    /// Adds an instance of a catalogued type with every field at its declared default.
    ///
    /// # Errors
    /// [`CodecError::Usage`] if the type is unknown or is not an instance type.
    pub fn instantiate(&mut self, catalog: &TypeCatalog, type_name: &str) -> Result<ObjectId> {
        let shape = catalog
            .shape(type_name)
            .ok_or_else(|| CodecError::Usage(format!("type `{type_name}` is not in the catalog")))?;
        if shape.kind != TypeKind::Instance {
            return Err(CodecError::Usage(format!(
                "type `{type_name}` is not an instance type"
            )));
        }
        let fields = shape
            .fields
            .iter()
            .map(|f| (f.name.clone(), catalog.default_for(&f.declared_type)))
            .collect();
        self.add(Object::Instance(Instance {
            type_name: type_name.to_owned(),
            fields,
        }))
    }

    /// Returns the object behind a handle.
    pub fn get(&self, id: ObjectId) -> Result<&Object> {
        self.objects
            .get(id.index())
            .ok_or_else(|| CodecError::Usage(format!("{id} does not belong to this graph")))
    }

    /// Returns the object behind a handle, mutably.
    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.objects
            .get_mut(id.index())
            .ok_or_else(|| CodecError::Usage(format!("{id} does not belong to this graph")))
    }

    /// Sets a field on an instance.
    pub fn set_field(&mut self, id: ObjectId, name: &str, value: impl Into<Value>) -> Result<()> {
        match self.get_mut(id)? {
            Object::Instance(inst) => {
                inst.fields.insert(name.to_owned(), value.into());
                Ok(())
            }
            Object::Collection(_) => Err(CodecError::Usage(format!(
                "{id} is a collection and has no field `{name}`"
            ))),
        }
    }

    /// Reads a field of an instance.
    pub fn field(&self, id: ObjectId, name: &str) -> Result<Option<&Value>> {
        match self.get(id)? {
            Object::Instance(inst) => Ok(inst.field(name)),
            Object::Collection(_) => Err(CodecError::Usage(format!(
                "{id} is a collection and has no field `{name}`"
            ))),
        }
    }

    /// Appends an item to a collection.
    pub fn push_item(&mut self, id: ObjectId, value: impl Into<Value>) -> Result<()> {
        match self.get_mut(id)? {
            Object::Collection(c) => {
                c.items.push(value.into());
                Ok(())
            }
            Object::Instance(_) => Err(CodecError::Usage(format!("{id} is not a collection"))),
        }
    }

    /// Items of a collection.
    pub fn items(&self, id: ObjectId) -> Result<&[Value]> {
        match self.get(id)? {
            Object::Collection(c) => Ok(&c.items),
            Object::Instance(_) => Err(CodecError::Usage(format!("{id} is not a collection"))),
        }
    }

    /// Number of objects in the arena.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the arena holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates over `(handle, object)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, o)| (ObjectId::new(i as u32), o))
    }
}

/// Handle of the object stored at `index`.
fn handle_for(index: usize) -> Result<ObjectId> {
    u32::try_from(index)
        .map(ObjectId::new)
        .map_err(|_| CodecError::Usage(format!("arena is full: handle {index} exceeds u32")))
}

/// Structural equality of the sub-graphs reachable from two roots.
///
/// Handles are matched as a bijection: the same object on one side must always correspond to
/// the same object on the other, so sharing and cycles have to agree, not just contents.
pub fn equivalent(a: &ObjectGraph, a_root: ObjectId, b: &ObjectGraph, b_root: ObjectId) -> bool {
    let mut forward: HashMap<ObjectId, ObjectId> = HashMap::new();
    let mut backward: HashMap<ObjectId, ObjectId> = HashMap::new();
    let mut queue = VecDeque::new();

    forward.insert(a_root, b_root);
    backward.insert(b_root, a_root);
    queue.push_back((a_root, b_root));

    let mut pair_refs = |x: ObjectId, y: ObjectId, queue: &mut VecDeque<(ObjectId, ObjectId)>| {
        match (forward.get(&x), backward.get(&y)) {
            (Some(mapped), _) => *mapped == y,
            (None, Some(_)) => false,
            (None, None) => {
                forward.insert(x, y);
                backward.insert(y, x);
                queue.push_back((x, y));
                true
            }
        }
    };

    while let Some((x, y)) = queue.pop_front() {
        let (Ok(ox), Ok(oy)) = (a.get(x), b.get(y)) else {
            return false;
        };
        let pairs: Vec<(&Value, &Value)> = match (ox, oy) {
            (Object::Instance(ix), Object::Instance(iy)) => {
                if ix.type_name != iy.type_name || ix.fields.len() != iy.fields.len() {
                    return false;
                }
                let mut pairs = Vec::with_capacity(ix.fields.len());
                for (name, vx) in &ix.fields {
                    let Some(vy) = iy.fields.get(name) else {
                        return false;
                    };
                    pairs.push((vx, vy));
                }
                pairs
            }
            (Object::Collection(cx), Object::Collection(cy)) => {
                if cx.type_name != cy.type_name || cx.items.len() != cy.items.len() {
                    return false;
                }
                cx.items.iter().zip(&cy.items).collect()
            }
            _ => return false,
        };

        for (vx, vy) in pairs {
            let same = match (vx, vy) {
                (Value::Ref(rx), Value::Ref(ry)) => pair_refs(*rx, *ry, &mut queue),
                (Value::Ref(_), _) | (_, Value::Ref(_)) => false,
                _ => vx == vy,
            };
            if !same {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(len: usize) -> (ObjectGraph, ObjectId) {
        let mut g = ObjectGraph::new();
        let ids: Vec<ObjectId> = (0..len).map(|_| g.add_instance("demo.Node").unwrap()).collect();
        for (i, id) in ids.iter().enumerate() {
            g.set_field(*id, "next", ids[(i + 1) % len]).unwrap();
            g.set_field(*id, "value", i as i32).unwrap();
        }
        (g, ids[0])
    }

    #[test]
    fn field_access_checks_object_kind() {
        let mut g = ObjectGraph::new();
        let list = g.add_collection("demo.List", vec![]).unwrap();
        assert!(g.set_field(list, "x", 1).is_err());
        g.push_item(list, 7u8).unwrap();
        assert_eq!(g.items(list).unwrap(), &[Value::U8(7)]);
    }

    #[test]
    fn equivalent_matches_cycles_by_shape() {
        let (a, ra) = ring(3);
        let (b, rb) = ring(3);
        assert!(equivalent(&a, ra, &b, rb));
        let (c, rc) = ring(4);
        assert!(!equivalent(&a, ra, &c, rc));
    }

    #[test]
    fn equivalent_distinguishes_sharing_from_copies() {
        let mut shared = ObjectGraph::new();
        let leaf = shared.add_instance("demo.Leaf").unwrap();
        let root = shared.add_instance("demo.Pair").unwrap();
        shared.set_field(root, "a", leaf).unwrap();
        shared.set_field(root, "b", leaf).unwrap();

        let mut copied = ObjectGraph::new();
        let l1 = copied.add_instance("demo.Leaf").unwrap();
        let l2 = copied.add_instance("demo.Leaf").unwrap();
        let root2 = copied.add_instance("demo.Pair").unwrap();
        copied.set_field(root2, "a", l1).unwrap();
        copied.set_field(root2, "b", l2).unwrap();

        assert!(!equivalent(&shared, root, &copied, root2));
    }

    #[test]
    fn handles_stop_at_the_u32_range() {
        assert_eq!(handle_for(7).unwrap().as_u32(), 7);
        assert_eq!(handle_for(u32::MAX as usize).unwrap().as_u32(), u32::MAX);
        assert!(matches!(
            handle_for(u32::MAX as usize + 1),
            Err(CodecError::Usage(_))
        ));
    }
}
