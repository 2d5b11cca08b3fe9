use std::fmt;

/// Opaque handle to an object stored in an [`ObjectGraph`](super::ObjectGraph).
///
/// Identity in the codec is handle identity: two `Value::Ref`s holding the same `ObjectId` are
/// the same object, regardless of content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32); // u32 is sufficient for 4 billion objects per graph.

impl ObjectId {
    /// Creates a new ObjectId.
    /// Restricted to the graph module so handles only come from an arena.
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}
