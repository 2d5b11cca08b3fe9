//! The Travel Trace: object identity to instance id, in first-visit order.

use std::collections::HashMap;

use crate::graph::ObjectId;

/// Outcome of visiting an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// First visit: the body must be written under this instance id.
    New(u32),
    /// Already written (or being written, for cycles): emit a back-reference only.
    Seen(u32),
}

impl Visit {
    /// The 1-based instance id either way.
    pub const fn instance_id(self) -> u32 {
        match self {
            Self::New(id) | Self::Seen(id) => id,
        }
    }
}

/// Identity table for one serialization session.
///
/// Ids are assigned `count + 1` on first visit and never change afterwards, so a re-visited
/// object always resolves to the id it got the first time.
#[derive(Debug, Default)]
pub struct TravelTrace {
    ids: HashMap<ObjectId, u32>,
    order: Vec<ObjectId>,
}

impl TravelTrace {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a visit to `object`.
    pub fn enter(&mut self, object: ObjectId) -> Visit {
        if let Some(id) = self.ids.get(&object) {
            return Visit::Seen(*id);
        }
        self.order.push(object);
        let id = self.order.len() as u32;
        self.ids.insert(object, id);
        Visit::New(id)
    }

    /// Instance id of an already visited object.
    pub fn instance_id(&self, object: ObjectId) -> Option<u32> {
        self.ids.get(&object).copied()
    }

    /// Number of distinct objects visited.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true before the first visit.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Visited objects in first-visit order (index `i` holds instance id `i + 1`).
    pub fn objects(&self) -> &[ObjectId] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ObjectGraph;

    #[test]
    fn revisits_resolve_to_first_id() {
        let mut g = ObjectGraph::new();
        let a = g.add_instance("demo.A").unwrap();
        let b = g.add_instance("demo.B").unwrap();

        let mut trace = TravelTrace::new();
        assert_eq!(trace.enter(b), Visit::New(1));
        assert_eq!(trace.enter(a), Visit::New(2));
        assert_eq!(trace.enter(b), Visit::Seen(1));
        assert_eq!(trace.instance_id(a), Some(2));
        assert_eq!(trace.objects(), &[b, a]);
        assert_eq!(trace.len(), 2);
    }
}
