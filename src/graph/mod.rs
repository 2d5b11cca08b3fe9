//! The object arena the codec walks and rebuilds.
//!
//! Objects live in an [`ObjectGraph`] and point at each other through [`ObjectId`] handles
//! carried by [`Value::Ref`](crate::value::Value::Ref). Cycles and shared sub-structures are
//! ordinary handle reuse, so identity never depends on pointer equality.

/// Defines the `ObjectGraph` arena and its objects.
pub mod arena;
/// Defines the `ObjectId` handle.
pub mod id;

pub use arena::{Collection, Instance, Object, ObjectGraph, equivalent};
pub use id::ObjectId;
