//! Geometry layers and the buffer-containment query.

pub mod buffer;
pub(crate) mod geos_ops;
pub mod layer;

pub use buffer::{buffer, contained_by, evaluate, intersects, Buffer, Predicate, QueryResult, ReferenceGeometry};
pub use layer::{AttributeValue, Attributes, Feature, GeometryLayer};
