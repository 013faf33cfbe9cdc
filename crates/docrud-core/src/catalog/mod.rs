//! Schema catalog for docrud.
//!
//! The catalog describes entity types (fields, relations) and keeps the
//! registry through which entities find each other.

mod entity;
mod field;
mod registry;
mod relation;
mod types;

pub use entity::{EntityDescriptor, FieldLookup};
pub use field::FieldDef;
pub use registry::{EntityHandle, EntityRegistry};
pub use relation::{Cardinality, RelationDef};
pub use types::{FieldType, ScalarType};
