//! docrud data model.
//!
//! This crate defines the types shared by every docrud layer. It performs no
//! I/O.
//!
//! # Modules
//!
//! - [`value`] - Dynamically typed field values
//! - [`document`] - Ordered documents with dot-path access
//! - [`object_id`] - Twelve-byte document identifiers
//! - [`condition`] - Condition trees and their merge rules
//! - [`options`] - Sorting, pagination, selection and population options
//! - [`error`] - Error types
//!
//! # Conversion
//!
//! Values cross the caller boundary as untyped JSON:
//!
//! ```
//! use docrud_proto::{Conditions, Document, Value};
//!
//! let doc = Document::from_json(serde_json::json!({"name": "Alice", "age": 30})).unwrap();
//! assert_eq!(doc.get("age"), Some(&Value::Int(30)));
//!
//! let cond = Conditions::eq("name", "Alice").with_op("age", "$gte", 18);
//! assert_eq!(cond.to_json(), serde_json::json!({"name": "Alice", "age": {"$gte": 18}}));
//! ```

pub mod condition;
pub mod document;
pub mod error;
pub mod object_id;
pub mod options;
pub mod value;

pub use condition::Conditions;
pub use document::{Document, ID_FIELD, VERSION_FIELD};
pub use error::Error;
pub use object_id::ObjectId;
pub use options::{FindOptions, FindRequest, OrderDirection, OrderSpec, PopulateSpec};
pub use value::Value;
