//! Core type definitions for the catalog.

use super::field::FieldDef;

/// Scalar data types a document field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// UTF-8 string.
    String,
    /// Integer or floating point number.
    Number,
    /// UTC timestamp.
    Date,
    /// Boolean value.
    Boolean,
    /// Document identifier.
    ObjectId,
    /// Untyped; values are stored as given.
    Mixed,
}

/// Field types.
///
/// Relations are declared explicitly: a field either holds scalars, nested
/// fields, or references to documents of another entity type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// A scalar value.
    Scalar(ScalarType),
    /// An array of scalar values.
    Array(ScalarType),
    /// A nested document with its own fields.
    Embedded(Vec<FieldDef>),
    /// An identifier referencing a document of `target`.
    Reference {
        /// Name of the referenced entity type.
        target: String,
    },
    /// An array of identifiers referencing documents of `target`.
    ReferenceArray {
        /// Name of the referenced entity type.
        target: String,
    },
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Number)
    }

    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::String => "String",
            ScalarType::Number => "Number",
            ScalarType::Date => "Date",
            ScalarType::Boolean => "Boolean",
            ScalarType::ObjectId => "ObjectId",
            ScalarType::Mixed => "Mixed",
        }
    }
}

impl FieldType {
    /// Create a scalar field type.
    pub fn scalar(scalar: ScalarType) -> Self {
        FieldType::Scalar(scalar)
    }

    /// Create an array of scalars field type.
    pub fn array(scalar: ScalarType) -> Self {
        FieldType::Array(scalar)
    }

    /// Create an embedded document field type.
    pub fn embedded(fields: impl IntoIterator<Item = FieldDef>) -> Self {
        FieldType::Embedded(fields.into_iter().collect())
    }

    /// Create a reference field type.
    pub fn reference(target: impl Into<String>) -> Self {
        FieldType::Reference {
            target: target.into(),
        }
    }

    /// Create a reference array field type.
    pub fn reference_array(target: impl Into<String>) -> Self {
        FieldType::ReferenceArray {
            target: target.into(),
        }
    }

    /// Check if this type is an array.
    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Array(_) | FieldType::ReferenceArray { .. })
    }

    /// Name of the referenced entity type, if this is a reference.
    pub fn reference_target(&self) -> Option<&str> {
        match self {
            FieldType::Reference { target } | FieldType::ReferenceArray { target } => Some(target),
            _ => None,
        }
    }

    /// Scalar type of the stored values.
    ///
    /// References store identifiers; embedded documents have no single type.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            FieldType::Scalar(s) | FieldType::Array(s) => Some(*s),
            FieldType::Reference { .. } | FieldType::ReferenceArray { .. } => {
                Some(ScalarType::ObjectId)
            }
            FieldType::Embedded(_) => None,
        }
    }
}
