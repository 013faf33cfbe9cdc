//! Field definitions for entities.

use super::types::FieldType;
use docrud_proto::Value;

/// A field definition within an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Whether the field must be present and non-null on save.
    pub required: bool,
    /// Value applied on create when the field is absent.
    pub default: Option<Value>,
}

impl FieldDef {
    /// Create a new optional field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
        }
    }

    /// Create a required field.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: true,
            ..Self::new(name, field_type)
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Check if this field has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::ScalarType;

    #[test]
    fn test_field_def_builder() {
        let field = FieldDef::new("active", FieldType::scalar(ScalarType::Boolean))
            .with_default(true);

        assert_eq!(field.name, "active");
        assert!(!field.required);
        assert!(field.has_default());
        assert_eq!(field.default, Some(Value::Bool(true)));
    }

    #[test]
    fn test_required_field() {
        let field = FieldDef::required("name", FieldType::scalar(ScalarType::String));
        assert!(field.required);
        assert!(!field.has_default());
    }
}
