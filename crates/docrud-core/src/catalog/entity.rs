//! Entity descriptors.

use super::field::FieldDef;
use super::relation::RelationDef;
use super::types::{FieldType, ScalarType};
use crate::error::Error;
use docrud_proto::{Document, Value, ID_FIELD};

/// Schema of one entity type: its fields and its relations.
///
/// Declaring a [`FieldType::Reference`] or [`FieldType::ReferenceArray`]
/// field also declares a relation of the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    /// Entity type name; also the collection name in the store.
    pub name: String,
    /// Field definitions.
    pub fields: Vec<FieldDef>,
    /// Relation definitions, in declaration order.
    pub relations: Vec<RelationDef>,
}

/// Result of resolving a dot-path within a single descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLookup {
    /// The path ends at a field of this scalar type.
    Scalar(ScalarType),
    /// The path crosses into another entity; continue with `rest` there.
    Relation {
        /// Entity type the relation points to.
        target: String,
        /// Remaining path below the relation.
        rest: String,
    },
    /// No declared type at this path.
    Unknown,
}

impl EntityDescriptor {
    /// Create a new entity descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        let relation = match &field.field_type {
            FieldType::Reference { target } => Some(RelationDef::reference(&field.name, target)),
            FieldType::ReferenceArray { target } => {
                Some(RelationDef::reference_array(&field.name, target))
            }
            _ => None,
        };
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        if let Some(relation) = relation {
            self = self.with_relation(relation);
        }
        self
    }

    /// Add multiple fields.
    pub fn with_fields(self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        fields.into_iter().fold(self, Self::with_field)
    }

    /// Add a relation, replacing any relation with the same name.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        match self.relations.iter_mut().find(|r| r.name == relation.name) {
            Some(existing) => *existing = relation,
            None => self.relations.push(relation),
        }
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get a relation by name.
    pub fn get_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Names of all declared relations, in declaration order.
    pub fn relation_names(&self) -> Vec<String> {
        self.relations.iter().map(|r| r.name.clone()).collect()
    }

    /// Resolve a dot-path against this descriptor only.
    ///
    /// A final `_id` segment is always an identifier. Embedded fields are
    /// descended into; a reference or virtual relation in the middle of the
    /// path hands the remainder over to the target entity.
    pub fn lookup(&self, path: &str) -> FieldLookup {
        if path.is_empty() {
            return FieldLookup::Unknown;
        }
        if path.rsplit('.').next() == Some(ID_FIELD) {
            return FieldLookup::Scalar(ScalarType::ObjectId);
        }

        let mut fields = self.fields.as_slice();
        let mut remaining = path;
        let mut at_root = true;
        loop {
            let (segment, rest) = match remaining.split_once('.') {
                Some((segment, rest)) => (segment, Some(rest)),
                None => (remaining, None),
            };

            let Some(field) = fields.iter().find(|f| f.name == segment) else {
                // Virtual relations have no stored field.
                if at_root {
                    if let (Some(relation), Some(rest)) = (self.get_relation(segment), rest) {
                        return FieldLookup::Relation {
                            target: relation.target.clone(),
                            rest: rest.to_string(),
                        };
                    }
                }
                return FieldLookup::Unknown;
            };

            match (&field.field_type, rest) {
                (FieldType::Scalar(s), None) | (FieldType::Array(s), None) => {
                    return FieldLookup::Scalar(*s)
                }
                (FieldType::Reference { .. }, None) | (FieldType::ReferenceArray { .. }, None) => {
                    return FieldLookup::Scalar(ScalarType::ObjectId)
                }
                (FieldType::Reference { target }, Some(rest))
                | (FieldType::ReferenceArray { target }, Some(rest)) => {
                    return FieldLookup::Relation {
                        target: target.clone(),
                        rest: rest.to_string(),
                    }
                }
                (FieldType::Embedded(inner), Some(rest)) => {
                    fields = inner.as_slice();
                    remaining = rest;
                    at_root = false;
                }
                _ => return FieldLookup::Unknown,
            }
        }
    }

    /// Fill in declared defaults for absent fields.
    pub fn apply_defaults(&self, doc: &mut Document) {
        apply_defaults(&self.fields, doc);
    }

    /// Check that every required field is present and non-null.
    pub fn validate(&self, doc: &Document) -> Result<(), Error> {
        validate_fields(&self.name, "", &self.fields, doc)
    }
}

fn apply_defaults(fields: &[FieldDef], doc: &mut Document) {
    for field in fields {
        if let Some(default) = &field.default {
            if !doc.contains_key(&field.name) {
                doc.insert(field.name.clone(), default.clone());
            }
        }
        if let FieldType::Embedded(inner) = &field.field_type {
            if let Some(nested) = doc.get_mut(&field.name).and_then(Value::as_document_mut) {
                apply_defaults(inner, nested);
            }
        }
    }
}

fn validate_fields(
    entity: &str,
    prefix: &str,
    fields: &[FieldDef],
    doc: &Document,
) -> Result<(), Error> {
    for field in fields {
        let value = doc.get(&field.name).filter(|v| !v.is_null());
        if field.required && value.is_none() {
            return Err(Error::InvalidData(format!(
                "{}: field '{}{}' is required",
                entity, prefix, field.name
            )));
        }
        if let (FieldType::Embedded(inner), Some(Value::Document(nested))) =
            (&field.field_type, value)
        {
            let prefix = format!("{}{}.", prefix, field.name);
            validate_fields(entity, &prefix, inner, nested)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Cardinality;

    fn order() -> EntityDescriptor {
        EntityDescriptor::new("Order")
            .with_field(FieldDef::required(
                "number",
                FieldType::scalar(ScalarType::Number),
            ))
            .with_field(FieldDef::new("customer", FieldType::reference("Customer")))
            .with_field(FieldDef::new("items", FieldType::reference_array("Item")))
            .with_field(FieldDef::new(
                "shipping",
                FieldType::embedded(vec![
                    FieldDef::new("city", FieldType::scalar(ScalarType::String)),
                    FieldDef::new("sent", FieldType::scalar(ScalarType::Date)),
                    FieldDef::new("carrier", FieldType::reference("Carrier")),
                ]),
            ))
            .with_field(
                FieldDef::new("status", FieldType::scalar(ScalarType::String))
                    .with_default("open"),
            )
            .with_relation(RelationDef::virtual_many("notes", "Note", "order"))
    }

    #[test]
    fn test_reference_fields_declare_relations() {
        let entity = order();
        assert_eq!(
            entity.relation_names(),
            vec!["customer".to_string(), "items".to_string(), "notes".to_string()]
        );
        assert_eq!(
            entity.get_relation("items").map(|r| r.cardinality),
            Some(Cardinality::Many)
        );
    }

    #[test]
    fn test_lookup() {
        let entity = order();
        assert_eq!(entity.lookup("number"), FieldLookup::Scalar(ScalarType::Number));
        assert_eq!(entity.lookup("_id"), FieldLookup::Scalar(ScalarType::ObjectId));
        assert_eq!(
            entity.lookup("customer"),
            FieldLookup::Scalar(ScalarType::ObjectId)
        );
        assert_eq!(
            entity.lookup("shipping.sent"),
            FieldLookup::Scalar(ScalarType::Date)
        );
        assert_eq!(
            entity.lookup("customer.age"),
            FieldLookup::Relation {
                target: "Customer".into(),
                rest: "age".into()
            }
        );
        assert_eq!(
            entity.lookup("shipping.carrier.name"),
            FieldLookup::Relation {
                target: "Carrier".into(),
                rest: "name".into()
            }
        );
        assert_eq!(
            entity.lookup("notes.text"),
            FieldLookup::Relation {
                target: "Note".into(),
                rest: "text".into()
            }
        );
        assert_eq!(entity.lookup("notes._id"), FieldLookup::Scalar(ScalarType::ObjectId));
        assert_eq!(entity.lookup("shipping"), FieldLookup::Unknown);
        assert_eq!(entity.lookup("missing"), FieldLookup::Unknown);
        assert_eq!(entity.lookup("number.digits"), FieldLookup::Unknown);
    }

    #[test]
    fn test_defaults_and_validation() {
        let entity = order();

        let mut doc = Document::new().with("number", 1);
        entity.apply_defaults(&mut doc);
        assert_eq!(doc.get("status"), Some(&Value::from("open")));
        assert!(entity.validate(&doc).is_ok());

        let doc = Document::new().with("number", Value::Null);
        assert!(matches!(entity.validate(&doc), Err(Error::InvalidData(_))));
    }
}
