//! Relation definitions between entities.

use docrud_proto::ID_FIELD;

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Resolves to a single document or null.
    One,
    /// Resolves to a list of documents.
    Many,
}

/// A relation from one entity to another.
///
/// A relation matches target documents whose `foreign_field` equals the
/// value (or one of the values) held in the source's `local_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    /// Relation name; also the field the resolved documents are attached to.
    pub name: String,
    /// Target entity name.
    pub target: String,
    /// Field on the source document holding the join value(s).
    pub local_field: String,
    /// Field on the target document matched against `local_field`.
    pub foreign_field: String,
    /// Relation cardinality.
    pub cardinality: Cardinality,
    /// Whether the relation is computed from the target side rather than
    /// stored on the source document.
    pub is_virtual: bool,
}

impl RelationDef {
    /// A stored reference: `local_field` holds the target's `_id`.
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            local_field: name.clone(),
            name,
            target: target.into(),
            foreign_field: ID_FIELD.to_string(),
            cardinality: Cardinality::One,
            is_virtual: false,
        }
    }

    /// A stored array of references to target `_id`s.
    pub fn reference_array(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            cardinality: Cardinality::Many,
            ..Self::reference(name, target)
        }
    }

    /// A reverse relation listing every target whose `foreign_field` points
    /// back at this document.
    pub fn virtual_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            local_field: ID_FIELD.to_string(),
            foreign_field: foreign_field.into(),
            cardinality: Cardinality::Many,
            is_virtual: true,
        }
    }

    /// A reverse relation resolving to the first matching target.
    pub fn virtual_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_field: impl Into<String>,
    ) -> Self {
        Self {
            cardinality: Cardinality::One,
            ..Self::virtual_many(name, target, foreign_field)
        }
    }

    /// Override the local join field.
    pub fn with_local_field(mut self, field: impl Into<String>) -> Self {
        self.local_field = field.into();
        self
    }

    /// Check if this relation resolves to a list.
    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}
