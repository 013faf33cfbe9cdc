//! Registry of entity types.
//!
//! The registry maps entity type names to their descriptor and authorizer.
//! It is built once at startup and shared as `Arc<EntityRegistry>` with every
//! service, so that any entity can look up any other by name when relation
//! paths cross entity boundaries.

use super::entity::{EntityDescriptor, FieldLookup};
use super::types::ScalarType;
use crate::security::{AllowAll, SharedAuthorizer};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A registered entity type.
pub struct EntityHandle {
    descriptor: EntityDescriptor,
    authorizer: SharedAuthorizer,
}

impl EntityHandle {
    pub fn new(descriptor: EntityDescriptor, authorizer: SharedAuthorizer) -> Self {
        Self {
            descriptor,
            authorizer,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub fn authorizer(&self) -> &SharedAuthorizer {
        &self.authorizer
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandle")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Process-wide mapping from entity type name to its handle.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: RwLock<HashMap<String, Arc<EntityHandle>>>,
}

impl EntityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry behind an `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register an entity type.
    ///
    /// Registering a name twice replaces the earlier entry.
    pub fn register(
        &self,
        descriptor: EntityDescriptor,
        authorizer: SharedAuthorizer,
    ) -> Arc<EntityHandle> {
        let name = descriptor.name.clone();
        let handle = Arc::new(EntityHandle::new(descriptor, authorizer));
        let previous = self.entities.write().insert(name.clone(), handle.clone());
        if previous.is_some() {
            warn!(entity = %name, "entity type registered twice; replacing earlier registration");
        } else {
            debug!(entity = %name, "registered entity type");
        }
        handle
    }

    /// Register an entity type that places no authorization restriction.
    pub fn register_open(&self, descriptor: EntityDescriptor) -> Arc<EntityHandle> {
        self.register(descriptor, Arc::new(AllowAll))
    }

    /// Look up an entity type.
    pub fn resolve(&self, name: &str) -> Option<Arc<EntityHandle>> {
        self.entities.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Declared scalar type at a dot-path of an entity.
    ///
    /// Relation segments switch to the target entity's descriptor, so
    /// `"customer.age"` on an order resolves against the customer schema.
    pub fn field_type(&self, entity: &str, path: &str) -> Option<ScalarType> {
        let mut current = self.resolve(entity)?;
        let mut path = path.to_string();
        loop {
            match current.descriptor().lookup(&path) {
                FieldLookup::Scalar(scalar) => return Some(scalar),
                FieldLookup::Unknown => return None,
                FieldLookup::Relation { target, rest } => {
                    current = self.resolve(&target)?;
                    path = rest;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, FieldType, RelationDef};

    fn registry() -> EntityRegistry {
        let registry = EntityRegistry::new();
        registry.register_open(
            EntityDescriptor::new("Order")
                .with_field(FieldDef::new("total", FieldType::scalar(ScalarType::Number)))
                .with_field(FieldDef::new("customer", FieldType::reference("Customer"))),
        );
        registry.register_open(
            EntityDescriptor::new("Customer")
                .with_field(FieldDef::new("age", FieldType::scalar(ScalarType::Number)))
                .with_field(FieldDef::new("address", FieldType::reference("Address")))
                .with_relation(RelationDef::virtual_many("orders", "Order", "customer")),
        );
        registry.register_open(
            EntityDescriptor::new("Address")
                .with_field(FieldDef::new("city", FieldType::scalar(ScalarType::String)))
                .with_field(FieldDef::new("since", FieldType::scalar(ScalarType::Date))),
        );
        registry
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert!(registry.contains("Order"));
        assert!(!registry.contains("Invoice"));
        assert_eq!(registry.names(), vec!["Address", "Customer", "Order"]);
        assert_eq!(registry.resolve("Customer").unwrap().name(), "Customer");
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = registry();
        registry.register_open(EntityDescriptor::new("Order"));
        assert_eq!(registry.len(), 3);
        assert!(registry
            .resolve("Order")
            .unwrap()
            .descriptor()
            .fields
            .is_empty());
    }

    #[test]
    fn test_field_type_crosses_relations() {
        let registry = registry();
        assert_eq!(registry.field_type("Order", "total"), Some(ScalarType::Number));
        assert_eq!(
            registry.field_type("Order", "customer"),
            Some(ScalarType::ObjectId)
        );
        assert_eq!(
            registry.field_type("Order", "customer.age"),
            Some(ScalarType::Number)
        );
        assert_eq!(
            registry.field_type("Order", "customer.address.since"),
            Some(ScalarType::Date)
        );
        assert_eq!(
            registry.field_type("Customer", "orders.total"),
            Some(ScalarType::Number)
        );
        assert_eq!(registry.field_type("Order", "customer.nope"), None);
        assert_eq!(registry.field_type("Invoice", "total"), None);
    }

    #[test]
    fn test_unregistered_target() {
        let registry = EntityRegistry::new();
        registry.register_open(
            EntityDescriptor::new("Post")
                .with_field(FieldDef::new("author", FieldType::reference("User"))),
        );
        assert_eq!(registry.field_type("Post", "author.name"), None);
    }
}
