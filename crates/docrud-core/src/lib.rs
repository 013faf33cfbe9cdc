//! docrud core - entity registry, condition casting, populate planning and
//! CRUD services over a document store.
//!
//! A host builds one [`QueryExecutor`] over a [`DocumentStore`] and an
//! [`EntityRegistry`], then one [`CrudService`] per entity type. Services
//! register their schema when built, so any entity can populate relations
//! into any other by name.

pub mod catalog;
pub mod config;
pub mod error;
pub mod query;
pub mod security;
pub mod service;
pub mod store;

pub use catalog::{
    Cardinality, EntityDescriptor, EntityHandle, EntityRegistry, FieldDef, FieldLookup,
    FieldType, RelationDef, ScalarType,
};
pub use config::{QueryConfig, DEFAULT_MAX_POPULATE_DEPTH};
pub use error::Error;
pub use query::{ConditionCaster, FetchNode, FilterEvaluator, PopulatePlanner, Populator, QueryExecutor};
pub use security::{
    AllowAll, Authorizer, FnAuthorizer, RequestContext, ResponseHeaders, ScopeAuthorizer,
    ScopeRule, SharedAuthorizer, EXPOSE_HEADERS, TOTAL_COUNT_HEADER,
};
pub use service::{CrudService, CrudServiceBuilder, EntityHooks, NoHooks, SharedHooks};
pub use store::{DocumentStore, FindParams, MemoryStore, SharedStore, SledStore, StoreConfig};

/// Re-export of the data model.
pub use docrud_proto as proto;
