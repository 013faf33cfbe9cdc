//! Document stores.
//!
//! The [`DocumentStore`] trait is the boundary between docrud and the
//! persistence engine. Collections are named after entity types. Two
//! backends are bundled:
//!
//! - [`MemoryStore`] - concurrent in-process maps, for tests and embedding
//! - [`SledStore`] - one sled tree per collection

mod config;
mod memory;
mod params;
mod sled_store;

pub use config::StoreConfig;
pub use memory::MemoryStore;
pub use params::FindParams;
pub use sled_store::SledStore;

use crate::error::Error;
use async_trait::async_trait;
use docrud_proto::{Conditions, Document, ObjectId, ID_FIELD};
use std::sync::Arc;

/// Persistence boundary used by the query executor and CRUD services.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents of `collection` matching `conditions`, sorted, paginated
    /// and projected per `params`.
    async fn find(
        &self,
        collection: &str,
        conditions: &Conditions,
        params: &FindParams,
    ) -> Result<Vec<Document>, Error>;

    /// Number of documents of `collection` matching `conditions`.
    async fn count_documents(&self, collection: &str, conditions: &Conditions)
        -> Result<u64, Error>;

    /// Insert a document, assigning a fresh `_id` when it has none.
    ///
    /// Fails with [`Error::DuplicateId`] when the id is taken.
    async fn insert(&self, collection: &str, doc: Document) -> Result<Document, Error>;

    /// Fetch a document by id.
    async fn find_by_id(&self, collection: &str, id: ObjectId) -> Result<Option<Document>, Error>;

    /// Replace a document. Returns the stored document, or `None` when no
    /// document has this id.
    async fn replace_by_id(
        &self,
        collection: &str,
        id: ObjectId,
        doc: Document,
    ) -> Result<Option<Document>, Error>;

    /// Remove a document, returning it if it existed.
    async fn remove_by_id(&self, collection: &str, id: ObjectId) -> Result<Option<Document>, Error>;
}

/// Shared store handle.
pub type SharedStore = Arc<dyn DocumentStore>;

/// Ensure `doc` carries an identifier, returning it.
///
/// A string `_id` holding a valid hex id is normalized to an identifier; an
/// absent one is generated. Any other `_id` is invalid.
pub fn ensure_id(doc: &mut Document) -> Result<ObjectId, Error> {
    if !doc.contains_key(ID_FIELD) {
        let id = ObjectId::new();
        doc.insert(ID_FIELD, id);
        return Ok(id);
    }
    let id = doc
        .object_id()
        .ok_or_else(|| Error::InvalidData(format!("document has an invalid {}", ID_FIELD)))?;
    doc.insert(ID_FIELD, id);
    Ok(id)
}
