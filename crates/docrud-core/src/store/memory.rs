//! In-memory document store.

use super::{ensure_id, DocumentStore, FindParams};
use crate::error::Error;
use crate::query::filter::FilterEvaluator;
use async_trait::async_trait;
use dashmap::DashMap;
use docrud_proto::{Conditions, Document, ObjectId, ID_FIELD};
use std::collections::BTreeMap;
use tracing::trace;

/// Concurrent in-memory store.
///
/// Each collection is a map ordered by id, so unsorted reads return
/// documents in insertion-time order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, BTreeMap<ObjectId, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }

    /// Names of collections that hold at least one document.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    fn matching(&self, collection: &str, conditions: &Conditions) -> Result<Vec<Document>, Error> {
        let Some(docs) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut matched = Vec::new();
        for doc in docs.values() {
            if FilterEvaluator::matches(conditions, doc)? {
                matched.push(doc.clone());
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        conditions: &Conditions,
        params: &FindParams,
    ) -> Result<Vec<Document>, Error> {
        let matched = self.matching(collection, conditions)?;
        trace!(collection, matched = matched.len(), "memory find");
        Ok(params.apply(matched))
    }

    async fn count_documents(
        &self,
        collection: &str,
        conditions: &Conditions,
    ) -> Result<u64, Error> {
        Ok(self.matching(collection, conditions)?.len() as u64)
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> Result<Document, Error> {
        let id = ensure_id(&mut doc)?;
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn find_by_id(&self, collection: &str, id: ObjectId) -> Result<Option<Document>, Error> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(&id).cloned()))
    }

    async fn replace_by_id(
        &self,
        collection: &str,
        id: ObjectId,
        mut doc: Document,
    ) -> Result<Option<Document>, Error> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(slot) = docs.get_mut(&id) else {
            return Ok(None);
        };
        doc.insert(ID_FIELD, id);
        *slot = doc.clone();
        Ok(Some(doc))
    }

    async fn remove_by_id(&self, collection: &str, id: ObjectId) -> Result<Option<Document>, Error> {
        Ok(self
            .collections
            .get_mut(collection)
            .and_then(|mut docs| docs.remove(&id)))
    }
}
