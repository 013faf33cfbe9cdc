//! Sled-backed document store.

use super::{ensure_id, DocumentStore, FindParams, StoreConfig};
use crate::error::Error;
use crate::query::filter::FilterEvaluator;
use async_trait::async_trait;
use docrud_proto::object_id::OBJECT_ID_SIZE;
use docrud_proto::{Conditions, Document, ObjectId, ID_FIELD};
use sled::{Db, Tree};
use tracing::{debug, trace};

/// Prefix of the tree holding a collection.
const COLLECTION_PREFIX: &str = "collection:";

/// Document store persisting each collection in its own sled tree.
///
/// Keys are the 12 identifier bytes, so a tree scan yields documents in
/// creation order. Values are JSON-encoded documents.
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Open or create a store with the given configuration.
    pub fn open(config: StoreConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        debug!(
            path = %config.path.display(),
            recovered = db.was_recovered(),
            "opened sled store"
        );
        Ok(Self { db })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    /// Names of the collections that have a tree.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .db
            .tree_names()
            .into_iter()
            .filter_map(|name| {
                std::str::from_utf8(&name)
                    .ok()
                    .and_then(|n| n.strip_prefix(COLLECTION_PREFIX))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    fn tree(&self, collection: &str) -> Result<Tree, Error> {
        Ok(self.db.open_tree(format!("{}{}", COLLECTION_PREFIX, collection))?)
    }

    fn encode(doc: &Document) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(doc)?)
    }

    fn decode(bytes: &[u8]) -> Result<Document, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn key(id: ObjectId) -> [u8; OBJECT_ID_SIZE] {
        id.bytes()
    }

    fn scan(&self, collection: &str, conditions: &Conditions) -> Result<Vec<Document>, Error> {
        let tree = self.tree(collection)?;
        let mut matched = Vec::new();
        for result in tree.iter() {
            let (_, value) = result?;
            let doc = Self::decode(&value)?;
            if FilterEvaluator::matches(conditions, &doc)? {
                matched.push(doc);
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl DocumentStore for SledStore {
    async fn find(
        &self,
        collection: &str,
        conditions: &Conditions,
        params: &FindParams,
    ) -> Result<Vec<Document>, Error> {
        let matched = self.scan(collection, conditions)?;
        trace!(collection, matched = matched.len(), "sled find");
        Ok(params.apply(matched))
    }

    async fn count_documents(
        &self,
        collection: &str,
        conditions: &Conditions,
    ) -> Result<u64, Error> {
        Ok(self.scan(collection, conditions)?.len() as u64)
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> Result<Document, Error> {
        let id = ensure_id(&mut doc)?;
        let tree = self.tree(collection)?;
        let bytes = Self::encode(&doc)?;

        // Only succeeds when the key is vacant.
        if tree
            .compare_and_swap(Self::key(id), None as Option<&[u8]>, Some(bytes))?
            .is_err()
        {
            return Err(Error::DuplicateId(id));
        }
        Ok(doc)
    }

    async fn find_by_id(&self, collection: &str, id: ObjectId) -> Result<Option<Document>, Error> {
        let tree = self.tree(collection)?;
        match tree.get(Self::key(id))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn replace_by_id(
        &self,
        collection: &str,
        id: ObjectId,
        mut doc: Document,
    ) -> Result<Option<Document>, Error> {
        let tree = self.tree(collection)?;
        doc.insert(ID_FIELD, id);
        let bytes = Self::encode(&doc)?;

        let mut current = tree.get(Self::key(id))?;
        loop {
            let Some(old) = current else {
                return Ok(None);
            };
            match tree.compare_and_swap(Self::key(id), Some(old), Some(bytes.clone()))? {
                Ok(()) => return Ok(Some(doc)),
                Err(conflict) => current = conflict.current,
            }
        }
    }

    async fn remove_by_id(&self, collection: &str, id: ObjectId) -> Result<Option<Document>, Error> {
        let tree = self.tree(collection)?;
        match tree.remove(Self::key(id))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}
