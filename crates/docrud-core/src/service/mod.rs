//! CRUD services.
//!
//! A [`CrudService`] is the per-entity facade over the query executor. It
//! registers its descriptor and authorizer when built, validates and casts
//! documents on the way in, runs the lifecycle hooks and returns documents
//! with their relations populated.

mod hooks;
mod merge;

pub use hooks::{EntityHooks, NoHooks, SharedHooks};
pub use merge::merge_patch;

use std::sync::Arc;

use crate::catalog::{EntityDescriptor, EntityHandle, ScalarType};
use crate::error::Error;
use crate::query::{ConditionCaster, FetchNode, QueryExecutor};
use crate::security::{AllowAll, RequestContext, SharedAuthorizer};

use docrud_proto::{
    Conditions, Document, FindRequest, ObjectId, PopulateSpec, Value, ID_FIELD, VERSION_FIELD,
};
use futures::future::join_all;
use tracing::{debug, instrument};

/// Builder for [`CrudService`].
pub struct CrudServiceBuilder {
    descriptor: EntityDescriptor,
    authorizer: SharedAuthorizer,
    hooks: SharedHooks,
}

impl CrudServiceBuilder {
    /// Authorization filter applied to every read of this entity.
    pub fn with_authorizer(mut self, authorizer: SharedAuthorizer) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Lifecycle hooks for writes.
    pub fn with_hooks(mut self, hooks: SharedHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Register the entity with the executor's registry and build the
    /// service.
    pub fn build(self, executor: Arc<QueryExecutor>) -> CrudService {
        let handle = executor
            .registry()
            .register(self.descriptor, self.authorizer);
        CrudService {
            handle,
            executor,
            hooks: self.hooks,
        }
    }
}

/// Create, read, update and delete operations for one entity type.
pub struct CrudService {
    handle: Arc<EntityHandle>,
    executor: Arc<QueryExecutor>,
    hooks: SharedHooks,
}

impl CrudService {
    /// Start building a service for `descriptor`.
    pub fn builder(descriptor: EntityDescriptor) -> CrudServiceBuilder {
        CrudServiceBuilder {
            descriptor,
            authorizer: Arc::new(AllowAll),
            hooks: Arc::new(NoHooks),
        }
    }

    /// Entity type name.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Schema descriptor of the entity.
    pub fn descriptor(&self) -> &EntityDescriptor {
        self.handle.descriptor()
    }

    /// Executor the service reads and writes through.
    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    /// Names of the relations populated by default.
    pub fn reference_relations(&self) -> Vec<String> {
        self.descriptor().relation_names()
    }

    /// Declared scalar type at a dot-path, following relations.
    pub fn field_type(&self, path: &str) -> Option<ScalarType> {
        self.executor.registry().field_type(self.name(), path)
    }

    /// Store a new document. Any client supplied `_id` is discarded.
    #[instrument(skip_all, fields(entity = %self.name()))]
    pub async fn create(
        &self,
        mut doc: Document,
        ctx: Option<&RequestContext>,
    ) -> Result<Document, Error> {
        doc.remove(ID_FIELD);
        let doc = self.hooks.on_create_request(doc, ctx).await?;
        let doc = self.prepare(doc, ctx).await?;
        let nodes = self.write_plan(ctx).await?;

        let stored = self.executor.store().insert(self.name(), doc).await?;
        debug!(id = ?stored.object_id(), "created");
        self.populate_planned(stored, &nodes).await
    }

    /// Patch the document when its `_id` names an existing one, create it
    /// otherwise.
    pub async fn create_or_patch(
        &self,
        doc: Document,
        ctx: Option<&RequestContext>,
    ) -> Result<Document, Error> {
        if let Some(id) = doc.object_id() {
            if self.executor.store().find_by_id(self.name(), id).await?.is_some() {
                return self.patch(doc, ctx).await;
            }
        }
        self.create(doc, ctx).await
    }

    /// Fetch one document by id.
    ///
    /// An id that is not a valid identifier yields `None` without touching
    /// the store.
    pub async fn get(
        &self,
        id: &str,
        populate: &PopulateSpec,
        ctx: Option<&RequestContext>,
    ) -> Result<Option<Document>, Error> {
        let Ok(id) = ObjectId::parse_str(id) else {
            return Ok(None);
        };
        let request = FindRequest::new()
            .with_filters(Conditions::eq(ID_FIELD, id))
            .with_populate(populate.clone());
        self.executor.find_one(self.name(), &request, ctx).await
    }

    /// Fetch several documents by id. Invalid ids are ignored.
    pub async fn get_many(
        &self,
        ids: &[String],
        request: FindRequest,
        ctx: Option<&RequestContext>,
    ) -> Result<Vec<Document>, Error> {
        let ids: Vec<Value> = ids
            .iter()
            .filter_map(|id| ObjectId::parse_str(id).ok())
            .map(Value::from)
            .collect();
        self.find(Conditions::op(ID_FIELD, "$in", Value::Array(ids)), request, ctx)
            .await
    }

    /// Find documents matching `conditions` and the request filters.
    pub async fn find(
        &self,
        conditions: Conditions,
        request: FindRequest,
        ctx: Option<&RequestContext>,
    ) -> Result<Vec<Document>, Error> {
        let request = Self::with_conditions(conditions, request);
        self.executor.find(self.name(), &request, ctx).await
    }

    /// Find the first document matching `conditions` and the request
    /// filters.
    pub async fn find_one(
        &self,
        conditions: Conditions,
        request: FindRequest,
        ctx: Option<&RequestContext>,
    ) -> Result<Option<Document>, Error> {
        let request = Self::with_conditions(conditions, request);
        self.executor.find_one(self.name(), &request, ctx).await
    }

    /// Number of visible documents matching `conditions` and `filters`.
    pub async fn count_documents(
        &self,
        conditions: Conditions,
        filters: Conditions,
        ctx: Option<&RequestContext>,
    ) -> Result<u64, Error> {
        let mut conditions = conditions;
        conditions.merge(filters);
        self.executor.count(self.name(), conditions, ctx).await
    }

    /// Merge a partial document over the stored one with the same `_id`.
    ///
    /// Null and absent fields keep their stored values.
    #[instrument(skip_all, fields(entity = %self.name()))]
    pub async fn patch(
        &self,
        doc: Document,
        ctx: Option<&RequestContext>,
    ) -> Result<Document, Error> {
        let (id, mut existing) = self.existing(&doc, ctx).await?;

        let mut incoming = self.hooks.on_update_request(doc, ctx).await?;
        incoming.remove(VERSION_FIELD);
        incoming.remove(ID_FIELD);
        merge_patch(&mut existing, incoming);

        self.replace(id, existing, ctx).await
    }

    /// Replace the stored document with the same `_id` wholesale.
    #[instrument(skip_all, fields(entity = %self.name()))]
    pub async fn put(&self, doc: Document, ctx: Option<&RequestContext>) -> Result<Document, Error> {
        let (id, _) = self.existing(&doc, ctx).await?;

        let mut incoming = self.hooks.on_update_request(doc, ctx).await?;
        incoming.remove(VERSION_FIELD);
        incoming.remove(ID_FIELD);

        self.replace(id, incoming, ctx).await
    }

    /// Delete a document by id, returning it when it existed and was
    /// visible to the caller.
    ///
    /// An id that is not a valid identifier yields `None` without touching
    /// the store.
    #[instrument(skip(self, ctx), fields(entity = %self.name()))]
    pub async fn delete(
        &self,
        id: &str,
        ctx: Option<&RequestContext>,
    ) -> Result<Option<Document>, Error> {
        let Ok(object_id) = ObjectId::parse_str(id) else {
            return Ok(None);
        };
        let Some(existing) = self.get(id, &PopulateSpec::Skip, ctx).await? else {
            return Ok(None);
        };
        self.hooks.on_delete_request(&existing, ctx).await?;
        let nodes = self.write_plan(ctx).await?;

        let Some(removed) = self.executor.store().remove_by_id(self.name(), object_id).await? else {
            return Ok(None);
        };
        debug!("deleted");
        self.populate_planned(removed, &nodes).await.map(Some)
    }

    /// Delete every visible document matching `conditions`, returning the
    /// deleted documents.
    pub async fn find_and_delete(
        &self,
        conditions: Conditions,
        ctx: Option<&RequestContext>,
    ) -> Result<Vec<Document>, Error> {
        let request = FindRequest::new().with_populate(PopulateSpec::Skip);
        let found = self.find(conditions, request, ctx).await?;

        let ids: Vec<String> = found
            .iter()
            .filter_map(Document::object_id)
            .map(|id| id.to_hex())
            .collect();
        let deleted = join_all(ids.iter().map(|id| self.delete(id, ctx))).await;

        let mut removed = Vec::with_capacity(deleted.len());
        for result in deleted {
            if let Some(doc) = result? {
                removed.push(doc);
            }
        }
        Ok(removed)
    }

    /// Populate one loaded document.
    pub async fn populate(
        &self,
        doc: Document,
        populate: &PopulateSpec,
        selectors: &[String],
        ctx: Option<&RequestContext>,
    ) -> Result<Document, Error> {
        let mut docs = [doc];
        self.executor
            .populate(self.name(), &mut docs, populate, selectors, ctx)
            .await?;
        let [doc] = docs;
        Ok(doc)
    }

    /// Populate a list of loaded documents, preserving their order.
    pub async fn populate_list(
        &self,
        mut docs: Vec<Document>,
        populate: &PopulateSpec,
        selectors: &[String],
        ctx: Option<&RequestContext>,
    ) -> Result<Vec<Document>, Error> {
        self.executor
            .populate(self.name(), &mut docs, populate, selectors, ctx)
            .await?;
        Ok(docs)
    }

    fn with_conditions(conditions: Conditions, request: FindRequest) -> FindRequest {
        let mut request = request;
        let mut merged = conditions;
        merged.merge(std::mem::take(&mut request.filters));
        request.filters = merged;
        request
    }

    /// Id and stored version of the document an update targets.
    async fn existing(
        &self,
        doc: &Document,
        ctx: Option<&RequestContext>,
    ) -> Result<(ObjectId, Document), Error> {
        let raw = doc
            .get(ID_FIELD)
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_json().to_string(),
            })
            .unwrap_or_default();
        let Some(id) = doc.object_id() else {
            return Err(Error::not_found(self.name(), raw));
        };
        match self.get(&id.to_hex(), &PopulateSpec::Skip, ctx).await? {
            Some(existing) => Ok((id, existing)),
            None => Err(Error::not_found(self.name(), raw)),
        }
    }

    /// Drop populated virtual relations, apply defaults, collapse populated
    /// references to ids, coerce declared types, run the pre-save hook and
    /// validate.
    async fn prepare(&self, mut doc: Document, ctx: Option<&RequestContext>) -> Result<Document, Error> {
        let descriptor = self.descriptor();
        for relation in descriptor.relations.iter().filter(|r| r.is_virtual) {
            doc.remove(&relation.name);
        }
        descriptor.apply_defaults(&mut doc);
        let doc = ConditionCaster::new(self.executor.registry(), self.name()).cast_document(doc);
        let doc = self.hooks.pre_save(doc, ctx).await?;
        descriptor.validate(&doc)?;
        Ok(doc)
    }

    async fn replace(
        &self,
        id: ObjectId,
        doc: Document,
        ctx: Option<&RequestContext>,
    ) -> Result<Document, Error> {
        let doc = self.prepare(doc, ctx).await?;
        let nodes = self.write_plan(ctx).await?;

        let stored = self
            .executor
            .store()
            .replace_by_id(self.name(), id, doc)
            .await?
            .ok_or_else(|| Error::not_found(self.name(), id.to_hex()))?;
        debug!(id = %id, "updated");
        self.populate_planned(stored, &nodes).await
    }

    /// Default populate tree for write results. Built before the store is
    /// touched so a rejecting authorizer leaves the write undone.
    async fn write_plan(&self, ctx: Option<&RequestContext>) -> Result<Vec<FetchNode>, Error> {
        self.executor
            .plan(self.name(), &PopulateSpec::All, &[], ctx)
            .await
    }

    async fn populate_planned(&self, doc: Document, nodes: &[FetchNode]) -> Result<Document, Error> {
        let mut docs = [doc];
        self.executor.populate_planned(&mut docs, nodes).await?;
        let [doc] = docs;
        Ok(doc)
    }
}
