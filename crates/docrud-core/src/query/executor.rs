//! Query executor.
//!
//! The executor combines caller conditions with the root entity's
//! authorization conditions, casts the result, reads from the store and
//! resolves the populate tree for every returned document.

use std::sync::Arc;

use crate::catalog::{EntityHandle, EntityRegistry};
use crate::config::QueryConfig;
use crate::error::Error;
use crate::security::{RequestContext, EXPOSE_HEADERS};
use crate::store::{FindParams, SharedStore};

use super::caster::ConditionCaster;
use super::planner::{FetchNode, PopulatePlanner};
use super::populate::Populator;

use docrud_proto::{Conditions, Document, FindOptions, FindRequest, PopulateSpec, ID_FIELD};
use tracing::{debug, instrument};

/// Runs find, find-one, count and populate requests against a store.
pub struct QueryExecutor {
    store: SharedStore,
    registry: Arc<EntityRegistry>,
    config: QueryConfig,
    populator: Populator,
}

impl QueryExecutor {
    pub fn new(store: SharedStore, registry: Arc<EntityRegistry>, config: QueryConfig) -> Self {
        let populator = Populator::new(store.clone());
        Self {
            store,
            registry,
            config,
            populator,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Find documents, populating relations per the request.
    ///
    /// When the context carries a response side-channel, the number of
    /// matches ignoring skip and limit is reported in the total-count
    /// header.
    #[instrument(skip(self, request, ctx))]
    pub async fn find(
        &self,
        entity: &str,
        request: &FindRequest,
        ctx: Option<&RequestContext>,
    ) -> Result<Vec<Document>, Error> {
        let (docs, conditions) = self.read(entity, request, ctx).await?;

        if let Some(headers) = ctx.and_then(RequestContext::headers) {
            let total = self.store.count_documents(entity, &conditions).await?;
            let name = self.config.total_count_header.as_str();
            headers.set(name, total.to_string());
            headers.append_list(EXPOSE_HEADERS, name);
        }

        Ok(docs)
    }

    /// Find the first matching document. The request's limit is replaced by
    /// one and no total count is reported.
    #[instrument(skip(self, request, ctx))]
    pub async fn find_one(
        &self,
        entity: &str,
        request: &FindRequest,
        ctx: Option<&RequestContext>,
    ) -> Result<Option<Document>, Error> {
        let mut request = request.clone();
        request.options.limit = Some(1);
        let (docs, _) = self.read(entity, &request, ctx).await?;
        Ok(docs.into_iter().next())
    }

    async fn read(
        &self,
        entity: &str,
        request: &FindRequest,
        ctx: Option<&RequestContext>,
    ) -> Result<(Vec<Document>, Conditions), Error> {
        let conditions = self
            .scoped_conditions(entity, request.filters.clone(), ctx)
            .await?;
        let nodes = self
            .plan(entity, &request.populate, &request.options.select, ctx)
            .await?;
        let params = self.find_params(&request.options, &nodes);

        let mut docs = self.store.find(entity, &conditions, &params).await?;
        debug!(entity, found = docs.len(), skip = params.skip, limit = ?params.limit, "find");
        self.populator.populate(&mut docs, &nodes).await?;
        Ok((docs, conditions))
    }

    /// Count the documents the caller may see that match `conditions`.
    #[instrument(skip(self, conditions, ctx))]
    pub async fn count(
        &self,
        entity: &str,
        conditions: Conditions,
        ctx: Option<&RequestContext>,
    ) -> Result<u64, Error> {
        let conditions = self.scoped_conditions(entity, conditions, ctx).await?;
        self.store.count_documents(entity, &conditions).await
    }

    /// Populate already loaded documents of `entity`.
    pub async fn populate(
        &self,
        entity: &str,
        docs: &mut [Document],
        populate: &PopulateSpec,
        selectors: &[String],
        ctx: Option<&RequestContext>,
    ) -> Result<(), Error> {
        let nodes = self.plan(entity, populate, selectors, ctx).await?;
        self.populator.populate(docs, &nodes).await
    }

    /// Populate already loaded documents along a tree built by [`plan`].
    ///
    /// [`plan`]: Self::plan
    pub async fn populate_planned(
        &self,
        docs: &mut [Document],
        nodes: &[FetchNode],
    ) -> Result<(), Error> {
        self.populator.populate(docs, nodes).await
    }

    /// Caller conditions ANDed with the root authorization conditions, cast
    /// to the entity's declared types.
    ///
    /// Without a context no authorizer runs, which is the same as an empty
    /// authorization list.
    pub async fn scoped_conditions(
        &self,
        entity: &str,
        conditions: Conditions,
        ctx: Option<&RequestContext>,
    ) -> Result<Conditions, Error> {
        let handle = self.handle(entity)?;
        let authorization = match ctx {
            Some(ctx) => handle.authorizer().authorize(ctx).await?,
            None => Vec::new(),
        };

        let mut scoped = conditions;
        scoped.merge(Conditions::and_always(authorization));
        Ok(ConditionCaster::new(&self.registry, handle.name()).cast(scoped))
    }

    /// Build the populate tree for a request.
    pub async fn plan(
        &self,
        entity: &str,
        populate: &PopulateSpec,
        selectors: &[String],
        ctx: Option<&RequestContext>,
    ) -> Result<Vec<FetchNode>, Error> {
        let planner = PopulatePlanner::new(&self.registry, &self.config);
        let paths = planner.paths_for(entity, populate)?;
        planner.plan(entity, &paths, selectors, ctx).await
    }

    /// Store parameters for a find.
    ///
    /// A root projection is widened with the local fields of the populated
    /// relations so they can still be resolved.
    pub fn find_params(&self, options: &FindOptions, nodes: &[FetchNode]) -> FindParams {
        let mut projection = options.root_projection();
        if !projection.is_empty() {
            for node in nodes {
                let local = node.relation.local_field.as_str();
                let root = local.split('.').next().unwrap_or(local);
                if root != ID_FIELD && !projection.iter().any(|f| f == root) {
                    projection.push(root.to_string());
                }
            }
        }

        FindParams {
            skip: options.skip,
            limit: options.limit.or(self.config.default_limit),
            sort: options.order(),
            projection,
        }
    }

    fn handle(&self, entity: &str) -> Result<Arc<EntityHandle>, Error> {
        self.registry
            .resolve(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }
}
