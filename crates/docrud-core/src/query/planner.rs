//! Populate planner.
//!
//! Turns a set of dot-separated relation paths (`"customer.address"`) and
//! field selectors (`"customer.address.city"`) into a tree of fetch nodes.
//! Paths sharing a prefix share nodes, every node carries the selectors that
//! belong exactly to its position, and every node carries the authorization
//! filter of the entity it fetches.

use crate::catalog::{EntityHandle, EntityRegistry, RelationDef};
use crate::config::QueryConfig;
use crate::error::Error;
use crate::query::caster::ConditionCaster;
use crate::security::RequestContext;
use docrud_proto::{Conditions, PopulateSpec};
use futures::future::{join_all, BoxFuture};
use std::sync::Arc;
use tracing::{debug, warn};

/// One node of a populate tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchNode {
    /// Relation being resolved at this node.
    pub relation: RelationDef,
    /// Dot-path from the root entity to this node (e.g. "customer.address").
    pub path: String,
    /// Fields of the target to project. Empty means all fields.
    pub select: Vec<String>,
    /// Authorization filter for the target entity, already cast.
    pub filter: Conditions,
    /// Nested relations of the target.
    pub children: Vec<FetchNode>,
}

impl FetchNode {
    fn new(relation: RelationDef, path: String, select: Vec<String>) -> Self {
        Self {
            relation,
            path,
            select,
            filter: Conditions::and_always(Vec::new()),
            children: Vec::new(),
        }
    }

    /// Relation name (last segment of the path).
    pub fn name(&self) -> &str {
        &self.relation.name
    }

    /// Target entity name.
    pub fn target(&self) -> &str {
        &self.relation.target
    }

    /// Depth of this node (1 for top-level, 2 for nested, etc.)
    pub fn depth(&self) -> usize {
        self.path.matches('.').count() + 1
    }

    /// Get a direct child by relation name.
    pub fn child(&self, name: &str) -> Option<&FetchNode> {
        self.children.iter().find(|c| c.name() == name)
    }

    /// Space-separated selection, if any fields are selected.
    pub fn selection(&self) -> Option<String> {
        (!self.select.is_empty()).then(|| self.select.join(" "))
    }
}

/// Builds populate trees for one registry.
pub struct PopulatePlanner<'a> {
    registry: &'a EntityRegistry,
    config: &'a QueryConfig,
}

impl<'a> PopulatePlanner<'a> {
    pub fn new(registry: &'a EntityRegistry, config: &'a QueryConfig) -> Self {
        Self { registry, config }
    }

    /// Expand a populate request into explicit paths.
    ///
    /// `All` and an empty path list both mean every relation the entity
    /// declares.
    pub fn paths_for(&self, entity: &str, spec: &PopulateSpec) -> Result<Vec<String>, Error> {
        match spec {
            PopulateSpec::Skip => Ok(Vec::new()),
            PopulateSpec::Paths(paths) if !paths.is_empty() => Ok(paths.clone()),
            PopulateSpec::All | PopulateSpec::Paths(_) => Ok(self.handle(entity)?.descriptor().relation_names()),
        }
    }

    /// Build the populate tree and attach authorization filters.
    ///
    /// Without a caller context no authorizer runs and every node keeps the
    /// always-true filter.
    pub async fn plan(
        &self,
        entity: &str,
        paths: &[String],
        selectors: &[String],
        ctx: Option<&RequestContext>,
    ) -> Result<Vec<FetchNode>, Error> {
        let mut nodes = self.build(entity, paths, selectors)?;
        if let Some(ctx) = ctx {
            self.authorize(&mut nodes, ctx).await?;
        }
        debug!(entity, paths = ?paths, nodes = nodes.len(), "planned populate tree");
        Ok(nodes)
    }

    /// Build the populate tree without consulting authorizers.
    pub fn build(
        &self,
        entity: &str,
        paths: &[String],
        selectors: &[String],
    ) -> Result<Vec<FetchNode>, Error> {
        let root = self.handle(entity)?;
        let mut nodes = Vec::new();
        for path in paths {
            let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
            if segments.is_empty() {
                continue;
            }
            if segments.len() > self.config.max_populate_depth {
                return Err(Error::DepthExceeded {
                    path: path.clone(),
                    max_depth: self.config.max_populate_depth,
                });
            }
            self.insert_path(&mut nodes, &root, &segments, "", selectors);
        }
        Ok(nodes)
    }

    fn insert_path(
        &self,
        layer: &mut Vec<FetchNode>,
        owner: &Arc<EntityHandle>,
        segments: &[&str],
        journey: &str,
        selectors: &[String],
    ) {
        let Some((&name, rest)) = segments.split_first() else {
            return;
        };
        let path = if journey.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", journey, name)
        };

        let index = match layer.iter().position(|node| node.name() == name) {
            Some(index) => index,
            None => {
                let Some(relation) = owner.descriptor().get_relation(name) else {
                    warn!(entity = owner.name(), relation = name, path = %path, "unknown relation; skipping populate branch");
                    return;
                };
                if !self.registry.contains(&relation.target) {
                    warn!(entity = owner.name(), target = %relation.target, path = %path, "relation target not registered; skipping populate branch");
                    return;
                }
                let select = selection_for(selectors, &path);
                layer.push(FetchNode::new(relation.clone(), path.clone(), select));
                layer.len() - 1
            }
        };

        if rest.is_empty() {
            return;
        }
        let node = &mut layer[index];
        let Some(target) = self.registry.resolve(node.target()) else {
            return;
        };
        self.insert_path(&mut node.children, &target, rest, &path, selectors);
    }

    fn authorize<'s>(
        &'s self,
        nodes: &'s mut [FetchNode],
        ctx: &'s RequestContext,
    ) -> BoxFuture<'s, Result<(), Error>> {
        Box::pin(async move {
            let results = join_all(nodes.iter_mut().map(|node| async move {
                let target = self.handle(node.target())?;
                let conditions = target.authorizer().authorize(ctx).await?;
                node.filter = ConditionCaster::new(self.registry, target.name())
                    .cast(Conditions::and_always(conditions));
                self.authorize(&mut node.children, ctx).await
            }))
            .await;
            results.into_iter().collect()
        })
    }

    fn handle(&self, entity: &str) -> Result<Arc<EntityHandle>, Error> {
        self.registry
            .resolve(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }
}

/// Selectors whose prefix is exactly `path`, reduced to their last segment.
fn selection_for(selectors: &[String], path: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for selector in selectors {
        if let Some((prefix, field)) = selector.rsplit_once('.') {
            if prefix == path && !field.is_empty() && !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
    }
    fields
}
