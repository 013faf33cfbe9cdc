//! Populate execution.
//!
//! Resolves a tree of [`FetchNode`]s against a store. Each node issues one
//! `$in` query covering every parent document, so a list of N documents
//! costs one query per node rather than one per document. Sibling nodes are
//! fetched concurrently.

use crate::error::Error;
use crate::query::filter::FilterEvaluator;
use crate::query::planner::FetchNode;
use crate::store::{FindParams, SharedStore};
use docrud_proto::{Conditions, Document, Value, ID_FIELD};
use futures::future::{join_all, BoxFuture};
use tracing::trace;

/// Replaces reference fields with the documents they point to.
pub struct Populator {
    store: SharedStore,
}

impl Populator {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Populate every document in `docs` along `nodes`.
    pub fn populate<'a>(
        &'a self,
        docs: &'a mut [Document],
        nodes: &'a [FetchNode],
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if docs.is_empty() || nodes.is_empty() {
                return Ok(());
            }

            let parents: &[Document] = docs;
            let fetched = join_all(nodes.iter().map(|node| self.fetch(node, parents))).await;

            for (node, related) in nodes.iter().zip(fetched) {
                let related = related?;
                for doc in docs.iter_mut() {
                    attach(node, doc, &related);
                }
            }
            Ok(())
        })
    }

    /// Fetch and populate the related documents for one node.
    fn fetch<'a>(
        &'a self,
        node: &'a FetchNode,
        parents: &'a [Document],
    ) -> BoxFuture<'a, Result<Vec<Document>, Error>> {
        Box::pin(async move {
            let keys = collect_keys(parents, &node.relation.local_field);
            if keys.is_empty() {
                return Ok(Vec::new());
            }

            let mut conditions =
                Conditions::op(node.relation.foreign_field.as_str(), "$in", Value::Array(keys));
            conditions.merge(node.filter.clone());

            let params = FindParams::new().with_projection(projection(node));
            let mut related = self.store.find(node.target(), &conditions, &params).await?;
            trace!(path = %node.path, target = node.target(), fetched = related.len(), "populate node");

            self.populate(&mut related, &node.children).await?;
            Ok(related)
        })
    }
}

/// Distinct reference keys held by `field` across `docs`.
fn collect_keys(docs: &[Document], field: &str) -> Vec<Value> {
    let mut keys: Vec<Value> = Vec::new();
    let mut push = |value: &Value| {
        if let Some(key) = reference_key(value) {
            if !keys.iter().any(|k| FilterEvaluator::values_equal(k, &key)) {
                keys.push(key);
            }
        }
    };
    for doc in docs {
        for value in FilterEvaluator::lookup(doc, field) {
            match value {
                Value::Array(items) => items.iter().for_each(&mut push),
                other => push(other),
            }
        }
    }
    keys
}

/// Key of a reference value. An already populated document contributes its
/// identifier.
fn reference_key(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Document(doc) => doc.get(ID_FIELD).cloned(),
        other => Some(other.clone()),
    }
}

/// Fields fetched for a node: the selection, widened by the key fields the
/// node and its children join on.
fn projection(node: &FetchNode) -> Vec<String> {
    if node.select.is_empty() {
        return Vec::new();
    }
    let mut fields = node.select.clone();
    let join_fields = std::iter::once(node.relation.foreign_field.as_str())
        .chain(node.children.iter().map(|child| child.relation.local_field.as_str()));
    for field in join_fields {
        let root = field.split('.').next().unwrap_or(field);
        if !fields.iter().any(|f| f == root) {
            fields.push(root.to_string());
        }
    }
    fields
}

/// Whether `candidate` holds `key` in `field`, directly or as an array
/// element. A field already populated by a child node matches on its `_id`.
fn holds_key(candidate: &Document, field: &str, key: &Value) -> bool {
    let matches = |value: &Value| {
        reference_key(value).is_some_and(|held| FilterEvaluator::values_equal(&held, key))
    };
    FilterEvaluator::lookup(candidate, field)
        .into_iter()
        .any(|value| match value {
            Value::Array(items) => items.iter().any(matches),
            other => matches(other),
        })
}

fn find_related<'r>(related: &'r [Document], field: &str, key: &Value) -> Option<&'r Document> {
    related.iter().find(|candidate| holds_key(candidate, field, key))
}

/// Write the related documents for `node` into `doc`.
fn attach(node: &FetchNode, doc: &mut Document, related: &[Document]) {
    let relation = &node.relation;
    let foreign = relation.foreign_field.as_str();

    if relation.is_virtual {
        let Some(key) = doc.get_path(&relation.local_field).and_then(reference_key) else {
            return;
        };
        let matches = related.iter().filter(|candidate| holds_key(candidate, foreign, &key));
        let value = if relation.is_many() {
            Value::Array(matches.cloned().map(Value::Document).collect())
        } else {
            matches.cloned().next().map(Value::Document).unwrap_or(Value::Null)
        };
        doc.insert(relation.name.as_str(), value);
        return;
    }

    let Some(current) = doc.get_path(&relation.local_field) else {
        return;
    };
    let value = match current {
        Value::Null => return,
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter_map(reference_key)
                .filter_map(|key| find_related(related, foreign, &key))
                .cloned()
                .map(Value::Document)
                .collect(),
        ),
        single => match reference_key(single) {
            Some(key) => find_related(related, foreign, &key)
                .cloned()
                .map(Value::Document)
                .unwrap_or(Value::Null),
            None => return,
        },
    };
    doc.set_path(&relation.local_field, value);
}
