//! Read parameters shared by every store backend.

use crate::query::filter::FilterEvaluator;
use docrud_proto::{Document, OrderDirection, OrderSpec, ID_FIELD};
use std::cmp::Ordering;

/// Skip, limit, sort and projection for a store read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindParams {
    /// Number of matching documents to skip.
    pub skip: u64,
    /// Maximum number of documents to return. `None` or `Some(0)` means
    /// unlimited.
    pub limit: Option<u64>,
    /// Sort order, applied before skip and limit.
    pub sort: Vec<OrderSpec>,
    /// Top-level fields to keep (`_id` is always kept). Empty keeps all.
    pub projection: Vec<String>,
}

impl FindParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_sort(mut self, order: OrderSpec) -> Self {
        self.sort.push(order);
        self
    }

    pub fn with_projection(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.projection.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Sort, paginate and project an already-filtered result set.
    pub fn apply(&self, mut docs: Vec<Document>) -> Vec<Document> {
        self.sort_documents(&mut docs);
        self.paginate(&mut docs);
        if !self.projection.is_empty() {
            for doc in docs.iter_mut() {
                self.project(doc);
            }
        }
        docs
    }

    fn sort_documents(&self, docs: &mut [Document]) {
        if self.sort.is_empty() {
            return;
        }

        docs.sort_by(|a, b| {
            for spec in &self.sort {
                let a_val = a.get_path(&spec.field);
                let b_val = b.get_path(&spec.field);

                let cmp = FilterEvaluator::sort_order(a_val, b_val);

                let cmp = match spec.direction {
                    OrderDirection::Asc => cmp,
                    OrderDirection::Desc => cmp.reverse(),
                };

                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });
    }

    fn paginate(&self, docs: &mut Vec<Document>) {
        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        if skip > 0 {
            if skip >= docs.len() {
                docs.clear();
                return;
            }
            docs.drain(0..skip);
        }

        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            docs.truncate(limit);
        }
    }

    fn project(&self, doc: &mut Document) {
        let kept: Document = std::mem::take(doc)
            .into_iter()
            .filter(|(key, _)| key == ID_FIELD || self.projection.iter().any(|f| f == key))
            .collect();
        *doc = kept;
    }
}
