//! Read options: sorting, pagination, field selection and population.

use crate::condition::Conditions;
use serde::{Deserialize, Serialize};

/// Ordering specification for a sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Field to order by (dot-path allowed).
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Parse `"name"` (ascending) or `"-name"` (descending).
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(spec),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Which relations to resolve on a read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum PopulateSpec {
    /// Return raw references.
    Skip,
    /// Resolve every relation the root entity declares.
    #[default]
    All,
    /// Resolve the given dot-paths. An empty list behaves like `All`.
    Paths(Vec<String>),
}

impl PopulateSpec {
    /// Build from a list of dot-paths.
    pub fn paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PopulateSpec::Paths(paths.into_iter().map(Into::into).collect())
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, PopulateSpec::Skip)
    }
}

/// Sorting, pagination and selection for a read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FindOptions {
    /// Sort fields; a leading `-` sorts descending.
    pub sort: Vec<String>,
    /// Number of documents to skip.
    pub skip: u64,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Field selectors. Plain names project the root document; dotted
    /// selectors project the populated relation at that path.
    pub select: Vec<String>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort(mut self, field: impl Into<String>) -> Self {
        self.sort.push(field.into());
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_select(mut self, field: impl Into<String>) -> Self {
        self.select.push(field.into());
        self
    }

    /// Parsed sort specifications.
    pub fn order(&self) -> Vec<OrderSpec> {
        self.sort
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| OrderSpec::parse(s))
            .collect()
    }

    /// Selectors that apply to the root document.
    pub fn root_projection(&self) -> Vec<String> {
        self.select
            .iter()
            .filter(|s| !s.contains('.'))
            .cloned()
            .collect()
    }
}

/// A read request: options, extra filters and population.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FindRequest {
    pub options: FindOptions,
    /// Conditions merged into the caller's conditions.
    pub filters: Conditions,
    pub populate: PopulateSpec,
}

impl FindRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: FindOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_filters(mut self, filters: Conditions) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_populate(mut self, populate: PopulateSpec) -> Self {
        self.populate = populate;
        self
    }
}
