//! Query configuration.

use crate::security::TOTAL_COUNT_HEADER;
use serde::{Deserialize, Serialize};

/// Default maximum nesting of populate paths.
pub const DEFAULT_MAX_POPULATE_DEPTH: usize = 5;

/// Configuration shared by the planner and executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum number of segments in a populate path.
    pub max_populate_depth: usize,

    /// Limit applied to list reads that do not specify one. None means
    /// unlimited.
    pub default_limit: Option<u64>,

    /// Header the total match count is reported under.
    pub total_count_header: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_populate_depth: DEFAULT_MAX_POPULATE_DEPTH,
            default_limit: None,
            total_count_header: TOTAL_COUNT_HEADER.to_string(),
        }
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum populate depth.
    pub fn with_max_populate_depth(mut self, depth: usize) -> Self {
        self.max_populate_depth = depth;
        self
    }

    /// Set the default limit for list reads.
    pub fn with_default_limit(mut self, limit: u64) -> Self {
        self.default_limit = Some(limit);
        self
    }

    /// Set the total count header name.
    pub fn with_total_count_header(mut self, name: impl Into<String>) -> Self {
        self.total_count_header = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueryConfig::default();
        assert_eq!(config.max_populate_depth, 5);
        assert_eq!(config.default_limit, None);
        assert_eq!(config.total_count_header, "X-total-count");
    }

    #[test]
    fn test_builder() {
        let config = QueryConfig::new()
            .with_max_populate_depth(2)
            .with_default_limit(50)
            .with_total_count_header("X-Total");
        assert_eq!(config.max_populate_depth, 2);
        assert_eq!(config.default_limit, Some(50));
        assert_eq!(config.total_count_header, "X-Total");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: QueryConfig =
            serde_json::from_value(serde_json::json!({"default_limit": 20})).unwrap();
        assert_eq!(config.default_limit, Some(20));
        assert_eq!(config.max_populate_depth, DEFAULT_MAX_POPULATE_DEPTH);
    }
}
