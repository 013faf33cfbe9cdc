//! Caller context and authorization.
//!
//! - [`context`] - Request context and the response header side-channel
//! - [`authorizer`] - Per-entity authorization filters

pub mod authorizer;
pub mod context;

pub use authorizer::{AllowAll, Authorizer, FnAuthorizer, ScopeAuthorizer, ScopeRule, SharedAuthorizer};
pub use context::{RequestContext, ResponseHeaders, EXPOSE_HEADERS, TOTAL_COUNT_HEADER};
