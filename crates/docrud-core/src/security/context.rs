//! Caller context that flows through every read and write.
//!
//! The context carries the caller's identity, roles and attributes, which
//! authorizers turn into scoping conditions, and an optional side-channel
//! for response headers.

use docrud_proto::Value;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Header carrying the unpaginated match count of a list read.
pub const TOTAL_COUNT_HEADER: &str = "X-total-count";

/// Header listing response headers a browser client may read.
pub const EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";

/// Shared, mutable set of response headers.
///
/// Clones share the same underlying map, so the transport layer can keep
/// one handle and read back what the executor wrote.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any previous value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.lock().insert(name.into(), value.into());
    }

    /// Get a header value.
    pub fn get(&self, name: &str) -> Option<String> {
        self.inner.lock().get(name).cloned()
    }

    /// Prepend an item to a comma-separated list header, keeping the
    /// existing items.
    pub fn append_list(&self, name: &str, item: &str) {
        let mut headers = self.inner.lock();
        let merged = match headers.get(name).map(String::as_str) {
            None | Some("") => item.to_string(),
            Some(existing) if existing.split(',').any(|v| v.trim() == item) => {
                existing.to_string()
            }
            Some(existing) => format!("{}, {}", item, existing),
        };
        headers.insert(name.to_string(), merged);
    }

    /// Copy of all headers.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.lock().clone()
    }
}

/// Request-scoped caller context.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Caller identity (user id, service name, ...).
    pub identity: String,
    /// Caller roles.
    pub roles: Vec<String>,
    /// Caller attributes consulted by authorizers (e.g. user_id, org_id).
    pub attributes: HashMap<String, Value>,
    /// Response side-channel, when the transport wants headers back.
    pub headers: Option<ResponseHeaders>,
}

impl RequestContext {
    /// Create a context for the given identity.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Self::default()
        }
    }

    /// Create a context with no identity, roles or attributes.
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    /// Add a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set multiple attributes.
    pub fn with_attributes(mut self, attributes: HashMap<String, Value>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Attach a response header side-channel.
    pub fn with_headers(mut self, headers: ResponseHeaders) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Get an attribute value.
    pub fn get_attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Get an attribute as a string value.
    pub fn get_attribute_string(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Check whether the caller holds a role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Response side-channel, if any.
    pub fn headers(&self) -> Option<&ResponseHeaders> {
        self.headers.as_ref()
    }
}
