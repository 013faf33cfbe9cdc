//! Per-entity authorization filters.
//!
//! An [`Authorizer`] turns a caller context into a list of conditions that
//! are ANDed onto every read of its entity, whether the entity is queried
//! directly or reached through a relation. Returning an error rejects the
//! request outright.

use super::context::RequestContext;
use crate::error::Error;
use async_trait::async_trait;
use docrud_proto::{Conditions, Value};
use std::fmt;
use std::sync::Arc;

/// Scoping capability supplied per entity at registration time.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Conditions restricting which documents the caller may see.
    async fn authorize(&self, ctx: &RequestContext) -> Result<Vec<Conditions>, Error>;
}

/// Shared authorizer handle.
pub type SharedAuthorizer = Arc<dyn Authorizer>;

/// Places no restriction.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _ctx: &RequestContext) -> Result<Vec<Conditions>, Error> {
        Ok(Vec::new())
    }
}

/// Adapts a synchronous closure.
pub struct FnAuthorizer<F>(F);

impl<F> FnAuthorizer<F>
where
    F: Fn(&RequestContext) -> Result<Vec<Conditions>, Error> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> fmt::Debug for FnAuthorizer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnAuthorizer")
    }
}

#[async_trait]
impl<F> Authorizer for FnAuthorizer<F>
where
    F: Fn(&RequestContext) -> Result<Vec<Conditions>, Error> + Send + Sync,
{
    async fn authorize(&self, ctx: &RequestContext) -> Result<Vec<Conditions>, Error> {
        (self.0)(ctx)
    }
}

/// One scoping rule of a [`ScopeAuthorizer`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeRule {
    /// Field equals a context attribute value.
    /// Example: `org_id = context.org_id`
    AttributeEq {
        /// Field name in the entity.
        field: String,
        /// Attribute name in the caller context.
        attribute: String,
    },
    /// Field is in a list stored in a context attribute.
    AttributeIn {
        /// Field name in the entity.
        field: String,
        /// Attribute name containing the list.
        attribute: String,
    },
    /// A literal condition.
    Fixed(Conditions),
}

impl ScopeRule {
    /// Create an attribute equality rule.
    pub fn attribute_eq(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        ScopeRule::AttributeEq {
            field: field.into(),
            attribute: attribute.into(),
        }
    }

    /// Create an attribute IN rule.
    pub fn attribute_in(field: impl Into<String>, attribute: impl Into<String>) -> Self {
        ScopeRule::AttributeIn {
            field: field.into(),
            attribute: attribute.into(),
        }
    }

    fn resolve(&self, ctx: &RequestContext) -> Result<Conditions, Error> {
        match self {
            ScopeRule::AttributeEq { field, attribute } => {
                let value = required_attribute(ctx, attribute)?;
                Ok(Conditions::eq(field.as_str(), value.clone()))
            }
            ScopeRule::AttributeIn { field, attribute } => {
                let values = match required_attribute(ctx, attribute)? {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                Ok(Conditions::op(field.as_str(), "$in", Value::Array(values)))
            }
            ScopeRule::Fixed(conditions) => Ok(conditions.clone()),
        }
    }
}

fn required_attribute<'a>(ctx: &'a RequestContext, attribute: &str) -> Result<&'a Value, Error> {
    ctx.get_attribute(attribute)
        .ok_or_else(|| Error::Forbidden(format!("missing context attribute: {}", attribute)))
}

/// Scopes reads by caller attributes, with role-based bypass.
#[derive(Debug, Clone, Default)]
pub struct ScopeAuthorizer {
    rules: Vec<ScopeRule>,
    bypass_roles: Vec<String>,
}

impl ScopeAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. All rules must hold.
    pub fn with_rule(mut self, rule: ScopeRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Callers holding this role see everything.
    pub fn with_bypass_role(mut self, role: impl Into<String>) -> Self {
        self.bypass_roles.push(role.into());
        self
    }

    fn can_bypass(&self, ctx: &RequestContext) -> bool {
        self.bypass_roles.iter().any(|role| ctx.has_role(role))
    }
}

#[async_trait]
impl Authorizer for ScopeAuthorizer {
    async fn authorize(&self, ctx: &RequestContext) -> Result<Vec<Conditions>, Error> {
        if self.can_bypass(ctx) {
            return Ok(Vec::new());
        }
        self.rules.iter().map(|rule| rule.resolve(ctx)).collect()
    }
}
