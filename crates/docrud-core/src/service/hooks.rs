//! Lifecycle hooks.

use crate::error::Error;
use crate::security::RequestContext;
use async_trait::async_trait;
use docrud_proto::Document;
use std::sync::Arc;

/// Override points invoked by [`CrudService`](super::CrudService) writes.
///
/// Every hook defaults to a no-op. Returning an error aborts the request
/// before anything is written.
#[async_trait]
pub trait EntityHooks: Send + Sync {
    /// Called with the fully prepared document right before it is stored,
    /// on create, patch and put alike.
    async fn pre_save(&self, doc: Document, _ctx: Option<&RequestContext>) -> Result<Document, Error> {
        Ok(doc)
    }

    /// Called with the incoming document of a create request.
    async fn on_create_request(
        &self,
        doc: Document,
        _ctx: Option<&RequestContext>,
    ) -> Result<Document, Error> {
        Ok(doc)
    }

    /// Called with the incoming document of a patch or put request.
    async fn on_update_request(
        &self,
        doc: Document,
        _ctx: Option<&RequestContext>,
    ) -> Result<Document, Error> {
        Ok(doc)
    }

    /// Called with the stored document before it is deleted.
    async fn on_delete_request(
        &self,
        _doc: &Document,
        _ctx: Option<&RequestContext>,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Shared hooks handle.
pub type SharedHooks = Arc<dyn EntityHooks>;

/// Hooks that change nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl EntityHooks for NoHooks {}
