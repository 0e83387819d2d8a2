//! Plugin capability traits.
//!
//! Defines the capability interfaces the chain executor dispatches over:
//! - [`PreIngestPlugin`] -- mutate ingest requests before the source sees
//!   them
//! - [`PolicyPlugin`] -- derive the policy an operation or record demands
//! - [`AccessPlugin`] -- enforce policy, with the power to reject the
//!   whole operation
//! - [`PostQueryPlugin`] -- filter or decorate query results
//! - [`PostIngestPlugin`] -- observe committed ingest outcomes
//!
//! All traits are `Send + Sync` and async via `#[async_trait]`. Request
//! processing methods take the request by value and return it (possibly
//! replaced), so a plugin that has nothing to do simply passes its input
//! through -- the default method bodies do exactly that.

use async_trait::async_trait;

use meridian_types::error::CatalogError;
use meridian_types::operation::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, Properties, QueryRequest,
    QueryResponse, UpdateRequest, UpdateResponse,
};
use meridian_types::security::CollectionPermission;
use meridian_types::Metacard;

/// Errors produced by plugin execution.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Cooperative abort: halt the remaining chain and surface the reason
    /// to the caller. This is the only cancellation primitive.
    #[error("stop processing: {0}")]
    StopProcessing(String),

    /// The plugin failed internally.
    #[error("plugin execution failed: {0}")]
    ExecutionFailed(String),

    /// An attribute mutation was rejected by the record's schema.
    #[error("attribute rejected: {0}")]
    Attribute(#[from] CatalogError),

    /// Serialization of property-bag context failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PluginError {
    /// Shorthand for [`PluginError::StopProcessing`].
    pub fn stop(reason: impl Into<String>) -> Self {
        PluginError::StopProcessing(reason.into())
    }
}

/// Policy a [`PolicyPlugin`] derived for one operation or record.
#[derive(Debug, Clone, Default)]
pub struct PolicyResponse {
    /// Markings the caller must satisfy for the operation to proceed.
    pub operation: CollectionPermission,
}

impl PolicyResponse {
    /// A response requiring `operation` to be satisfied.
    pub fn operation(operation: CollectionPermission) -> Self {
        Self { operation }
    }
}

// ── Capability traits ───────────────────────────────────────────────────

/// Mutates ingest requests before they reach the source.
#[async_trait]
pub trait PreIngestPlugin: Send + Sync {
    /// Stable name used in logs and error attribution.
    fn name(&self) -> &str;

    async fn process_create(&self, request: CreateRequest) -> Result<CreateRequest, PluginError> {
        Ok(request)
    }

    async fn process_update(&self, request: UpdateRequest) -> Result<UpdateRequest, PluginError> {
        Ok(request)
    }

    async fn process_delete(&self, request: DeleteRequest) -> Result<DeleteRequest, PluginError> {
        Ok(request)
    }
}

/// Derives the policy an operation or record demands.
///
/// Policy plugins never enforce anything themselves; the executor merges
/// their responses into the request property bag, where access plugins
/// pick the merged policy up.
#[async_trait]
pub trait PolicyPlugin: Send + Sync {
    /// Stable name used in logs and error attribution.
    fn name(&self) -> &str;

    /// Policy demanded by a record about to be created or updated.
    async fn policy_for_metacard(
        &self,
        metacard: &Metacard,
        properties: &Properties,
    ) -> Result<PolicyResponse, PluginError> {
        let _ = (metacard, properties);
        Ok(PolicyResponse::default())
    }

    /// Policy demanded by a delete request.
    async fn policy_for_delete(
        &self,
        request: &DeleteRequest,
    ) -> Result<PolicyResponse, PluginError> {
        let _ = request;
        Ok(PolicyResponse::default())
    }

    /// Policy demanded by a query.
    async fn policy_for_query(
        &self,
        request: &QueryRequest,
    ) -> Result<PolicyResponse, PluginError> {
        let _ = request;
        Ok(PolicyResponse::default())
    }
}

/// Enforces access decisions; may reject the whole operation.
#[async_trait]
pub trait AccessPlugin: Send + Sync {
    /// Stable name used in logs and error attribution.
    fn name(&self) -> &str;

    async fn process_create(&self, request: CreateRequest) -> Result<CreateRequest, PluginError> {
        Ok(request)
    }

    async fn process_update(&self, request: UpdateRequest) -> Result<UpdateRequest, PluginError> {
        Ok(request)
    }

    async fn process_delete(&self, request: DeleteRequest) -> Result<DeleteRequest, PluginError> {
        Ok(request)
    }

    async fn process_query(&self, request: QueryRequest) -> Result<QueryRequest, PluginError> {
        Ok(request)
    }

    async fn process_post_query(
        &self,
        response: QueryResponse,
    ) -> Result<QueryResponse, PluginError> {
        Ok(response)
    }
}

/// Filters or decorates query responses after the source answered.
///
/// Implementations remove individual results without aborting the chain
/// for the results that remain; only an internal fault or an explicit
/// [`PluginError::StopProcessing`] aborts.
#[async_trait]
pub trait PostQueryPlugin: Send + Sync {
    /// Stable name used in logs and error attribution.
    fn name(&self) -> &str;

    async fn process(&self, response: QueryResponse) -> Result<QueryResponse, PluginError>;
}

/// Observes ingest outcomes after the source committed.
///
/// Failures here are logged and absorbed by the executor -- the commit
/// already happened, so nothing a post-ingest plugin does can fail the
/// operation.
#[async_trait]
pub trait PostIngestPlugin: Send + Sync {
    /// Stable name used in logs and error attribution.
    fn name(&self) -> &str;

    async fn created(&self, response: &CreateResponse) -> Result<(), PluginError> {
        let _ = response;
        Ok(())
    }

    async fn updated(&self, response: &UpdateResponse) -> Result<(), PluginError> {
        let _ = response;
        Ok(())
    }

    async fn deleted(&self, response: &DeleteResponse) -> Result<(), PluginError> {
        let _ = response;
        Ok(())
    }
}
