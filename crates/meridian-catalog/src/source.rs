//! Collaborator traits consumed by the framework.
//!
//! The framework core introduces no wire format of its own: sources and
//! retrieval channels hand it already materialized objects. [`CatalogSource`]
//! is the persistence/query side; [`ResourceRetriever`] is the byte-supplying
//! channel the resource cache wraps.

use async_trait::async_trait;

use meridian_types::operation::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, QueryRequest, QueryResponse,
    Resource, ResourceRequest, UpdateRequest, UpdateResponse,
};
use meridian_types::Metacard;

/// Errors reported by a catalog source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source cannot be reached at all.
    #[error("source '{source_id}' is unavailable: {reason}")]
    Unavailable {
        /// Id of the source that failed.
        source_id: String,
        /// Why it is unavailable.
        reason: String,
    },

    /// An ingest operation failed after the source was reached.
    #[error("ingest failed: {0}")]
    Ingest(String),

    /// A query failed after the source was reached.
    #[error("query failed: {0}")]
    Query(String),
}

/// Errors reported by a resource retrieval channel.
#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    /// The record exists but has no resource (or none for the requested
    /// qualifier).
    #[error("no resource for metacard '{metacard_id}'")]
    NotFound {
        /// Id of the record whose resource was requested.
        metacard_id: String,
    },

    /// The channel failed mid-retrieval.
    #[error("retrieval failed: {0}")]
    Failed(String),

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A catalog provider or federated source: persists records and answers
/// queries.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Stable source id for log attribution.
    fn id(&self) -> &str;

    async fn create(&self, request: CreateRequest) -> Result<CreateResponse, SourceError>;

    async fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, SourceError>;

    async fn delete(&self, request: DeleteRequest) -> Result<DeleteResponse, SourceError>;

    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, SourceError>;
}

/// Supplies the bytes backing a record, for the cache to wrap and store.
#[async_trait]
pub trait ResourceRetriever: Send + Sync {
    async fn retrieve(
        &self,
        metacard: &Metacard,
        request: &ResourceRequest,
    ) -> Result<Resource, RetrieveError>;
}
