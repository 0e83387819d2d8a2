//! The [`CatalogFramework`] facade.
//!
//! Wires the plugin pipeline, a catalog source, a resource retrieval
//! channel, and the resource cache into the operation flows callers see:
//! ingest requests are pre-processed (fail-fast) then committed; queries
//! are pre-processed, answered by the source, then post-filtered; resource
//! requests go through the cache's singleflight path. Each operation runs
//! on the caller's task -- the framework owns no threads of its own, and
//! the cache is the only state shared across concurrent callers.

use std::sync::Arc;

use tracing::debug;

use meridian_types::operation::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, QueryRequest, QueryResponse,
    ResourceRequest, ResourceResponse, UpdateRequest, UpdateResponse,
};
use meridian_types::Metacard;

use crate::cache::{CacheError, CacheKey, ResourceCache};
use crate::config::FrameworkConfig;
use crate::pipeline::{PipelineError, PluginPipeline};
use crate::policy::subject_from_properties;
use crate::source::{CatalogSource, ResourceRetriever, RetrieveError, SourceError};

/// Errors surfaced by framework operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    /// The plugin chain rejected or failed the request.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The catalog source failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Cache population failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Direct (cache-bypassing) retrieval failed.
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
}

/// The catalog framework core.
///
/// Construct once at startup via [`CatalogFramework::builder`] and share
/// behind an `Arc`; every operation takes `&self`.
pub struct CatalogFramework {
    source: Arc<dyn CatalogSource>,
    retriever: Arc<dyn ResourceRetriever>,
    pipeline: PluginPipeline,
    cache: ResourceCache,
    config: FrameworkConfig,
}

/// Builder for [`CatalogFramework`].
pub struct CatalogFrameworkBuilder {
    source: Arc<dyn CatalogSource>,
    retriever: Arc<dyn ResourceRetriever>,
    pipeline: PluginPipeline,
    config: FrameworkConfig,
}

impl CatalogFrameworkBuilder {
    /// Install the plugin pipeline. Defaults to the empty pipeline.
    pub fn pipeline(mut self, pipeline: PluginPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Install configuration. Defaults to [`FrameworkConfig::default`].
    pub fn config(mut self, config: FrameworkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> CatalogFramework {
        CatalogFramework {
            source: self.source,
            retriever: self.retriever,
            pipeline: self.pipeline,
            cache: ResourceCache::new(),
            config: self.config,
        }
    }
}

impl CatalogFramework {
    pub fn builder(
        source: Arc<dyn CatalogSource>,
        retriever: Arc<dyn ResourceRetriever>,
    ) -> CatalogFrameworkBuilder {
        CatalogFrameworkBuilder {
            source,
            retriever,
            pipeline: PluginPipeline::empty(),
            config: FrameworkConfig::default(),
        }
    }

    /// The cache this framework populates. Exposed so ingest flows can
    /// pre-populate resources and operators can inspect population.
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    // ── Ingest ──────────────────────────────────────────────────────

    /// Create records: pre-process, commit, notify.
    pub async fn create(&self, request: CreateRequest) -> Result<CreateResponse, FrameworkError> {
        let count = request.metacards.len();
        let request = self.pipeline.process_create(request).await?;
        let response = self.source.create(request).await?;
        debug!(source = self.source.id(), count, "create committed");
        self.pipeline.notify_created(&response).await;
        Ok(response)
    }

    /// Update records: pre-process, commit, notify.
    pub async fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, FrameworkError> {
        let count = request.updates.len();
        let request = self.pipeline.process_update(request).await?;
        let response = self.source.update(request).await?;
        debug!(source = self.source.id(), count, "update committed");
        self.pipeline.notify_updated(&response).await;
        Ok(response)
    }

    /// Delete records: pre-process, commit, notify.
    pub async fn delete(&self, request: DeleteRequest) -> Result<DeleteResponse, FrameworkError> {
        let count = request.ids.len();
        let request = self.pipeline.process_delete(request).await?;
        let response = self.source.delete(request).await?;
        debug!(source = self.source.id(), count, "delete committed");
        self.pipeline.notify_deleted(&response).await;
        Ok(response)
    }

    // ── Query ───────────────────────────────────────────────────────

    /// Query the source and post-filter the results.
    ///
    /// The subject is checked up front: a request with no principal
    /// fails before the source is ever contacted, since post-query
    /// filtering could not run against its results anyway.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse, FrameworkError> {
        subject_from_properties(&request.properties)?;

        let request = self.pipeline.process_query(request).await?;
        let request_properties = request.properties.clone();
        let mut response = self.source.query(request).await?;

        // Propagate request context (subject included) to the response
        // bag for the post-query chain; response-side values win.
        for (key, value) in request_properties {
            response.properties.entry(key).or_insert(value);
        }

        let response = self.pipeline.process_post_query(response).await?;
        debug!(
            source = self.source.id(),
            results = response.results.len(),
            filtered = response.filtered_count(),
            "query completed"
        );
        Ok(response)
    }

    // ── Resources ───────────────────────────────────────────────────

    /// Retrieve the resource backing a record, through the cache's
    /// singleflight path (or directly when the cache is disabled).
    pub async fn resource(
        &self,
        metacard: &Metacard,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse, FrameworkError> {
        if !self.config.cache.enabled {
            let resource = self.retriever.retrieve(metacard, request).await?;
            return Ok(ResourceResponse {
                resource,
                properties: request.properties.clone(),
            });
        }

        let key = CacheKey::for_request(metacard, request);
        let fetch_key = key.to_string();
        let retriever = Arc::clone(&self.retriever);
        let metacard_owned = metacard.clone();
        let request_owned = request.clone();

        let resource = self
            .cache
            .get_or_fetch(key, move || async move {
                retriever
                    .retrieve(&metacard_owned, &request_owned)
                    .await
                    .map_err(|e| CacheError::FetchFailed {
                        key: fetch_key,
                        reason: e.to_string(),
                    })
            })
            .await?;

        Ok(ResourceResponse {
            resource: (*resource).clone(),
            properties: request.properties.clone(),
        })
    }
}
