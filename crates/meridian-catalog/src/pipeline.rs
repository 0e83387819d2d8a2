//! The plugin chain executor.
//!
//! [`PluginPipeline`] owns one ordered list per plugin capability and
//! threads requests and responses through them in sequence. Registration
//! order is execution order -- deterministic, stable across runs, and
//! never reordered by the executor.
//!
//! For an ingest request the stages run policy -> access -> pre-ingest;
//! for a query, policy -> access; for a query response, access
//! (post-query) -> post-query filters. A plugin raising
//! [`PluginError::StopProcessing`] aborts the remaining chain and
//! surfaces as [`PipelineError::Stopped`]; any other plugin failure
//! surfaces as [`PipelineError::PluginFault`]. Both are fail-fast: the
//! request never reaches the source.

use std::sync::Arc;

use tracing::debug;

use meridian_types::operation::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, Properties, QueryRequest,
    QueryResponse, UpdateRequest, UpdateResponse,
};
use meridian_types::security::CollectionPermission;

use crate::plugin::{
    AccessPlugin, PluginError, PolicyPlugin, PostIngestPlugin, PostQueryPlugin, PreIngestPlugin,
};

/// Request property under which the executor stores the merged operation
/// policy derived by the policy stage. Access plugins read it back.
pub const OPERATION_POLICY_PROPERTY: &str = "policy.operation";

/// Errors surfaced by chain execution.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A plugin cooperatively stopped the chain.
    #[error("processing stopped by plugin '{plugin}': {reason}")]
    Stopped {
        /// The plugin that raised the stop.
        plugin: String,
        /// Why it stopped the chain.
        reason: String,
    },

    /// A plugin failed internally; wrapped and surfaced as a chain-level
    /// failure without touching cache state or other in-flight requests.
    #[error("plugin '{plugin}' failed")]
    PluginFault {
        /// The plugin that failed.
        plugin: String,
        #[source]
        source: PluginError,
    },

    /// The request carries no security subject, so access processing
    /// cannot run at all.
    #[error("no security subject present on the request")]
    MissingSubject,

    /// The request carries a subject that does not deserialize.
    #[error("malformed security subject")]
    InvalidSubject(#[source] serde_json::Error),

    /// Property-bag context could not be encoded.
    #[error("failed to encode request context")]
    Context(#[source] serde_json::Error),
}

/// Where a chain currently stands. `Aborted` is terminal and carries the
/// plugin that triggered it; `Completed` means the request or response
/// was threaded through every configured plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainState {
    Pending,
    Running { plugin: String },
    Completed,
    Aborted { plugin: String },
}

/// Per-run bookkeeping: traces each transition and pins error
/// attribution to the plugin that was running.
struct ChainRun {
    chain: &'static str,
    state: ChainState,
}

impl ChainRun {
    fn new(chain: &'static str) -> Self {
        Self {
            chain,
            state: ChainState::Pending,
        }
    }

    fn enter(&mut self, plugin: &str) {
        debug!(chain = self.chain, plugin, "running plugin");
        self.state = ChainState::Running {
            plugin: plugin.to_string(),
        };
    }

    fn complete(&mut self) {
        debug!(chain = self.chain, "chain completed");
        self.state = ChainState::Completed;
    }

    /// Map a plugin failure to its chain-level error, recording the
    /// terminal state.
    fn abort(&mut self, plugin: &str, error: PluginError) -> PipelineError {
        debug!(chain = self.chain, plugin, error = %error, "chain aborted");
        self.state = ChainState::Aborted {
            plugin: plugin.to_string(),
        };
        match error {
            PluginError::StopProcessing(reason) => PipelineError::Stopped {
                plugin: plugin.to_string(),
                reason,
            },
            other => PipelineError::PluginFault {
                plugin: plugin.to_string(),
                source: other,
            },
        }
    }
}

/// The ordered chain executor.
///
/// Built once at composition time via [`PluginPipeline::builder`];
/// stateless per invocation -- all context a plugin needs arrives in the
/// request's property bag.
#[derive(Default)]
pub struct PluginPipeline {
    policy_plugins: Vec<Arc<dyn PolicyPlugin>>,
    access_plugins: Vec<Arc<dyn AccessPlugin>>,
    pre_ingest_plugins: Vec<Arc<dyn PreIngestPlugin>>,
    post_query_plugins: Vec<Arc<dyn PostQueryPlugin>>,
    post_ingest_plugins: Vec<Arc<dyn PostIngestPlugin>>,
}

/// Builder for [`PluginPipeline`]. Call order fixes execution order.
#[derive(Default)]
pub struct PluginPipelineBuilder {
    pipeline: PluginPipeline,
}

impl PluginPipelineBuilder {
    pub fn policy(mut self, plugin: Arc<dyn PolicyPlugin>) -> Self {
        self.pipeline.policy_plugins.push(plugin);
        self
    }

    pub fn access(mut self, plugin: Arc<dyn AccessPlugin>) -> Self {
        self.pipeline.access_plugins.push(plugin);
        self
    }

    pub fn pre_ingest(mut self, plugin: Arc<dyn PreIngestPlugin>) -> Self {
        self.pipeline.pre_ingest_plugins.push(plugin);
        self
    }

    pub fn post_query(mut self, plugin: Arc<dyn PostQueryPlugin>) -> Self {
        self.pipeline.post_query_plugins.push(plugin);
        self
    }

    pub fn post_ingest(mut self, plugin: Arc<dyn PostIngestPlugin>) -> Self {
        self.pipeline.post_ingest_plugins.push(plugin);
        self
    }

    pub fn build(self) -> PluginPipeline {
        self.pipeline
    }
}

impl PluginPipeline {
    pub fn builder() -> PluginPipelineBuilder {
        PluginPipelineBuilder::default()
    }

    /// An executor with no plugins at all: every chain is the identity.
    pub fn empty() -> Self {
        Self::default()
    }

    // ── Ingest chains ───────────────────────────────────────────────

    /// Run the create chain: policy -> access -> pre-ingest.
    pub async fn process_create(
        &self,
        mut request: CreateRequest,
    ) -> Result<CreateRequest, PipelineError> {
        let mut run = ChainRun::new("create");

        let mut policy = CollectionPermission::default();
        for plugin in &self.policy_plugins {
            run.enter(plugin.name());
            for metacard in &request.metacards {
                match plugin.policy_for_metacard(metacard, &request.properties).await {
                    Ok(response) => policy.merge(&response.operation),
                    Err(e) => return Err(run.abort(plugin.name(), e)),
                }
            }
        }
        store_operation_policy(&mut request.properties, &policy)
            .map_err(PipelineError::Context)?;

        for plugin in &self.access_plugins {
            run.enter(plugin.name());
            request = plugin
                .process_create(request)
                .await
                .map_err(|e| run.abort(plugin.name(), e))?;
        }
        for plugin in &self.pre_ingest_plugins {
            run.enter(plugin.name());
            request = plugin
                .process_create(request)
                .await
                .map_err(|e| run.abort(plugin.name(), e))?;
        }

        run.complete();
        Ok(request)
    }

    /// Run the update chain: policy -> access -> pre-ingest.
    pub async fn process_update(
        &self,
        mut request: UpdateRequest,
    ) -> Result<UpdateRequest, PipelineError> {
        let mut run = ChainRun::new("update");

        let mut policy = CollectionPermission::default();
        for plugin in &self.policy_plugins {
            run.enter(plugin.name());
            for update in &request.updates {
                match plugin
                    .policy_for_metacard(&update.metacard, &request.properties)
                    .await
                {
                    Ok(response) => policy.merge(&response.operation),
                    Err(e) => return Err(run.abort(plugin.name(), e)),
                }
            }
        }
        store_operation_policy(&mut request.properties, &policy)
            .map_err(PipelineError::Context)?;

        for plugin in &self.access_plugins {
            run.enter(plugin.name());
            request = plugin
                .process_update(request)
                .await
                .map_err(|e| run.abort(plugin.name(), e))?;
        }
        for plugin in &self.pre_ingest_plugins {
            run.enter(plugin.name());
            request = plugin
                .process_update(request)
                .await
                .map_err(|e| run.abort(plugin.name(), e))?;
        }

        run.complete();
        Ok(request)
    }

    /// Run the delete chain: policy -> access -> pre-ingest.
    pub async fn process_delete(
        &self,
        mut request: DeleteRequest,
    ) -> Result<DeleteRequest, PipelineError> {
        let mut run = ChainRun::new("delete");

        let mut policy = CollectionPermission::default();
        for plugin in &self.policy_plugins {
            run.enter(plugin.name());
            match plugin.policy_for_delete(&request).await {
                Ok(response) => policy.merge(&response.operation),
                Err(e) => return Err(run.abort(plugin.name(), e)),
            }
        }
        store_operation_policy(&mut request.properties, &policy)
            .map_err(PipelineError::Context)?;

        for plugin in &self.access_plugins {
            run.enter(plugin.name());
            request = plugin
                .process_delete(request)
                .await
                .map_err(|e| run.abort(plugin.name(), e))?;
        }
        for plugin in &self.pre_ingest_plugins {
            run.enter(plugin.name());
            request = plugin
                .process_delete(request)
                .await
                .map_err(|e| run.abort(plugin.name(), e))?;
        }

        run.complete();
        Ok(request)
    }

    // ── Query chains ────────────────────────────────────────────────

    /// Run the query pre-processing chain: policy -> access.
    pub async fn process_query(
        &self,
        mut request: QueryRequest,
    ) -> Result<QueryRequest, PipelineError> {
        let mut run = ChainRun::new("query");

        let mut policy = CollectionPermission::default();
        for plugin in &self.policy_plugins {
            run.enter(plugin.name());
            match plugin.policy_for_query(&request).await {
                Ok(response) => policy.merge(&response.operation),
                Err(e) => return Err(run.abort(plugin.name(), e)),
            }
        }
        store_operation_policy(&mut request.properties, &policy)
            .map_err(PipelineError::Context)?;

        for plugin in &self.access_plugins {
            run.enter(plugin.name());
            request = plugin
                .process_query(request)
                .await
                .map_err(|e| run.abort(plugin.name(), e))?;
        }

        run.complete();
        Ok(request)
    }

    /// Run the post-query chain: access post-query -> result filters.
    pub async fn process_post_query(
        &self,
        mut response: QueryResponse,
    ) -> Result<QueryResponse, PipelineError> {
        let mut run = ChainRun::new("post-query");

        for plugin in &self.access_plugins {
            run.enter(plugin.name());
            response = plugin
                .process_post_query(response)
                .await
                .map_err(|e| run.abort(plugin.name(), e))?;
        }
        for plugin in &self.post_query_plugins {
            run.enter(plugin.name());
            response = plugin
                .process(response)
                .await
                .map_err(|e| run.abort(plugin.name(), e))?;
        }

        run.complete();
        Ok(response)
    }

    // ── Post-ingest notification ────────────────────────────────────

    /// Notify post-ingest plugins of a committed create. Failures are
    /// logged and absorbed: the commit already happened.
    pub async fn notify_created(&self, response: &CreateResponse) {
        for plugin in &self.post_ingest_plugins {
            if let Err(e) = plugin.created(response).await {
                tracing::warn!(plugin = plugin.name(), error = %e, "post-ingest plugin failed");
            }
        }
    }

    /// Notify post-ingest plugins of a committed update.
    pub async fn notify_updated(&self, response: &UpdateResponse) {
        for plugin in &self.post_ingest_plugins {
            if let Err(e) = plugin.updated(response).await {
                tracing::warn!(plugin = plugin.name(), error = %e, "post-ingest plugin failed");
            }
        }
    }

    /// Notify post-ingest plugins of a committed delete.
    pub async fn notify_deleted(&self, response: &DeleteResponse) {
        for plugin in &self.post_ingest_plugins {
            if let Err(e) = plugin.deleted(response).await {
                tracing::warn!(plugin = plugin.name(), error = %e, "post-ingest plugin failed");
            }
        }
    }
}

// ── Operation policy hand-off ───────────────────────────────────────────

/// Store the merged operation policy in the property bag. An empty policy
/// clears the key so access plugins see exactly what the policy stage
/// derived for this request and nothing stale.
fn store_operation_policy(
    properties: &mut Properties,
    policy: &CollectionPermission,
) -> Result<(), serde_json::Error> {
    if policy.is_empty() {
        properties.remove(OPERATION_POLICY_PROPERTY);
    } else {
        properties.insert(
            OPERATION_POLICY_PROPERTY.to_string(),
            serde_json::to_value(policy)?,
        );
    }
    Ok(())
}

/// Read the merged operation policy an executor stored for this request.
pub fn operation_policy(
    properties: &Properties,
) -> Result<Option<CollectionPermission>, serde_json::Error> {
    properties
        .get(OPERATION_POLICY_PROPERTY)
        .map(|value| serde_json::from_value(value.clone()))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PolicyResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use meridian_types::{Metacard, MetacardType};

    /// Pre-ingest plugin that tags each request with its name, so tests
    /// can observe both invocation and ordering.
    struct Tagger {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Tagger {
        fn new(name: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                log,
            })
        }
    }

    #[async_trait]
    impl PreIngestPlugin for Tagger {
        fn name(&self) -> &str {
            &self.name
        }

        async fn process_create(
            &self,
            mut request: CreateRequest,
        ) -> Result<CreateRequest, PluginError> {
            self.log.lock().unwrap().push(self.name.clone());
            request
                .properties
                .insert(format!("touched.{}", self.name), true.into());
            Ok(request)
        }
    }

    /// Pre-ingest plugin that stops the chain.
    struct Stopper;

    #[async_trait]
    impl PreIngestPlugin for Stopper {
        fn name(&self) -> &str {
            "stopper"
        }

        async fn process_create(
            &self,
            _request: CreateRequest,
        ) -> Result<CreateRequest, PluginError> {
            Err(PluginError::stop("records not releasable"))
        }
    }

    struct Faulty;

    #[async_trait]
    impl PreIngestPlugin for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }

        async fn process_create(
            &self,
            _request: CreateRequest,
        ) -> Result<CreateRequest, PluginError> {
            Err(PluginError::ExecutionFailed("backing store offline".into()))
        }
    }

    fn request() -> CreateRequest {
        CreateRequest::new(vec![Metacard::new(MetacardType::basic())])
    }

    #[tokio::test]
    async fn zero_plugin_chain_is_identity() {
        let pipeline = PluginPipeline::empty();
        let input = request();
        let output = pipeline.process_create(input.clone()).await.unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn plugins_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PluginPipeline::builder()
            .pre_ingest(Tagger::new("a", log.clone()))
            .pre_ingest(Tagger::new("b", log.clone()))
            .pre_ingest(Tagger::new("c", log.clone()))
            .build();

        pipeline.process_create(request()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn stop_aborts_remaining_chain_and_keeps_prior_mutation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PluginPipeline::builder()
            .pre_ingest(Tagger::new("a", log.clone()))
            .pre_ingest(Arc::new(Stopper))
            .pre_ingest(Tagger::new("c", log.clone()))
            .build();

        let err = pipeline.process_create(request()).await.unwrap_err();
        match err {
            PipelineError::Stopped { plugin, reason } => {
                assert_eq!(plugin, "stopper");
                assert_eq!(reason, "records not releasable");
            }
            other => panic!("expected Stopped, got {other:?}"),
        }
        // A ran, C never did.
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn internal_fault_is_wrapped_with_attribution() {
        let pipeline = PluginPipeline::builder().pre_ingest(Arc::new(Faulty)).build();
        let err = pipeline.process_create(request()).await.unwrap_err();
        match err {
            PipelineError::PluginFault { plugin, source } => {
                assert_eq!(plugin, "faulty");
                assert!(matches!(source, PluginError::ExecutionFailed(_)));
            }
            other => panic!("expected PluginFault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn policy_stage_merges_into_the_property_bag() {
        use meridian_types::security::{CollectionPermission, SecurityMarkings};

        struct RoleDemand;

        #[async_trait]
        impl PolicyPlugin for RoleDemand {
            fn name(&self) -> &str {
                "role-demand"
            }

            async fn policy_for_metacard(
                &self,
                _metacard: &Metacard,
                _properties: &Properties,
            ) -> Result<PolicyResponse, PluginError> {
                Ok(PolicyResponse::operation(CollectionPermission::from_markings(
                    &SecurityMarkings::default().with("role", ["operator"]),
                )))
            }
        }

        let pipeline = PluginPipeline::builder().policy(Arc::new(RoleDemand)).build();
        let out = pipeline.process_create(request()).await.unwrap();
        let policy = operation_policy(&out.properties).unwrap().unwrap();
        assert_eq!(policy.permissions.len(), 1);
        assert_eq!(policy.permissions[0].key, "role");
    }

    #[tokio::test]
    async fn empty_policy_stage_leaves_no_residue() {
        let pipeline = PluginPipeline::empty();
        let mut input = request();
        // Simulate a stale policy left over from an earlier hop.
        input
            .properties
            .insert(OPERATION_POLICY_PROPERTY.to_string(), serde_json::json!({}));
        let out = pipeline.process_create(input).await.unwrap();
        assert!(out.properties.get(OPERATION_POLICY_PROPERTY).is_none());
    }

    #[tokio::test]
    async fn post_ingest_failures_are_absorbed() {
        struct Grumpy(AtomicUsize);

        #[async_trait]
        impl PostIngestPlugin for Grumpy {
            fn name(&self) -> &str {
                "grumpy"
            }

            async fn created(&self, _response: &CreateResponse) -> Result<(), PluginError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(PluginError::ExecutionFailed("event bus down".into()))
            }
        }

        let grumpy = Arc::new(Grumpy(AtomicUsize::new(0)));
        let pipeline = PluginPipeline::builder().post_ingest(grumpy.clone()).build();
        let response = CreateResponse {
            created: Vec::new(),
            properties: Properties::new(),
        };
        // Does not panic, does not return an error.
        pipeline.notify_created(&response).await;
        assert_eq!(grumpy.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn chain_run_transitions() {
        let mut run = ChainRun::new("test");
        assert_eq!(run.state, ChainState::Pending);
        run.enter("a");
        assert_eq!(
            run.state,
            ChainState::Running { plugin: "a".into() }
        );
        run.complete();
        assert_eq!(run.state, ChainState::Completed);

        let mut aborted = ChainRun::new("test");
        aborted.enter("b");
        let err = aborted.abort("b", PluginError::stop("no"));
        assert!(matches!(err, PipelineError::Stopped { .. }));
        assert_eq!(
            aborted.state,
            ChainState::Aborted { plugin: "b".into() }
        );
    }
}
