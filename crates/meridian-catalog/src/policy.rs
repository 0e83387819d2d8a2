//! Subject extraction and the built-in policy plugins.
//!
//! Three cooperating pieces implement attribute-based access control:
//!
//! 1. [`MetacardMarkingsPolicyPlugin`] (policy stage) derives the claim a
//!    record's own security markings demand.
//! 2. [`SubjectAccessPlugin`] (access stage) requires a subject on every
//!    request and enforces the merged operation policy on ingest and
//!    query.
//! 3. [`MarkingsFilterPlugin`] (post-query stage) tests every result
//!    against the caller and silently drops the ones the caller may not
//!    see, counting and logging what it removed.
//!
//! A record with no markings is permitted by default -- an open policy
//! when markings are absent. That default is deliberate and configurable
//! via [`PolicyConfig::permit_unmarked`].

use async_trait::async_trait;
use tracing::{debug, info};

use meridian_types::operation::{
    CreateRequest, DeleteRequest, Properties, QueryRequest, QueryResponse, UpdateRequest,
};
use meridian_types::security::{CollectionPermission, Subject, SUBJECT_PROPERTY};
use meridian_types::Metacard;

use crate::config::PolicyConfig;
use crate::pipeline::{operation_policy, PipelineError};
use crate::plugin::{AccessPlugin, PluginError, PolicyPlugin, PolicyResponse, PostQueryPlugin};

/// Extract the authenticated subject from a request's property bag.
///
/// An absent subject is a hard failure: filtering and enforcement cannot
/// proceed without a principal to test against.
pub fn subject_from_properties(properties: &Properties) -> Result<Subject, PipelineError> {
    match properties.get(SUBJECT_PROPERTY) {
        None => Err(PipelineError::MissingSubject),
        Some(value) => {
            serde_json::from_value(value.clone()).map_err(PipelineError::InvalidSubject)
        }
    }
}

// ── Policy stage ────────────────────────────────────────────────────────

/// Derives operation policy from each record's own security markings.
///
/// A record marked `{"role": ["admin"]}` thereby demands that the caller
/// hold `admin` before the record may be created, replaced, or deleted.
#[derive(Debug, Default)]
pub struct MetacardMarkingsPolicyPlugin;

#[async_trait]
impl PolicyPlugin for MetacardMarkingsPolicyPlugin {
    fn name(&self) -> &str {
        "metacard-markings-policy"
    }

    async fn policy_for_metacard(
        &self,
        metacard: &Metacard,
        _properties: &Properties,
    ) -> Result<PolicyResponse, PluginError> {
        Ok(match metacard.security() {
            Some(markings) => {
                PolicyResponse::operation(CollectionPermission::from_markings(markings))
            }
            None => PolicyResponse::default(),
        })
    }
}

// ── Access stage ────────────────────────────────────────────────────────

/// Requires a subject on every request and enforces the merged operation
/// policy derived by the policy stage.
#[derive(Debug, Default)]
pub struct SubjectAccessPlugin;

impl SubjectAccessPlugin {
    fn enforce(&self, operation: &str, properties: &Properties) -> Result<(), PluginError> {
        let subject =
            subject_from_properties(properties).map_err(|e| PluginError::stop(e.to_string()))?;
        if let Some(policy) = operation_policy(properties)?
            && !subject.is_permitted(&policy)
        {
            return Err(PluginError::stop(format!(
                "subject '{}' lacks the markings required to {operation}",
                subject.principal
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessPlugin for SubjectAccessPlugin {
    fn name(&self) -> &str {
        "subject-access"
    }

    async fn process_create(&self, request: CreateRequest) -> Result<CreateRequest, PluginError> {
        self.enforce("create", &request.properties)?;
        Ok(request)
    }

    async fn process_update(&self, request: UpdateRequest) -> Result<UpdateRequest, PluginError> {
        self.enforce("update", &request.properties)?;
        Ok(request)
    }

    async fn process_delete(&self, request: DeleteRequest) -> Result<DeleteRequest, PluginError> {
        self.enforce("delete", &request.properties)?;
        Ok(request)
    }

    async fn process_query(&self, request: QueryRequest) -> Result<QueryRequest, PluginError> {
        self.enforce("query", &request.properties)?;
        Ok(request)
    }
}

// ── Post-query stage ────────────────────────────────────────────────────

/// Drops query results whose markings the caller does not satisfy.
///
/// Denial of a single result is not an error: the result is removed, the
/// filtered count is incremented, and the chain continues for the results
/// that remain. The aggregate count lands in the response property bag
/// under [`FILTERED_COUNT_PROPERTY`] and is logged once per response.
///
/// [`FILTERED_COUNT_PROPERTY`]: meridian_types::operation::FILTERED_COUNT_PROPERTY
#[derive(Debug, Default)]
pub struct MarkingsFilterPlugin {
    config: PolicyConfig,
}

impl MarkingsFilterPlugin {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    fn permits(&self, subject: &Subject, metacard: &Metacard) -> bool {
        match metacard.security() {
            // Open policy: unmarked records are visible to any
            // authenticated caller unless configured otherwise.
            None => self.config.permit_unmarked,
            Some(markings) => {
                subject.is_permitted(&CollectionPermission::from_markings(markings))
            }
        }
    }
}

#[async_trait]
impl PostQueryPlugin for MarkingsFilterPlugin {
    fn name(&self) -> &str {
        "markings-filter"
    }

    async fn process(&self, mut response: QueryResponse) -> Result<QueryResponse, PluginError> {
        let subject = subject_from_properties(&response.properties)
            .map_err(|e| PluginError::stop(e.to_string()))?;

        let total = response.results.len();
        let mut filtered = 0u64;
        response.results.retain(|result| {
            let permitted = self.permits(&subject, &result.metacard);
            if !permitted {
                filtered += 1;
                debug!(
                    metacard_id = result.metacard.id(),
                    principal = %subject.principal,
                    "result filtered: subject does not satisfy markings"
                );
            }
            permitted
        });

        if filtered > 0 {
            info!(
                filtered,
                total,
                principal = %subject.principal,
                "query results filtered by markings"
            );
        }
        let already = response.filtered_count();
        response.set_filtered_count(already + filtered);
        Ok(response)
    }
}
