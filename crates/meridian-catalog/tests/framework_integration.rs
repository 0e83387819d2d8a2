//! End-to-end integration tests for the catalog framework facade.
//!
//! Exercises the public API from an external-crate perspective with an
//! in-memory source and a counting retriever: ingest through the plugin
//! chains, query with markings-based filtering, and resource retrieval
//! through the singleflight cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use meridian_catalog::framework::{CatalogFramework, FrameworkError};
use meridian_catalog::pipeline::{PipelineError, PluginPipeline};
use meridian_catalog::policy::{
    MarkingsFilterPlugin, MetacardMarkingsPolicyPlugin, SubjectAccessPlugin,
};
use meridian_catalog::source::{
    CatalogSource, ResourceRetriever, RetrieveError, SourceError,
};
use meridian_types::operation::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, Filter, QueryRequest,
    QueryResponse, QueryResult, Resource, ResourceRequest, UpdateRequest, UpdateResponse,
};
use meridian_types::security::SecurityMarkings;
use meridian_types::{AttributeValue, Metacard, MetacardType, Subject};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meridian_catalog=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// ── Test collaborators ─────────────────────────────────────────────

/// A source holding records in a map, answering `Like` title queries
/// and `Equals` comparisons.
#[derive(Default)]
struct MemorySource {
    records: Mutex<HashMap<String, Metacard>>,
}

impl MemorySource {
    fn matches(filter: &Filter, metacard: &Metacard) -> bool {
        match filter {
            Filter::Equals { attribute, value } => {
                metacard.attribute(attribute) == Some(value)
            }
            Filter::Like { attribute, pattern } => {
                let text = metacard
                    .attribute(attribute)
                    .and_then(AttributeValue::as_text)
                    .unwrap_or_default();
                pattern == "*" || text.contains(pattern.trim_matches('*'))
            }
            Filter::And(filters) => filters.iter().all(|f| Self::matches(f, metacard)),
            Filter::Or(filters) => filters.iter().any(|f| Self::matches(f, metacard)),
            Filter::Not(inner) => !Self::matches(inner, metacard),
        }
    }
}

#[async_trait]
impl CatalogSource for MemorySource {
    fn id(&self) -> &str {
        "memory"
    }

    async fn create(&self, request: CreateRequest) -> Result<CreateResponse, SourceError> {
        let mut records = self.records.lock().unwrap();
        for metacard in &request.metacards {
            records.insert(metacard.id().to_string(), metacard.clone());
        }
        Ok(CreateResponse {
            created: request.metacards,
            properties: request.properties,
        })
    }

    async fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, SourceError> {
        let mut records = self.records.lock().unwrap();
        let mut updated = Vec::with_capacity(request.updates.len());
        for update in request.updates {
            if !records.contains_key(&update.id) {
                return Err(SourceError::Ingest(format!("no record '{}'", update.id)));
            }
            records.insert(update.id, update.metacard.clone());
            updated.push(update.metacard);
        }
        Ok(UpdateResponse {
            updated,
            properties: request.properties,
        })
    }

    async fn delete(&self, request: DeleteRequest) -> Result<DeleteResponse, SourceError> {
        let mut records = self.records.lock().unwrap();
        let deleted = request
            .ids
            .iter()
            .filter_map(|id| records.remove(id))
            .collect();
        Ok(DeleteResponse {
            deleted,
            properties: request.properties,
        })
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryResponse, SourceError> {
        let records = self.records.lock().unwrap();
        let mut results: Vec<QueryResult> = records
            .values()
            .filter(|metacard| Self::matches(&request.filter, metacard))
            .map(|metacard| QueryResult::new(metacard.clone()))
            .collect();
        // Stable order for assertions.
        results.sort_by(|a, b| a.metacard.id().cmp(b.metacard.id()));
        let hits = results.len() as u64;
        Ok(QueryResponse {
            results,
            hits,
            properties: request.properties,
        })
    }
}

/// Retriever that serves fixed bytes and counts how often it is asked.
struct CountingRetriever {
    calls: AtomicUsize,
}

impl CountingRetriever {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ResourceRetriever for CountingRetriever {
    async fn retrieve(
        &self,
        metacard: &Metacard,
        request: &ResourceRequest,
    ) -> Result<Resource, RetrieveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tag = match &request.qualifier {
            Some(q) => format!("{}:{q}", metacard.id()),
            None => metacard.id().to_string(),
        };
        Ok(Resource::new(
            format!("{tag}.bin"),
            "application/octet-stream",
            tag.into_bytes(),
        ))
    }
}

// ── Fixtures ───────────────────────────────────────────────────────

fn secured_framework(retriever: Arc<CountingRetriever>) -> CatalogFramework {
    let pipeline = PluginPipeline::builder()
        .policy(Arc::new(MetacardMarkingsPolicyPlugin))
        .access(Arc::new(SubjectAccessPlugin))
        .post_query(Arc::new(MarkingsFilterPlugin::default()))
        .build();
    CatalogFramework::builder(Arc::new(MemorySource::default()), retriever)
        .pipeline(pipeline)
        .build()
}

fn titled(title: &str) -> Metacard {
    Metacard::new(MetacardType::basic())
        .with_attribute(Metacard::TITLE, title)
        .unwrap()
}

fn admin_marked(title: &str) -> Metacard {
    let mut card = titled(title);
    card.set_security(SecurityMarkings::default().with("role", ["admin"]));
    card
}

fn admin() -> Subject {
    Subject::new("alice").grant("role", ["admin"])
}

fn viewer() -> Subject {
    Subject::new("bob").grant("role", ["viewer"])
}

fn create_request(metacards: Vec<Metacard>, subject: &Subject) -> CreateRequest {
    let mut request = CreateRequest::new(metacards);
    subject.attach_to(&mut request.properties).unwrap();
    request
}

fn query_all(subject: &Subject) -> QueryRequest {
    let mut request = QueryRequest::new(Filter::Like {
        attribute: Metacard::TITLE.into(),
        pattern: "*".into(),
    });
    subject.attach_to(&mut request.properties).unwrap();
    request
}

// ── Ingest + query flow ────────────────────────────────────────────

#[tokio::test]
async fn query_filters_results_the_caller_may_not_see() {
    init_tracing();
    let framework = secured_framework(CountingRetriever::new());
    let records = vec![
        titled("coastal survey"),
        admin_marked("restricted survey"),
        titled("harbor depths"),
    ];
    framework
        .create(create_request(records, &admin()))
        .await
        .expect("admin ingest must succeed");

    let response = framework.query(query_all(&viewer())).await.unwrap();
    assert_eq!(
        response.results.len(),
        2,
        "the admin-marked record must be filtered out"
    );
    assert_eq!(response.filtered_count(), 1);
    assert!(response
        .results
        .iter()
        .all(|r| r.metacard.security().is_none()));
}

#[tokio::test]
async fn admin_caller_sees_every_result() {
    let framework = secured_framework(CountingRetriever::new());
    framework
        .create(create_request(
            vec![titled("open"), admin_marked("closed")],
            &admin(),
        ))
        .await
        .unwrap();

    let response = framework.query(query_all(&admin())).await.unwrap();
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.filtered_count(), 0);
}

#[tokio::test]
async fn ingest_without_a_subject_is_rejected_before_the_source() {
    init_tracing();
    let framework = secured_framework(CountingRetriever::new());
    let request = CreateRequest::new(vec![titled("orphan")]);

    let err = framework.create(request).await.unwrap_err();
    match err {
        FrameworkError::Pipeline(PipelineError::Stopped { plugin, reason }) => {
            assert_eq!(plugin, "subject-access");
            assert!(reason.contains("no security subject"), "got: {reason}");
        }
        other => panic!("expected a pipeline stop, got {other:?}"),
    }

    // Nothing was committed: an admin query finds an empty catalog.
    let response = framework.query(query_all(&admin())).await.unwrap();
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn ingest_of_records_beyond_the_callers_markings_is_stopped() {
    let framework = secured_framework(CountingRetriever::new());
    let err = framework
        .create(create_request(vec![admin_marked("too hot")], &viewer()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FrameworkError::Pipeline(PipelineError::Stopped { .. })
    ));
}

#[tokio::test]
async fn query_without_a_subject_fails_up_front() {
    let framework = secured_framework(CountingRetriever::new());
    let request = QueryRequest::new(Filter::Like {
        attribute: Metacard::TITLE.into(),
        pattern: "*".into(),
    });
    let err = framework.query(request).await.unwrap_err();
    assert!(matches!(
        err,
        FrameworkError::Pipeline(PipelineError::MissingSubject)
    ));
}

#[tokio::test]
async fn update_and_delete_flow_through_the_chains() {
    let framework = secured_framework(CountingRetriever::new());
    let record = titled("before");
    let id = record.id().to_string();
    framework
        .create(create_request(vec![record], &admin()))
        .await
        .unwrap();

    let mut replacement = titled("after");
    replacement.set_attribute("revision", 2i64).unwrap();
    let mut update = UpdateRequest::new(vec![meridian_types::operation::Update {
        id: id.clone(),
        metacard: replacement,
    }]);
    admin().attach_to(&mut update.properties).unwrap();
    let updated = framework.update(update).await.unwrap();
    assert_eq!(updated.updated.len(), 1);
    assert_eq!(updated.updated[0].title(), Some("after"));

    let mut delete = DeleteRequest::new(vec![id]);
    admin().attach_to(&mut delete.properties).unwrap();
    let deleted = framework.delete(delete).await.unwrap();
    assert_eq!(deleted.deleted.len(), 1);
}

// ── Resource retrieval + cache ─────────────────────────────────────

#[tokio::test]
async fn repeated_resource_requests_fetch_once() {
    init_tracing();
    let retriever = CountingRetriever::new();
    let framework = secured_framework(retriever.clone());
    let record = titled("with resource");

    let request = ResourceRequest::new(record.id());
    let first = framework.resource(&record, &request).await.unwrap();
    let second = framework.resource(&record, &request).await.unwrap();

    assert_eq!(first.resource.data, second.resource.data);
    assert_eq!(retriever.calls.load(Ordering::SeqCst), 1, "second call must hit the cache");
    assert!(framework.cache().contains(&record).await);
}

#[tokio::test]
async fn qualifiers_address_distinct_cache_entries() {
    let retriever = CountingRetriever::new();
    let framework = secured_framework(retriever.clone());
    let record = titled("derived");

    let default = ResourceRequest::new(record.id());
    let thumb = ResourceRequest::new(record.id()).with_qualifier("thumbnail");

    let full = framework.resource(&record, &default).await.unwrap();
    let derived = framework.resource(&record, &thumb).await.unwrap();

    assert_ne!(full.resource.data, derived.resource.data);
    assert_eq!(retriever.calls.load(Ordering::SeqCst), 2);
    assert!(framework.cache().contains_for_request(&record, &thumb).await);
}

#[tokio::test]
async fn zero_plugin_pipeline_is_transparent() {
    let framework = CatalogFramework::builder(
        Arc::new(MemorySource::default()),
        CountingRetriever::new(),
    )
    .build();

    let record = titled("plain");
    let request = create_request(vec![record.clone()], &viewer());
    let expected_properties = request.properties.clone();

    let response = framework.create(request).await.unwrap();
    assert_eq!(response.created, vec![record]);
    assert_eq!(response.properties, expected_properties);

    let query_response = framework.query(query_all(&viewer())).await.unwrap();
    assert_eq!(query_response.results.len(), 1);
    assert_eq!(query_response.filtered_count(), 0);
}
