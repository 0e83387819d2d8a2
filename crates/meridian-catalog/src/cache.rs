//! The resource cache.
//!
//! [`ResourceCache`] is a content-addressable store of fully materialized
//! [`Resource`] payloads keyed by [`CacheKey`] (metacard id plus the
//! optional derived-resource qualifier). It is the only state shared
//! across concurrent requests, and it guards that state two ways:
//!
//! - **Atomic visibility.** Entries appear in the store only when their
//!   payload is complete. `get` and `contains` during an in-flight
//!   populate report absence (`None` / `false`); there is no observable
//!   window in which a partially populated entry exists. Callers that
//!   would rather wait for the in-flight fetch join it through
//!   [`ResourceCache::get_or_fetch`].
//! - **Singleflight population.** At most one fetch is in flight per key.
//!   Concurrent `get_or_fetch` calls for the same key share one fetch
//!   future and all receive its result. A failed fetch clears the
//!   in-flight slot for its key only -- unrelated keys and stored entries
//!   are never affected, and the next caller starts a fresh fetch.
//!
//! Entries are immutable once stored and the store is append-only;
//! eviction is the embedding application's concern, not the cache's.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use meridian_types::operation::{Resource, ResourceRequest};
use meridian_types::Metacard;

/// Errors surfaced by cache population.
///
/// Cloneable so every caller joined on one fetch receives the failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The fetch backing a populate failed. Isolated to its key.
    #[error("resource fetch failed for {key}: {reason}")]
    FetchFailed {
        /// Rendered cache key the fetch was for.
        key: String,
        /// Underlying failure, stringified.
        reason: String,
    },
}

// ── CacheKey ────────────────────────────────────────────────────────────

/// Composite identifier addressing one cached resource: the metacard id
/// plus the request's derived-resource qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    metacard_id: String,
    qualifier: Option<String>,
}

impl CacheKey {
    pub fn new(metacard_id: impl Into<String>, qualifier: Option<String>) -> Self {
        Self {
            metacard_id: metacard_id.into(),
            qualifier,
        }
    }

    /// Key for a record's default resource.
    pub fn from_metacard(metacard: &Metacard) -> Self {
        Self::new(metacard.id(), None)
    }

    /// Key for the resource a specific request asks for. The metacard is
    /// authoritative for identity; the request contributes only its
    /// discriminator.
    pub fn for_request(metacard: &Metacard, request: &ResourceRequest) -> Self {
        Self::new(metacard.id(), request.qualifier.clone())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}#{q}", self.metacard_id),
            None => write!(f, "{}", self.metacard_id),
        }
    }
}

// ── ResourceCache ───────────────────────────────────────────────────────

type FetchResult = Result<Arc<Resource>, CacheError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct CacheInner {
    entries: HashMap<CacheKey, Arc<Resource>>,
    inflight: HashMap<CacheKey, SharedFetch>,
}

/// Concurrent, append-only resource store with singleflight population.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                inflight: HashMap::new(),
            })),
        }
    }

    /// The record's default cached resource, if populated.
    pub async fn get(&self, metacard: &Metacard) -> Option<Arc<Resource>> {
        self.get_by_key(&CacheKey::from_metacard(metacard)).await
    }

    /// The cached resource matching a specific request discriminator.
    pub async fn get_for_request(
        &self,
        metacard: &Metacard,
        request: &ResourceRequest,
    ) -> Option<Arc<Resource>> {
        self.get_by_key(&CacheKey::for_request(metacard, request)).await
    }

    /// Lookup by raw key.
    pub async fn get_by_key(&self, key: &CacheKey) -> Option<Arc<Resource>> {
        let inner = self.inner.lock().await;
        let hit = inner.entries.get(key).cloned();
        debug!(%key, hit = hit.is_some(), "cache lookup");
        hit
    }

    /// Whether the record's default resource is populated. Never true for
    /// an in-flight populate.
    pub async fn contains(&self, metacard: &Metacard) -> bool {
        self.contains_key(&CacheKey::from_metacard(metacard)).await
    }

    /// Whether the resource a specific request asks for is populated.
    pub async fn contains_for_request(
        &self,
        metacard: &Metacard,
        request: &ResourceRequest,
    ) -> bool {
        self.contains_key(&CacheKey::for_request(metacard, request)).await
    }

    /// Existence check by raw key, without materializing the resource.
    pub async fn contains_key(&self, key: &CacheKey) -> bool {
        self.inner.lock().await.entries.contains_key(key)
    }

    /// Number of populated entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Populate an entry from the ingest flow.
    ///
    /// Append-only: if the key is already populated the stored entry wins
    /// and is returned unchanged, since entries are immutable once
    /// stored.
    pub async fn put(&self, key: CacheKey, resource: Resource) -> Arc<Resource> {
        let mut inner = self.inner.lock().await;
        match inner.entries.get(&key) {
            Some(existing) => {
                debug!(%key, "cache put ignored: entry already populated");
                existing.clone()
            }
            None => {
                debug!(%key, size = resource.len(), "cache populated");
                let stored = Arc::new(resource);
                inner.entries.insert(key, stored.clone());
                stored
            }
        }
    }

    /// Return the cached resource for `key`, fetching it at most once.
    ///
    /// On a miss the `fetch` closure produces the population future; if
    /// another fetch for the same key is already in flight, `fetch` is
    /// never called and this caller joins the in-flight future instead.
    /// All joined callers receive the same result, success or failure.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> FetchResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Resource, CacheError>> + Send + 'static,
    {
        let shared = {
            let mut inner = self.inner.lock().await;
            if let Some(resource) = inner.entries.get(&key) {
                debug!(%key, "cache hit");
                return Ok(resource.clone());
            }
            if let Some(inflight) = inner.inflight.get(&key) {
                debug!(%key, "joining in-flight fetch");
                inflight.clone()
            } else {
                debug!(%key, "starting resource fetch");
                let shared = Self::populate_future(self.inner.clone(), key.clone(), fetch());
                inner.inflight.insert(key, shared.clone());
                shared
            }
        };
        shared.await
    }

    /// Wrap a fetch future so that completion atomically publishes the
    /// entry (or clears the in-flight slot on failure) before any joined
    /// caller observes the result.
    fn populate_future<Fut>(
        inner: Arc<Mutex<CacheInner>>,
        key: CacheKey,
        fetch: Fut,
    ) -> SharedFetch
    where
        Fut: Future<Output = Result<Resource, CacheError>> + Send + 'static,
    {
        async move {
            let outcome = fetch.await;
            let mut inner = inner.lock().await;
            inner.inflight.remove(&key);
            match outcome {
                Ok(resource) => {
                    debug!(%key, size = resource.len(), "fetch completed, entry published");
                    let stored = Arc::new(resource);
                    // First writer wins; entries are immutable once stored.
                    Ok(inner
                        .entries
                        .entry(key)
                        .or_insert_with(|| stored.clone())
                        .clone())
                }
                Err(e) => {
                    warn!(%key, error = %e, "resource fetch failed");
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }
}
