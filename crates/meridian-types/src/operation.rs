//! Request/response carriers for catalog operations.
//!
//! Every request carries a [`Properties`] bag used by plugins as
//! side-channel context (the authenticated subject, client info, merged
//! operation policy). Responses carry the same bag back through
//! post-processing. The bag maps well-known string keys to JSON values;
//! the constants for those keys live beside the types that consume them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeValue;
use crate::metacard::Metacard;

/// The property bag attached to every request and response.
pub type Properties = HashMap<String, serde_json::Value>;

/// Response property recording how many results access filtering removed.
pub const FILTERED_COUNT_PROPERTY: &str = "query.filtered-count";

// ── Ingest requests ─────────────────────────────────────────────────────

/// Request to create one or more records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Records to create.
    pub metacards: Vec<Metacard>,
    /// Side-channel context for plugins.
    #[serde(default)]
    pub properties: Properties,
}

impl CreateRequest {
    pub fn new(metacards: Vec<Metacard>) -> Self {
        Self {
            metacards,
            properties: Properties::new(),
        }
    }
}

/// One update: the id of the record to replace and its replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Identity of the record being replaced.
    pub id: String,
    /// The replacement record.
    pub metacard: Metacard,
}

/// Request to update existing records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Updates to apply, in order.
    pub updates: Vec<Update>,
    /// Side-channel context for plugins.
    #[serde(default)]
    pub properties: Properties,
}

impl UpdateRequest {
    pub fn new(updates: Vec<Update>) -> Self {
        Self {
            updates,
            properties: Properties::new(),
        }
    }
}

/// Request to delete records by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Ids of the records to delete.
    pub ids: Vec<String>,
    /// Side-channel context for plugins.
    #[serde(default)]
    pub properties: Properties,
}

impl DeleteRequest {
    pub fn new(ids: Vec<String>) -> Self {
        Self {
            ids,
            properties: Properties::new(),
        }
    }
}

// ── Query ───────────────────────────────────────────────────────────────

/// The query predicate tree, carried opaquely to the query source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Attribute equals the given value.
    Equals {
        attribute: String,
        value: AttributeValue,
    },
    /// Attribute text matches a pattern (`*` wildcard, source-interpreted).
    Like { attribute: String, pattern: String },
    /// All sub-filters must match.
    And(Vec<Filter>),
    /// Any sub-filter may match.
    Or(Vec<Filter>),
    /// Negation.
    Not(Box<Filter>),
}

fn default_page_size() -> usize {
    50
}

/// Request to query a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The predicate.
    pub filter: Filter,
    /// Zero-based index of the first result to return.
    #[serde(default)]
    pub start_index: usize,
    /// Maximum number of results to return.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Side-channel context for plugins.
    #[serde(default)]
    pub properties: Properties,
}

impl QueryRequest {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            start_index: 0,
            page_size: default_page_size(),
            properties: Properties::new(),
        }
    }
}

/// One query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// The matching record.
    pub metacard: Metacard,
    /// Source-assigned relevance score.
    #[serde(default)]
    pub relevance: f64,
}

impl QueryResult {
    pub fn new(metacard: Metacard) -> Self {
        Self {
            metacard,
            relevance: 0.0,
        }
    }
}

/// Ordered query results plus the propagated property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Results in source order.
    pub results: Vec<QueryResult>,
    /// Source-reported total matches (may exceed the page).
    pub hits: u64,
    /// Side-channel context, propagated from the request.
    #[serde(default)]
    pub properties: Properties,
}

impl QueryResponse {
    pub fn new(results: Vec<QueryResult>, hits: u64) -> Self {
        Self {
            results,
            hits,
            properties: Properties::new(),
        }
    }

    /// Number of results removed by access filtering, if recorded.
    pub fn filtered_count(&self) -> u64 {
        self.properties
            .get(FILTERED_COUNT_PROPERTY)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0)
    }

    /// Record the filtered-result count under
    /// [`FILTERED_COUNT_PROPERTY`].
    pub fn set_filtered_count(&mut self, count: u64) {
        self.properties
            .insert(FILTERED_COUNT_PROPERTY.to_string(), count.into());
    }
}

// ── Ingest responses ────────────────────────────────────────────────────

/// Outcome of a create operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
    /// Records as persisted by the source.
    pub created: Vec<Metacard>,
    /// Side-channel context, propagated from the request.
    #[serde(default)]
    pub properties: Properties,
}

/// Outcome of an update operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    /// Records after the update.
    pub updated: Vec<Metacard>,
    /// Side-channel context, propagated from the request.
    #[serde(default)]
    pub properties: Properties,
}

/// Outcome of a delete operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Records as they existed before deletion.
    pub deleted: Vec<Metacard>,
    /// Side-channel context, propagated from the request.
    #[serde(default)]
    pub properties: Properties,
}

// ── Resources ───────────────────────────────────────────────────────────

/// Request for the resource backing a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Identity of the record whose resource is wanted.
    pub metacard_id: String,
    /// Derived-resource discriminator (e.g. `"thumbnail"`). `None` asks
    /// for the default resource.
    #[serde(default)]
    pub qualifier: Option<String>,
    /// Side-channel context for plugins.
    #[serde(default)]
    pub properties: Properties,
}

impl ResourceRequest {
    pub fn new(metacard_id: impl Into<String>) -> Self {
        Self {
            metacard_id: metacard_id.into(),
            qualifier: None,
            properties: Properties::new(),
        }
    }

    /// Ask for a derived resource, builder style.
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }
}

/// A fully materialized resource payload.
///
/// Payloads are complete by construction -- a `Resource` never represents
/// a partial transfer, which is what lets the cache store and hand them
/// out without a truncation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// File or display name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// The payload bytes.
    pub data: Vec<u8>,
}

impl Resource {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Outcome of a resource retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceResponse {
    /// The retrieved resource.
    pub resource: Resource,
    /// Side-channel context, propagated from the request.
    #[serde(default)]
    pub properties: Properties,
}
