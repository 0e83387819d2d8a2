//! # meridian-types
//!
//! Core type definitions for the Meridian federated catalog framework.
//!
//! This crate is the foundation of the dependency graph -- the framework
//! crates depend on it and it depends on nothing but serde and time/id
//! primitives. It contains:
//!
//! - **[`attribute`]** -- typed attribute values and the schema kinds that
//!   describe them
//! - **[`metacard`]** -- [`Metacard`], the normalized catalog record
//! - **[`operation`]** -- request/response carriers for catalog operations
//! - **[`security`]** -- markings, permissions, and the caller [`Subject`]
//! - **[`error`]** -- [`CatalogError`] and the crate [`Result`] alias
//!
//! [`Metacard`]: metacard::Metacard
//! [`Subject`]: security::Subject
//! [`CatalogError`]: error::CatalogError
//! [`Result`]: error::Result

pub mod attribute;
pub mod error;
pub mod metacard;
pub mod operation;
pub mod security;

pub use attribute::{AttributeKind, AttributeValue, MetacardType};
pub use error::{CatalogError, Result};
pub use metacard::Metacard;
pub use operation::{
    CreateRequest, CreateResponse, DeleteRequest, DeleteResponse, Filter, Properties,
    QueryRequest, QueryResponse, QueryResult, Resource, ResourceRequest, ResourceResponse,
    Update, UpdateRequest, UpdateResponse, FILTERED_COUNT_PROPERTY,
};
pub use security::{
    AttributePermission, CollectionPermission, SecurityMarkings, Subject, SUBJECT_PROPERTY,
};
