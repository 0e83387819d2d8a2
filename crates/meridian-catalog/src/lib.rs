//! # meridian-catalog
//!
//! The Meridian catalog framework core: the plugin chain executor that
//! pre/post-processes catalog operations, the markings-based access
//! filter, and the resource cache that guards concurrent fetches.
//!
//! - **[`plugin`]** -- capability traits ([`PreIngestPlugin`],
//!   [`PolicyPlugin`], [`AccessPlugin`], [`PostQueryPlugin`],
//!   [`PostIngestPlugin`]) and [`PluginError`]
//! - **[`pipeline`]** -- [`PluginPipeline`], the ordered chain executor
//! - **[`policy`]** -- subject extraction and the built-in policy plugins
//! - **[`cache`]** -- [`ResourceCache`] with singleflight population
//! - **[`source`]** -- collaborator traits for sources and resource
//!   retrieval
//! - **[`framework`]** -- the [`CatalogFramework`] facade wiring it all
//!   together
//! - **[`config`]** -- runtime configuration
//!
//! Plugins are constructed once at composition time and handed to the
//! pipeline as ordered lists; there is no registry lookup at call time,
//! and registration order is execution order.
//!
//! [`PreIngestPlugin`]: plugin::PreIngestPlugin
//! [`PolicyPlugin`]: plugin::PolicyPlugin
//! [`AccessPlugin`]: plugin::AccessPlugin
//! [`PostQueryPlugin`]: plugin::PostQueryPlugin
//! [`PostIngestPlugin`]: plugin::PostIngestPlugin
//! [`PluginError`]: plugin::PluginError
//! [`PluginPipeline`]: pipeline::PluginPipeline
//! [`ResourceCache`]: cache::ResourceCache
//! [`CatalogFramework`]: framework::CatalogFramework

pub mod cache;
pub mod config;
pub mod framework;
pub mod pipeline;
pub mod plugin;
pub mod policy;
pub mod source;

pub use cache::{CacheError, CacheKey, ResourceCache};
pub use config::{CacheConfig, FrameworkConfig, PolicyConfig};
pub use framework::{CatalogFramework, CatalogFrameworkBuilder, FrameworkError};
pub use pipeline::{PipelineError, PluginPipeline, PluginPipelineBuilder};
pub use plugin::{
    AccessPlugin, PluginError, PolicyPlugin, PolicyResponse, PostIngestPlugin,
    PostQueryPlugin, PreIngestPlugin,
};
pub use policy::{MarkingsFilterPlugin, MetacardMarkingsPolicyPlugin, SubjectAccessPlugin};
pub use source::{CatalogSource, ResourceRetriever, RetrieveError, SourceError};
