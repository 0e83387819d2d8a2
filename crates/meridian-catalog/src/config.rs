//! Runtime configuration.
//!
//! Deployments embed the framework with [`FrameworkConfig::default`] or
//! load overrides from a JSON file via [`FrameworkConfig::from_path`].
//! Every field defaults, so a partial file only overrides what it names.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use meridian_types::error::CatalogError;

/// Access-policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Whether records without security markings are visible to any
    /// authenticated caller. Defaults to open; flip for deployments
    /// whose threat model treats missing markings as a denial.
    #[serde(default = "default_true")]
    pub permit_unmarked: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            permit_unmarked: true,
        }
    }
}

/// Resource-cache knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When false the framework bypasses the cache entirely and every
    /// resource request goes to the retrieval channel.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Top-level framework configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Access-policy configuration.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Resource-cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl FrameworkConfig {
    /// Load configuration from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), "framework config loaded");
        Ok(config)
    }
}

fn default_true() -> bool {
    true
}
