//! Markings, permissions, and the caller [`Subject`].
//!
//! Access decisions are an explicit capability-set test: a metacard's
//! security markings become a [`CollectionPermission`] claim, and the
//! subject's granted attribute sets either imply that claim or they do
//! not. There is no ambient security context -- the subject travels in the
//! request property bag under [`SUBJECT_PROPERTY`] and is passed
//! explicitly to every check.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::operation::Properties;

/// Well-known property-bag key under which the authenticated subject is
/// stored by the security subject provider before the pipeline runs.
pub const SUBJECT_PROPERTY: &str = "security.subject";

// ── Markings ────────────────────────────────────────────────────────────

/// Security markings: classification key to the set of marking values.
///
/// This is the value of the metacard `security` attribute, e.g.
/// `{"role": {"admin"}, "releasable-to": {"alliance"}}`. Ordered maps and
/// sets keep serialization and comparison deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityMarkings(pub BTreeMap<String, BTreeSet<String>>);

impl SecurityMarkings {
    /// Add values under a classification key, builder style.
    pub fn with<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// True when no marking is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over keys and their value sets.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ── Permissions ─────────────────────────────────────────────────────────

/// One required marking: a key plus the values that would satisfy it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePermission {
    /// Classification key (e.g. `"role"`).
    pub key: String,
    /// Values of which the subject must hold at least one.
    pub values: BTreeSet<String>,
}

/// The permission object built from a metacard's markings (or from merged
/// operation policy) and tested against a [`Subject`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPermission {
    /// Every entry must be satisfied for the permission to be implied.
    pub permissions: Vec<AttributePermission>,
}

impl CollectionPermission {
    /// Build the claim a set of markings demands.
    pub fn from_markings(markings: &SecurityMarkings) -> Self {
        Self {
            permissions: markings
                .iter()
                .map(|(key, values)| AttributePermission {
                    key: key.to_string(),
                    values: values.clone(),
                })
                .collect(),
        }
    }

    /// True when nothing is required.
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Merge another permission's requirements into this one.
    pub fn merge(&mut self, other: &CollectionPermission) {
        for incoming in &other.permissions {
            match self.permissions.iter_mut().find(|p| p.key == incoming.key) {
                Some(existing) => existing.values.extend(incoming.values.iter().cloned()),
                None => self.permissions.push(incoming.clone()),
            }
        }
    }
}

// ── Subject ─────────────────────────────────────────────────────────────

/// The authenticated caller: a principal name plus granted attribute sets
/// mirroring the markings shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Principal identifier (user name, certificate CN, token subject).
    pub principal: String,
    /// Granted attributes: classification key to held values.
    #[serde(default)]
    pub granted: BTreeMap<String, BTreeSet<String>>,
}

impl Subject {
    /// A subject with no granted attributes.
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            granted: BTreeMap::new(),
        }
    }

    /// Grant values under a classification key, builder style.
    pub fn grant<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Test whether this subject satisfies `permission`.
    ///
    /// Every required key must have a non-empty intersection between its
    /// required values and the values granted to the subject under that
    /// key. A key requiring no values is trivially satisfied; a key the
    /// subject holds no grants for is not.
    pub fn is_permitted(&self, permission: &CollectionPermission) -> bool {
        permission.permissions.iter().all(|required| {
            required.values.is_empty()
                || self
                    .granted
                    .get(&required.key)
                    .is_some_and(|held| !held.is_disjoint(&required.values))
        })
    }

    /// Serialize this subject into a property bag under
    /// [`SUBJECT_PROPERTY`] -- the hand-off point for subject providers.
    pub fn attach_to(&self, properties: &mut Properties) -> Result<(), serde_json::Error> {
        properties.insert(SUBJECT_PROPERTY.to_string(), serde_json::to_value(self)?);
        Ok(())
    }
}
