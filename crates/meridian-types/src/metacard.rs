//! [`Metacard`] -- the normalized catalog record.
//!
//! A metacard is one indexed item: a unique id, a [`MetacardType`] naming
//! its attribute schema, and the attribute map itself. Identity is
//! immutable; attributes stay mutable until the record is handed to a
//! source for persistence.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribute::{AttributeValue, MetacardType};
use crate::error::CatalogError;
use crate::security::SecurityMarkings;

/// A normalized catalog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metacard {
    id: String,
    metacard_type: MetacardType,
    attributes: HashMap<String, AttributeValue>,
}

impl Metacard {
    /// Record title.
    pub const TITLE: &'static str = "title";
    /// Creation timestamp.
    pub const CREATED: &'static str = "created";
    /// Last-modified timestamp.
    pub const MODIFIED: &'static str = "modified";
    /// MIME content type of the backing resource.
    pub const CONTENT_TYPE: &'static str = "content-type";
    /// Footprint geometry (WKT).
    pub const LOCATION: &'static str = "location";
    /// Size of the backing resource in bytes.
    pub const RESOURCE_SIZE: &'static str = "resource-size";
    /// Security markings governing who may see this record.
    pub const SECURITY: &'static str = "security";

    /// A new record with a freshly generated id.
    pub fn new(metacard_type: MetacardType) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), metacard_type)
    }

    /// A new record with a caller-supplied id (federated sources carry
    /// their own identifiers).
    pub fn with_id(id: impl Into<String>, metacard_type: MetacardType) -> Self {
        Self {
            id: id.into(),
            metacard_type,
            attributes: HashMap::new(),
        }
    }

    /// The record's immutable identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The schema this record claims to follow.
    pub fn metacard_type(&self) -> &MetacardType {
        &self.metacard_type
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Set an attribute.
    ///
    /// Names the schema declares are checked against their declared kind;
    /// undeclared names are accepted as-is (sources inject attributes the
    /// core schema does not know about).
    pub fn set_attribute(
        &mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<(), CatalogError> {
        let name = name.into();
        let value = value.into();
        if let Some(expected) = self.metacard_type.kind_of(&name)
            && expected != value.kind()
        {
            return Err(CatalogError::AttributeType {
                attribute: name,
                expected,
            });
        }
        self.attributes.insert(name, value);
        Ok(())
    }

    /// Remove an attribute, returning the previous value if any.
    pub fn remove_attribute(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    /// Builder-style [`set_attribute`](Self::set_attribute).
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<Self, CatalogError> {
        self.set_attribute(name, value)?;
        Ok(self)
    }

    /// The record title, when present and textual.
    pub fn title(&self) -> Option<&str> {
        self.attribute(Self::TITLE).and_then(AttributeValue::as_text)
    }

    /// Typed view of the security markings attribute.
    pub fn security(&self) -> Option<&SecurityMarkings> {
        self.attribute(Self::SECURITY)
            .and_then(AttributeValue::as_markings)
    }

    /// Replace the security markings.
    pub fn set_security(&mut self, markings: SecurityMarkings) {
        self.attributes
            .insert(Self::SECURITY.to_string(), AttributeValue::Markings(markings));
    }

    /// Iterate over all attributes.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }
}
