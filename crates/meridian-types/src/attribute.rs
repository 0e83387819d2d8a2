//! Typed attribute values and the schema kinds that describe them.
//!
//! A [`Metacard`] carries a map of attribute name to [`AttributeValue`].
//! The record's [`MetacardType`] declares, per attribute name, which
//! [`AttributeKind`] is expected; names the schema does not declare are
//! still accepted (sources routinely inject attributes the core schema
//! never heard of), but a declared name with a mismatched kind is rejected
//! at `set_attribute` time.
//!
//! [`Metacard`]: crate::metacard::Metacard

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::security::SecurityMarkings;

/// A typed attribute value.
///
/// Geometry is carried as WKT text -- this core introduces no geometry
/// engine and hands the text through to sources unparsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Free text (titles, descriptions, content types).
    Text(String),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean flag.
    Boolean(bool),
    /// UTC timestamp.
    Date(DateTime<Utc>),
    /// Opaque binary payload (thumbnails, checksums).
    Binary(Vec<u8>),
    /// Geometry as WKT text.
    Geometry(String),
    /// Multi-valued text (keywords, associations).
    TextList(Vec<String>),
    /// Security markings: classification key to allowed marking values.
    Markings(SecurityMarkings),
}

impl AttributeValue {
    /// The schema kind matching this value.
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Text(_) => AttributeKind::Text,
            AttributeValue::Integer(_) => AttributeKind::Integer,
            AttributeValue::Float(_) => AttributeKind::Float,
            AttributeValue::Boolean(_) => AttributeKind::Boolean,
            AttributeValue::Date(_) => AttributeKind::Date,
            AttributeValue::Binary(_) => AttributeKind::Binary,
            AttributeValue::Geometry(_) => AttributeKind::Geometry,
            AttributeValue::TextList(_) => AttributeKind::TextList,
            AttributeValue::Markings(_) => AttributeKind::Markings,
        }
    }

    /// Borrow the inner text if this is a [`AttributeValue::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the inner markings if this is a [`AttributeValue::Markings`].
    pub fn as_markings(&self) -> Option<&SecurityMarkings> {
        match self {
            AttributeValue::Markings(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttributeValue::Date(value)
    }
}

impl From<SecurityMarkings> for AttributeValue {
    fn from(value: SecurityMarkings) -> Self {
        AttributeValue::Markings(value)
    }
}

/// Schema-side tag for each [`AttributeValue`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Binary,
    Geometry,
    TextList,
    Markings,
}

/// A named attribute schema.
///
/// Declares which kind each known attribute carries. The map is ordered so
/// that two types built from the same declarations compare and serialize
/// identically regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetacardType {
    /// Schema name (e.g. `"meridian.basic"`).
    pub name: String,
    /// Attribute name to expected kind.
    pub attributes: BTreeMap<String, AttributeKind>,
}

impl MetacardType {
    /// An empty schema with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Declare an attribute, builder style.
    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.insert(name.into(), kind);
        self
    }

    /// The kind declared for `name`, if the schema knows it.
    pub fn kind_of(&self, name: &str) -> Option<AttributeKind> {
        self.attributes.get(name).copied()
    }

    /// The well-known core schema shared by every source adapter.
    pub fn basic() -> Self {
        use crate::metacard::Metacard;

        Self::new("meridian.basic")
            .with_attribute(Metacard::TITLE, AttributeKind::Text)
            .with_attribute(Metacard::CREATED, AttributeKind::Date)
            .with_attribute(Metacard::MODIFIED, AttributeKind::Date)
            .with_attribute(Metacard::CONTENT_TYPE, AttributeKind::Text)
            .with_attribute(Metacard::LOCATION, AttributeKind::Geometry)
            .with_attribute(Metacard::RESOURCE_SIZE, AttributeKind::Integer)
            .with_attribute(Metacard::SECURITY, AttributeKind::Markings)
    }
}

impl Default for MetacardType {
    fn default() -> Self {
        Self::basic()
    }
}
