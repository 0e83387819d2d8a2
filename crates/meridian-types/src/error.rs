//! Error types for the Meridian framework.
//!
//! Provides [`CatalogError`] as the top-level error type shared across the
//! workspace. Component-local errors (plugin, pipeline, cache, source) live
//! next to the code that raises them in `meridian-catalog`; this type covers
//! the failures that originate in the data model itself plus the I/O and
//! serialization conversions every crate needs.

use thiserror::Error;

use crate::attribute::AttributeKind;

/// Top-level error type for the Meridian framework.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CatalogError {
    /// An attribute value did not match the kind declared by the metacard's
    /// schema.
    #[error("attribute '{attribute}' expects {expected:?} values")]
    AttributeType {
        /// Name of the offending attribute.
        attribute: String,
        /// The kind the schema declares for it.
        expected: AttributeKind,
    },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_type_display_names_the_attribute() {
        let err = CatalogError::AttributeType {
            attribute: "created".into(),
            expected: AttributeKind::Date,
        };
        assert_eq!(err.to_string(), "attribute 'created' expects Date values");
    }

    #[test]
    fn json_errors_convert() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json");
        let err: CatalogError = bad.unwrap_err().into();
        assert!(matches!(err, CatalogError::Json(_)));
    }
}
