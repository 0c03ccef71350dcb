//! Error types for geoload.
//!
//! Routine absences (an entity with no recorded traffic) are reported as
//! `Option`, never as an error. Broken index invariants panic. Everything
//! else surfaces as a [`GeoLoadError`].

use thiserror::Error;

/// Result type alias for geoload operations.
pub type Result<T> = std::result::Result<T, GeoLoadError>;

#[derive(Debug, Error)]
pub enum GeoLoadError {
    /// A caller supplied a bad location, bucket key or cell id
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationErrorWithContext(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine was closed and no longer accepts requests
    #[error("Engine is closed")]
    EngineClosed,
}

impl From<serde_json::Error> for GeoLoadError {
    fn from(err: serde_json::Error) -> Self {
        GeoLoadError::SerializationErrorWithContext(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GeoLoadError::InvalidInput("Latitude out of range".to_string());
        assert_eq!(err.to_string(), "Invalid input: Latitude out of range");
        assert_eq!(GeoLoadError::EngineClosed.to_string(), "Engine is closed");
    }

    #[test]
    fn test_from_serde_json() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: GeoLoadError = parse.unwrap_err().into();
        assert!(matches!(err, GeoLoadError::SerializationErrorWithContext(_)));
    }
}
