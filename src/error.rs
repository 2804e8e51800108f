//! Error types for the relation-mapping engine
//!
//! Provides the error taxonomy for relation configuration, input validation,
//! and store-level failures surfaced through the adapter boundary.

use thiserror::Error;

/// Result type alias for relation operations
pub type RelationResult<T> = Result<T, RelationError>;

/// Error types for relation-mapping operations
#[derive(Debug, Clone, Error)]
pub enum RelationError {
    /// Invalid or inconsistent relation definition
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller supplied a payload that is not a valid record mapping
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failure reported by the data store adapter
    #[error("Store error: {0}")]
    Store(String),

    /// Transaction begin/commit/rollback failure
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Record or definition (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deep relation recursion exceeded the configured limit
    #[error("Deep relation nesting for '{entity}' exceeded {max_depth} levels")]
    DepthExceeded { entity: String, max_depth: usize },
}

impl From<serde_json::Error> for RelationError {
    fn from(err: serde_json::Error) -> Self {
        RelationError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelationError::Configuration("bad definition".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad definition");

        let err = RelationError::DepthExceeded {
            entity: "Category".to_string(),
            max_depth: 4,
        };
        assert_eq!(
            err.to_string(),
            "Deep relation nesting for 'Category' exceeded 4 levels"
        );
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: RelationError = parse_err.into();
        assert!(matches!(err, RelationError::Serialization(_)));
    }
}
