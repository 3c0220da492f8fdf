//! Provider boundary error types
//!
//! Concrete providers map their own failures onto this taxonomy. The only
//! kind the engine interprets is [`ProviderError::Conflict`].

use crate::state::ResourceKind;
use thiserror::Error;

/// Resource provider errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{kind} '{name}' already exists")]
    Conflict { kind: ResourceKind, name: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid resource spec: {0}")]
    InvalidSpec(String),

    #[error("State error: {0}")]
    State(String),

    #[error("JSON error: {0}")]
    Json(String),
}

impl ProviderError {
    /// Whether this is the "named sub-resource already exists" condition
    pub fn is_conflict(&self) -> bool {
        matches!(self, ProviderError::Conflict { .. })
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Json(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_distinguishable() {
        let conflict = ProviderError::Conflict {
            kind: ResourceKind::Record,
            name: "host.example.com".to_string(),
        };
        assert!(conflict.is_conflict());
        assert_eq!(conflict.to_string(), "record 'host.example.com' already exists");

        assert!(!ProviderError::Api("503".to_string()).is_conflict());
        assert!(!ProviderError::NotFound("x".to_string()).is_conflict());
    }
}
