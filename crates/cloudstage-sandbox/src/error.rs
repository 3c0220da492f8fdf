//! Sandbox error types

use cloudstage_provider::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("State file error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

impl From<SandboxError> for ProviderError {
    fn from(err: SandboxError) -> Self {
        ProviderError::State(err.to_string())
    }
}
