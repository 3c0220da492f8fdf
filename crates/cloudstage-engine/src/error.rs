//! Provisioning error types

use cloudstage_provider::{Handle, ProviderError, ResourceKind, ResourceState};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the poller, namer, record writer and workflow engine
#[derive(Error, Debug, Clone)]
pub enum ProvisionError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("{kind} '{name}' already exists")]
    Conflict { kind: ResourceKind, name: String },

    #[error(
        "Timed out after {}s waiting for {handle} (last status: {})",
        .waited.as_secs(),
        .last_state.status
    )]
    Timeout {
        handle: Handle,
        waited: Duration,
        last_state: Box<ResourceState>,
    },

    #[error("Could not find a free name for '{base}' after {attempts} attempts")]
    NamingExhausted { base: String, attempts: u32 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid poll configuration: {0}")]
    InvalidPollConfig(String),

    #[error("{} {} entered status {}", .state.kind(), .state.name, .state.status)]
    ResourceFailed { state: Box<ResourceState> },

    #[error("Cancelled")]
    Cancelled,
}

impl ProvisionError {
    pub fn validation(message: impl Into<String>) -> Self {
        ProvisionError::Validation(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProvisionError::Cancelled)
    }

    /// Last snapshot observed before giving up, when there is one
    pub fn last_state(&self) -> Option<&ResourceState> {
        match self {
            ProvisionError::Timeout { last_state, .. } => Some(last_state),
            ProvisionError::ResourceFailed { state } => Some(state),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
