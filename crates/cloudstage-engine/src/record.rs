//! Conflict-aware creation of named sub-resources
//!
//! DNS records, containers and objects are addressed by name. Creating one
//! that already exists is an expected outcome, reported as
//! [`RecordOutcome::AlreadyExists`] rather than as a failure.

use cloudstage_provider::{
    Handle, ProviderError, ResourceKind, ResourceProvider, ResourceSpec, ResourceState,
};
use tracing::{debug, info};

/// `T` is the snapshot taken right after the create call, or just the
/// handle when [`submit_record`] is used.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome<T = ResourceState> {
    Created(T),
    AlreadyExists { kind: ResourceKind, name: String },
}

impl<T> RecordOutcome<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, RecordOutcome::Created(_))
    }
}

/// Create `spec`, classifying the provider's conflict error.
///
/// Every other provider error propagates unchanged. The created resource
/// is not fetched, so the handle is never lost to a failing read.
pub async fn submit_record(
    provider: &dyn ResourceProvider,
    spec: &ResourceSpec,
) -> Result<RecordOutcome<Handle>, ProviderError> {
    match provider.create(spec).await {
        Ok(handle) => {
            info!(kind = %spec.kind, name = %spec.name, id = %handle.id, "created");
            Ok(RecordOutcome::Created(handle))
        }
        Err(ProviderError::Conflict { kind, name }) => {
            debug!(%kind, %name, "already exists");
            Ok(RecordOutcome::AlreadyExists { kind, name })
        }
        Err(err) => Err(err),
    }
}

/// [`submit_record`] followed by a single fetch of the created resource
pub async fn create_record(
    provider: &dyn ResourceProvider,
    spec: &ResourceSpec,
) -> Result<RecordOutcome, ProviderError> {
    match submit_record(provider, spec).await? {
        RecordOutcome::Created(handle) => {
            Ok(RecordOutcome::Created(provider.fetch(&handle).await?))
        }
        RecordOutcome::AlreadyExists { kind, name } => {
            Ok(RecordOutcome::AlreadyExists { kind, name })
        }
    }
}
