//! Workflow results
//!
//! A [`WorkflowResult`] is only appended to while the engine runs and is
//! handed out read-only once the run is over.

use crate::error::ProvisionError;
use cloudstage_provider::{Handle, ResourceKind, ResourceState};
use std::collections::HashSet;
use std::time::Duration;

/// Lifecycle of a stage: `Pending -> Creating -> WaitingReady -> Done`,
/// or `Failed` from any non-final phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    Pending,
    Creating,
    WaitingReady,
    Done,
    Failed,
}

impl std::fmt::Display for StagePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagePhase::Pending => write!(f, "pending"),
            StagePhase::Creating => write!(f, "creating"),
            StagePhase::WaitingReady => write!(f, "waiting-ready"),
            StagePhase::Done => write!(f, "done"),
            StagePhase::Failed => write!(f, "failed"),
        }
    }
}

/// What happened to one requested resource
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceOutcome {
    /// Created by the stage and ready
    Ready(ResourceState),
    /// Found already present; not owned by the workflow
    Existing(ResourceState),
    /// Creation hit a tolerated conflict
    AlreadyExists { kind: ResourceKind, name: String },
    Deleted(Handle),
}

impl ResourceOutcome {
    pub fn state(&self) -> Option<&ResourceState> {
        match self {
            ResourceOutcome::Ready(state) | ResourceOutcome::Existing(state) => Some(state),
            _ => None,
        }
    }
}

/// Frozen output of a `Done` stage, in request order
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub stage_id: String,
    pub resources: Vec<ResourceOutcome>,
}

impl StageOutput {
    pub fn new(stage_id: impl Into<String>, resources: Vec<ResourceOutcome>) -> Self {
        Self {
            stage_id: stage_id.into(),
            resources,
        }
    }

    /// Snapshots of ready and pre-existing resources
    pub fn states(&self) -> impl Iterator<Item = &ResourceState> {
        self.resources.iter().filter_map(ResourceOutcome::state)
    }

    /// Resources this stage created, excluding any in `removed`
    pub fn owned_except<'a>(
        &'a self,
        removed: &'a HashSet<Handle>,
    ) -> impl Iterator<Item = &'a ResourceState> + 'a {
        self.resources.iter().filter_map(move |outcome| match outcome {
            ResourceOutcome::Ready(state) if !removed.contains(&state.handle()) => Some(state),
            _ => None,
        })
    }

    pub fn deleted(&self) -> impl Iterator<Item = &Handle> {
        self.resources.iter().filter_map(|outcome| match outcome {
            ResourceOutcome::Deleted(handle) => Some(handle),
            _ => None,
        })
    }
}

/// Outcome of one cleanup action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub stage_id: String,
    pub description: String,
    pub error: Option<String>,
}

impl CleanupReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Terminal failure of a workflow
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage_id: String,
    pub error: ProvisionError,
    /// Resources the failing stage had already created
    pub orphaned: Vec<Handle>,
    /// Cleanups of earlier stages, in the order they ran
    pub cleanups: Vec<CleanupReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Completed,
    /// Every stage finished but a best-effort removal failed
    CompletedWithCleanupErrors,
    Failed,
}

#[derive(Debug, Clone)]
pub struct WorkflowResult {
    outputs: Vec<StageOutput>,
    phases: Vec<(String, StagePhase)>,
    failure: Option<StageFailure>,
    cleanup_errors: Vec<CleanupReport>,
    duration: Duration,
}

impl WorkflowResult {
    pub(crate) fn new<I, S>(stage_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outputs: Vec::new(),
            phases: stage_ids
                .into_iter()
                .map(|id| (id.into(), StagePhase::Pending))
                .collect(),
            failure: None,
            cleanup_errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub(crate) fn set_phase(&mut self, stage_id: &str, phase: StagePhase) {
        if let Some(entry) = self.phases.iter_mut().find(|(id, _)| id == stage_id) {
            entry.1 = phase;
        }
    }

    pub(crate) fn push_output(&mut self, output: StageOutput) {
        self.outputs.push(output);
    }

    pub(crate) fn push_cleanup_error(&mut self, report: CleanupReport) {
        self.cleanup_errors.push(report);
    }

    pub(crate) fn fail(&mut self, failure: StageFailure) {
        self.failure = Some(failure);
    }

    pub(crate) fn finish(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn status(&self) -> WorkflowStatus {
        if self.failure.is_some() {
            WorkflowStatus::Failed
        } else if self.cleanup_errors.is_empty() {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::CompletedWithCleanupErrors
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn outputs(&self) -> &[StageOutput] {
        &self.outputs
    }

    pub fn output(&self, stage_id: &str) -> Option<&StageOutput> {
        self.outputs.iter().find(|o| o.stage_id == stage_id)
    }

    /// Ready or pre-existing snapshots of a stage, in request order
    pub fn states(&self, stage_id: &str) -> Vec<&ResourceState> {
        self.output(stage_id)
            .map(|o| o.states().collect())
            .unwrap_or_default()
    }

    pub fn phase(&self, stage_id: &str) -> Option<StagePhase> {
        self.phases
            .iter()
            .find(|(id, _)| id == stage_id)
            .map(|(_, phase)| *phase)
    }

    pub fn phases(&self) -> &[(String, StagePhase)] {
        &self.phases
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    pub fn cleanup_errors(&self) -> &[CleanupReport] {
        &self.cleanup_errors
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}
