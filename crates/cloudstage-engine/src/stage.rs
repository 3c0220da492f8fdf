//! Workflow stage definitions

use crate::error::{ProvisionError, Result};
use crate::poller::{PollConfig, Readiness};
use crate::result::StageOutput;
use async_trait::async_trait;
use cloudstage_provider::{
    ProviderError, ResourceKind, ResourceProvider, ResourceSpec, ResourceState,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Builds the specs of a stage from the outputs of its declared dependencies
pub type SpecBuilder = Arc<dyn Fn(&StageInputs<'_>) -> Result<Vec<ResourceSpec>> + Send + Sync>;

/// What to do when a named resource already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Record the conflict and carry on
    Tolerate,
    /// Abort the workflow
    Fail,
}

#[derive(Clone)]
pub(crate) enum StageAction {
    /// Create every spec the builder returns and wait for all of them
    Provision {
        builder: SpecBuilder,
        conflict: Option<ConflictPolicy>,
        unique_names: bool,
    },
    /// Reuse a resource found by name, or provision it when a builder is set
    Ensure {
        kind: ResourceKind,
        name: String,
        builder: Option<SpecBuilder>,
    },
    /// Delete what an earlier stage created
    Delete { target: String, best_effort: bool },
}

/// Cleanup run for a `Done` stage when a later stage fails
#[async_trait]
pub trait CleanupAction: Send + Sync {
    fn describe(&self) -> String;

    /// `resources` are the ones this stage created and still owns
    async fn run(
        &self,
        provider: &dyn ResourceProvider,
        resources: &[ResourceState],
    ) -> std::result::Result<(), ProviderError>;
}

/// Delete every resource the stage created.
///
/// Tries all of them even when one delete fails and reports the first error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteResources;

#[async_trait]
impl CleanupAction for DeleteResources {
    fn describe(&self) -> String {
        "delete created resources".to_string()
    }

    async fn run(
        &self,
        provider: &dyn ResourceProvider,
        resources: &[ResourceState],
    ) -> std::result::Result<(), ProviderError> {
        let mut first_error = None;
        for state in resources {
            if let Err(err) = provider.delete(&state.handle()).await {
                tracing::warn!(resource = %state.handle(), error = %err, "cleanup delete failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// One step of a workflow
#[derive(Clone)]
pub struct Stage {
    pub(crate) id: String,
    pub(crate) depends_on: Vec<String>,
    pub(crate) action: StageAction,
    pub(crate) readiness: Readiness,
    pub(crate) poll: PollConfig,
    pub(crate) cleanup: Option<Arc<dyn CleanupAction>>,
}

impl Stage {
    fn with_action(id: impl Into<String>, action: StageAction) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            action,
            readiness: Readiness::default(),
            poll: PollConfig::default(),
            cleanup: None,
        }
    }

    /// Create the resources returned by `builder` and wait until all are ready
    pub fn provision(
        id: impl Into<String>,
        builder: impl Fn(&StageInputs<'_>) -> Result<Vec<ResourceSpec>> + Send + Sync + 'static,
    ) -> Self {
        Self::with_action(
            id,
            StageAction::Provision {
                builder: Arc::new(builder),
                conflict: None,
                unique_names: false,
            },
        )
    }

    /// Look up an existing resource by name; a missing one is a validation
    /// failure unless [`or_create`](Self::or_create) is used
    pub fn ensure(id: impl Into<String>, kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::with_action(
            id,
            StageAction::Ensure {
                kind,
                name: name.into(),
                builder: None,
            },
        )
    }

    /// Delete the resources created by stage `target`
    pub fn delete(id: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        Self::with_action(
            id,
            StageAction::Delete {
                target: target.clone(),
                best_effort: false,
            },
        )
        .depends_on([target])
    }

    pub fn depends_on<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for stage in stages {
            let stage = stage.into();
            if !self.depends_on.contains(&stage) {
                self.depends_on.push(stage);
            }
        }
        self
    }

    pub fn readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn cleanup(mut self, cleanup: impl CleanupAction + 'static) -> Self {
        self.cleanup = Some(Arc::new(cleanup));
        self
    }

    /// Replace each spec name with `<name>.<random suffix>` unused by the
    /// provider
    pub fn unique_names(mut self) -> Self {
        if let StageAction::Provision { unique_names, .. } = &mut self.action {
            *unique_names = true;
        }
        self
    }

    /// Route creation through the conflict-aware writer
    pub fn on_conflict(mut self, policy: ConflictPolicy) -> Self {
        if let StageAction::Provision { conflict, .. } = &mut self.action {
            *conflict = Some(policy);
        }
        self
    }

    pub fn or_create(
        mut self,
        create: impl Fn(&StageInputs<'_>) -> Result<Vec<ResourceSpec>> + Send + Sync + 'static,
    ) -> Self {
        if let StageAction::Ensure { builder, .. } = &mut self.action {
            *builder = Some(Arc::new(create));
        }
        self
    }

    /// A failed delete no longer aborts the workflow
    pub fn best_effort(mut self) -> Self {
        if let StageAction::Delete { best_effort, .. } = &mut self.action {
            *best_effort = true;
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub(crate) fn is_best_effort(&self) -> bool {
        matches!(self.action, StageAction::Delete { best_effort: true, .. })
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = match &self.action {
            StageAction::Provision { .. } => "provision",
            StageAction::Ensure { .. } => "ensure",
            StageAction::Delete { .. } => "delete",
        };
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("action", &action)
            .field("depends_on", &self.depends_on)
            .field("readiness", &self.readiness)
            .field("poll", &self.poll)
            .finish()
    }
}

/// Outputs visible to a stage: only those of its declared dependencies
pub struct StageInputs<'a> {
    stage_id: &'a str,
    outputs: Vec<&'a StageOutput>,
}

impl<'a> StageInputs<'a> {
    pub(crate) fn new(stage_id: &'a str, outputs: Vec<&'a StageOutput>) -> Self {
        Self { stage_id, outputs }
    }

    pub fn output(&self, stage: &str) -> Result<&'a StageOutput> {
        self.outputs
            .iter()
            .copied()
            .find(|o| o.stage_id == stage)
            .ok_or_else(|| {
                ProvisionError::validation(format!(
                    "stage '{}' reads '{}' without depending on it",
                    self.stage_id, stage
                ))
            })
    }

    /// First usable snapshot of a dependency
    pub fn state(&self, stage: &str) -> Result<&'a ResourceState> {
        self.output(stage)?.states().next().ok_or_else(|| {
            ProvisionError::validation(format!("stage '{}' produced no resource", stage))
        })
    }

    pub fn states(&self, stage: &str) -> Result<Vec<&'a ResourceState>> {
        Ok(self.output(stage)?.states().collect())
    }

    /// A named field of a dependency's first snapshot; empty counts as missing
    pub fn field(&self, stage: &str, field: &str) -> Result<String> {
        let state = self.state(stage)?;
        state.field(field).ok_or_else(|| {
            ProvisionError::validation(format!(
                "{} '{}' from stage '{}' has no {}",
                state.kind(),
                state.name,
                stage,
                field
            ))
        })
    }
}

/// Check stage ids and dependency order before anything runs.
///
/// Returns the offending stage id with the error.
pub(crate) fn validate_stages(
    stages: &[Stage],
) -> std::result::Result<(), (String, ProvisionError)> {
    let mut seen: HashSet<&str> = HashSet::new();
    for stage in stages {
        if stage.id.is_empty() {
            return Err((
                stage.id.clone(),
                ProvisionError::validation("stage id must not be empty"),
            ));
        }
        for dependency in &stage.depends_on {
            if !seen.contains(dependency.as_str()) {
                return Err((
                    stage.id.clone(),
                    ProvisionError::validation(format!(
                        "stage '{}' depends on '{}', which does not run before it",
                        stage.id, dependency
                    )),
                ));
            }
        }
        if !seen.insert(stage.id.as_str()) {
            return Err((
                stage.id.clone(),
                ProvisionError::validation(format!("duplicate stage id '{}'", stage.id)),
            ));
        }
    }
    Ok(())
}
