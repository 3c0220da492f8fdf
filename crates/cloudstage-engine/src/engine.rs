//! Workflow engine
//!
//! Runs stages strictly in order. Within a provisioning stage the create
//! calls and readiness waits of independent resources run concurrently.
//! When a stage fails, cleanups of the stages already `Done` run in reverse
//! order and the run stops; the failed stage is never retried here.

use crate::error::{ProvisionError, Result};
use crate::namer::{UniqueNamer, existing_names};
use crate::poller::wait_until_all_ready;
use crate::record::{RecordOutcome, submit_record};
use crate::result::{
    CleanupReport, ResourceOutcome, StageFailure, StageOutput, StagePhase, WorkflowResult,
};
use crate::stage::{
    ConflictPolicy, SpecBuilder, Stage, StageAction, StageInputs, validate_stages,
};
use cloudstage_provider::{Handle, ResourceKind, ResourceProvider, ResourceSpec};
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Callback notified on every stage phase transition
pub type PhaseObserver = Arc<dyn Fn(&str, StagePhase) + Send + Sync>;

/// A stage that did not reach `Done`
struct StageError {
    error: ProvisionError,
    /// Created by this stage and left in place
    orphaned: Vec<Handle>,
    /// Removed by this stage before it failed
    deleted: Vec<Handle>,
}

impl From<ProvisionError> for StageError {
    fn from(error: ProvisionError) -> Self {
        Self {
            error,
            orphaned: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

/// Result of one create call within a stage
enum Submission {
    Accepted(Handle),
    AlreadyExists { kind: ResourceKind, name: String },
}

pub struct WorkflowEngine {
    provider: Arc<dyn ResourceProvider>,
    namer: UniqueNamer,
    cancel: CancellationToken,
    observer: Option<PhaseObserver>,
}

impl WorkflowEngine {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            provider,
            namer: UniqueNamer::default(),
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    pub fn with_namer(mut self, namer: UniqueNamer) -> Self {
        self.namer = namer;
        self
    }

    /// Cancelling `token` stops the run at its next check point and unwinds
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_observer(
        mut self,
        observer: impl Fn(&str, StagePhase) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn provider(&self) -> &Arc<dyn ResourceProvider> {
        &self.provider
    }

    /// Run `stages` in order and report what happened.
    ///
    /// Never panics on provider failures; every failure ends up in the
    /// returned [`WorkflowResult`].
    pub async fn run(&self, stages: Vec<Stage>) -> WorkflowResult {
        let started = Instant::now();
        let mut result = WorkflowResult::new(stages.iter().map(|s| s.id.clone()));

        if let Err((stage_id, error)) = validate_stages(&stages) {
            warn!(stage = %stage_id, error = %error, "workflow rejected");
            result.set_phase(&stage_id, StagePhase::Failed);
            result.fail(StageFailure {
                stage_id,
                error,
                orphaned: Vec::new(),
                cleanups: Vec::new(),
            });
            return result.finish(started.elapsed());
        }

        // removed by failed delete stages; their outputs never record it
        let mut removed = HashSet::new();
        for (index, stage) in stages.iter().enumerate() {
            info!(stage = %stage.id, "starting stage");
            let outcome = {
                let inputs = StageInputs::new(
                    &stage.id,
                    stage
                        .depends_on
                        .iter()
                        .filter_map(|dep| result.output(dep))
                        .collect(),
                );
                self.execute_stage(stage, &inputs).await
            };

            match outcome {
                Ok(output) => {
                    self.transition(&mut result, stage, StagePhase::Done);
                    result.push_output(output);
                }
                Err(failed) if stage.is_best_effort() => {
                    removed.extend(failed.deleted);
                    warn!(stage = %stage.id, error = %failed.error, "best-effort stage failed");
                    self.transition(&mut result, stage, StagePhase::Failed);
                    result.push_cleanup_error(CleanupReport {
                        stage_id: stage.id.clone(),
                        description: "remove resources".to_string(),
                        error: Some(failed.error.to_string()),
                    });
                }
                Err(failed) => {
                    warn!(stage = %stage.id, error = %failed.error, "stage failed");
                    self.transition(&mut result, stage, StagePhase::Failed);
                    removed.extend(failed.deleted);
                    let cleanups = self.unwind(&stages[..index], &result, removed).await;
                    result.fail(StageFailure {
                        stage_id: stage.id.clone(),
                        error: failed.error,
                        orphaned: failed.orphaned,
                        cleanups,
                    });
                    break;
                }
            }
        }

        let result = result.finish(started.elapsed());
        info!(
            status = ?result.status(),
            elapsed_ms = result.duration().as_millis() as u64,
            "workflow finished"
        );
        result
    }

    fn transition(&self, result: &mut WorkflowResult, stage: &Stage, phase: StagePhase) {
        result.set_phase(&stage.id, phase);
        self.notify(stage, phase);
    }

    fn notify(&self, stage: &Stage, phase: StagePhase) {
        debug!(stage = %stage.id, %phase, "stage transition");
        if let Some(observer) = &self.observer {
            observer(&stage.id, phase);
        }
    }

    async fn execute_stage(
        &self,
        stage: &Stage,
        inputs: &StageInputs<'_>,
    ) -> std::result::Result<StageOutput, StageError> {
        if self.cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled.into());
        }

        match &stage.action {
            StageAction::Provision {
                builder,
                conflict,
                unique_names,
            } => {
                let resources = self
                    .provision(stage, builder, *conflict, *unique_names, inputs)
                    .await?;
                Ok(StageOutput::new(stage.id.clone(), resources))
            }
            StageAction::Ensure {
                kind,
                name,
                builder,
            } => {
                self.notify(stage, StagePhase::Creating);
                let existing = self
                    .provider
                    .list(*kind)
                    .await
                    .map_err(ProvisionError::from)?
                    .into_iter()
                    .find(|state| &state.name == name);

                if let Some(state) = existing {
                    info!(stage = %stage.id, %kind, %name, id = %state.id, "found existing");
                    return Ok(StageOutput::new(
                        stage.id.clone(),
                        vec![ResourceOutcome::Existing(state)],
                    ));
                }

                let Some(builder) = builder else {
                    return Err(ProvisionError::validation(format!(
                        "{} '{}' does not exist",
                        kind, name
                    ))
                    .into());
                };
                info!(stage = %stage.id, %kind, %name, "not found, creating");
                let resources = self.provision(stage, builder, None, false, inputs).await?;
                Ok(StageOutput::new(stage.id.clone(), resources))
            }
            StageAction::Delete { target, .. } => {
                self.notify(stage, StagePhase::Creating);
                let target = inputs.output(target)?;
                let mut deleted = Vec::new();
                for state in target.owned_except(&HashSet::new()) {
                    let handle = state.handle();
                    if let Err(err) = self.provider.delete(&handle).await {
                        return Err(StageError {
                            error: err.into(),
                            orphaned: Vec::new(),
                            deleted,
                        });
                    }
                    info!(stage = %stage.id, resource = %handle, "deleted");
                    deleted.push(handle);
                }
                let resources = deleted.into_iter().map(ResourceOutcome::Deleted).collect();
                Ok(StageOutput::new(stage.id.clone(), resources))
            }
        }
    }

    async fn provision(
        &self,
        stage: &Stage,
        builder: &SpecBuilder,
        conflict: Option<ConflictPolicy>,
        unique_names: bool,
        inputs: &StageInputs<'_>,
    ) -> std::result::Result<Vec<ResourceOutcome>, StageError> {
        self.notify(stage, StagePhase::Creating);

        let mut specs = builder(inputs)?;
        if specs.is_empty() {
            return Err(ProvisionError::validation(format!(
                "stage '{}' requested no resources",
                stage.id
            ))
            .into());
        }
        if unique_names {
            specs = self.assign_unique_names(specs).await?;
        }

        let submissions = join_all(specs.iter().map(|spec| self.submit(spec, conflict))).await;

        let mut accepted = Vec::new();
        let mut first_error = None;
        let mut slots = Vec::with_capacity(submissions.len());
        for submission in submissions {
            match submission {
                Ok(Submission::Accepted(handle)) => {
                    accepted.push(handle.clone());
                    slots.push(Submission::Accepted(handle));
                }
                Ok(other) => slots.push(other),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(error) = first_error {
            return Err(StageError {
                error,
                orphaned: accepted,
                deleted: Vec::new(),
            });
        }

        self.notify(stage, StagePhase::WaitingReady);
        let states = wait_until_all_ready(
            self.provider.as_ref(),
            &accepted,
            &stage.readiness,
            &stage.poll,
            &self.cancel,
        )
        .await
        .map_err(|error| StageError {
            error,
            orphaned: accepted.clone(),
            deleted: Vec::new(),
        })?;

        // reassemble in request order
        let mut states = states.into_iter();
        let mut resources = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Submission::Accepted(_) => {
                    if let Some(state) = states.next() {
                        resources.push(ResourceOutcome::Ready(state));
                    }
                }
                Submission::AlreadyExists { kind, name } => {
                    resources.push(ResourceOutcome::AlreadyExists { kind, name });
                }
            }
        }
        Ok(resources)
    }

    async fn submit(
        &self,
        spec: &ResourceSpec,
        conflict: Option<ConflictPolicy>,
    ) -> Result<Submission> {
        let Some(policy) = conflict else {
            let handle = self.provider.create(spec).await?;
            info!(kind = %spec.kind, name = %spec.name, id = %handle.id, "create requested");
            return Ok(Submission::Accepted(handle));
        };

        match submit_record(self.provider.as_ref(), spec).await? {
            RecordOutcome::Created(handle) => Ok(Submission::Accepted(handle)),
            RecordOutcome::AlreadyExists { kind, name } => match policy {
                ConflictPolicy::Tolerate => {
                    info!(%kind, %name, "already exists, keeping it");
                    Ok(Submission::AlreadyExists { kind, name })
                }
                ConflictPolicy::Fail => Err(ProvisionError::Conflict { kind, name }),
            },
        }
    }

    /// Rename each spec before anything is created; fails without side effects
    async fn assign_unique_names(&self, specs: Vec<ResourceSpec>) -> Result<Vec<ResourceSpec>> {
        let mut taken: HashMap<ResourceKind, HashSet<String>> = HashMap::new();
        let mut renamed = Vec::with_capacity(specs.len());
        for spec in specs {
            if !taken.contains_key(&spec.kind) {
                let names = existing_names(self.provider.as_ref(), spec.kind).await?;
                taken.insert(spec.kind, names);
            }
            let names = taken.entry(spec.kind).or_default();
            let name = self.namer.generate(&spec.name, |candidate| names.contains(candidate))?;
            debug!(base = %spec.name, %name, "assigned unique name");
            names.insert(name.clone());
            renamed.push(spec.with_name(name));
        }
        Ok(renamed)
    }

    /// Run cleanups of the `Done` stages in `done`, last one first.
    ///
    /// Resources in `removed` or deleted by a finished stage are skipped.
    async fn unwind(
        &self,
        done: &[Stage],
        result: &WorkflowResult,
        mut removed: HashSet<Handle>,
    ) -> Vec<CleanupReport> {
        removed.extend(result.outputs().iter().flat_map(|o| o.deleted().cloned()));

        let mut reports = Vec::new();
        for stage in done.iter().rev() {
            let Some(cleanup) = &stage.cleanup else {
                continue;
            };
            if result.phase(&stage.id) != Some(StagePhase::Done) {
                continue;
            }
            let Some(output) = result.output(&stage.id) else {
                continue;
            };

            let resources: Vec<_> = output.owned_except(&removed).cloned().collect();
            if resources.is_empty() {
                continue;
            }

            let description = cleanup.describe();
            info!(
                stage = %stage.id,
                cleanup = %description,
                count = resources.len(),
                "running cleanup"
            );
            let error = match cleanup.run(self.provider.as_ref(), &resources).await {
                Ok(()) => None,
                Err(err) => {
                    warn!(stage = %stage.id, error = %err, "cleanup failed, continuing");
                    Some(err.to_string())
                }
            };
            reports.push(CleanupReport {
                stage_id: stage.id.clone(),
                description,
                error,
            });
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollConfig;
    use crate::result::WorkflowStatus;
    use crate::stage::DeleteResources;
    use crate::testing::ScriptedProvider;
    use cloudstage_provider::{ResourceDetails, ResourceState, ResourceStatus, ZoneDetails};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fast() -> PollConfig {
        PollConfig::new(Duration::from_secs(1), Duration::from_secs(30)).unwrap()
    }

    fn engine(provider: &Arc<ScriptedProvider>) -> WorkflowEngine {
        WorkflowEngine::new(provider.clone())
    }

    fn server_stage(id: &str, name: &str) -> Stage {
        let name = name.to_string();
        Stage::provision(id, move |_| Ok(vec![ResourceSpec::server(name.clone(), "2", "img")]))
            .poll(fast())
            .cleanup(DeleteResources)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_two_reads_stage_one_output() {
        let provider = Arc::new(ScriptedProvider::new());
        let stages = vec![
            server_stage("server", "host.example.com"),
            Stage::provision("record", |inputs| {
                Ok(vec![ResourceSpec::record(
                    "zone-1",
                    "host.example.com",
                    "A",
                    inputs.field("server", "ipv4")?,
                )])
            })
            .depends_on(["server"])
            .poll(fast()),
        ];

        let result = engine(&provider).run(stages).await;

        assert_eq!(result.status(), WorkflowStatus::Completed);
        let record = result.states("record")[0];
        let server = result.states("server")[0];
        assert_eq!(record.field("value"), server.field("ipv4"));
        assert_eq!(result.phase("record"), Some(StagePhase::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_stage_one_never_builds_stage_two() {
        let provider = Arc::new(ScriptedProvider::new().fail_create("host.example.com"));
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let stages = vec![
            server_stage("server", "host.example.com"),
            Stage::provision("record", move |inputs| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![ResourceSpec::record(
                    "zone-1",
                    "host.example.com",
                    "A",
                    inputs.field("server", "addr")?,
                )])
            })
            .depends_on(["server"]),
        ];

        let result = engine(&provider).run(stages).await;

        assert_eq!(result.status(), WorkflowStatus::Failed);
        assert_eq!(result.failure().unwrap().stage_id, "server");
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert_eq!(provider.create_calls().len(), 1);
        assert_eq!(result.phase("record"), Some(StagePhase::Pending));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_runs_in_reverse_and_survives_failures() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .fail_delete("second")
                .never_ready("third"),
        );
        let stages = vec![
            server_stage("one", "first"),
            server_stage("two", "second").depends_on(["one"]),
            server_stage("three", "third").depends_on(["two"]),
        ];

        let result = engine(&provider).run(stages).await;

        let failure = result.failure().unwrap();
        assert_eq!(failure.stage_id, "three");
        assert!(matches!(failure.error, ProvisionError::Timeout { .. }));
        assert_eq!(failure.orphaned.len(), 1);
        assert_eq!(failure.orphaned[0].name, "third");

        let order: Vec<_> = failure.cleanups.iter().map(|c| c.stage_id.as_str()).collect();
        assert_eq!(order, ["two", "one"]);
        assert!(!failure.cleanups[0].succeeded());
        assert!(failure.cleanups[1].succeeded());

        let deleted: Vec<_> = provider
            .delete_calls()
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(deleted, ["second", "first"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_results_follow_request_order() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .ready_after("web1", 3)
                .ready_after("web2", 1)
                .ready_after("web3", 2),
        );
        let stages = vec![
            Stage::provision("servers", |_| {
                Ok((1..=3)
                    .map(|i| ResourceSpec::server(format!("web{i}"), "2", "img"))
                    .collect())
            })
            .poll(fast()),
        ];

        let result = engine(&provider).run(stages).await;

        let names: Vec<_> = result
            .states("servers")
            .iter()
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(names, ["web1", "web2", "web3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_naming_exhaustion_aborts_before_create() {
        let taken = ResourceState::new(
            "img-0",
            "app1.x",
            ResourceDetails::Image(Default::default()),
        );
        let provider = Arc::new(ScriptedProvider::new().existing(taken));
        let stages = vec![
            server_stage("source", "app1").cleanup(DeleteResources),
            Stage::provision("image", |_| Ok(vec![ResourceSpec::image("app1", "srv")]))
                .unique_names()
                .poll(fast()),
        ];

        let result = WorkflowEngine::new(provider.clone())
            .with_namer(UniqueNamer::new("x", 1, 20).unwrap())
            .run(stages)
            .await;

        let failure = result.failure().unwrap();
        assert_eq!(failure.stage_id, "image");
        assert!(matches!(failure.error, ProvisionError::NamingExhausted { .. }));
        // only the source server was ever created
        assert_eq!(provider.create_calls().len(), 1);
        assert!(failure.orphaned.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tolerated_conflict_completes() {
        let provider = Arc::new(ScriptedProvider::new().conflict_on("host.example.com"));
        let stages = vec![
            Stage::provision("record", |_| {
                Ok(vec![ResourceSpec::record("zone-1", "host.example.com", "A", "10.0.0.5")])
            })
            .on_conflict(ConflictPolicy::Tolerate),
        ];

        let result = engine(&provider).run(stages).await;

        assert_eq!(result.status(), WorkflowStatus::Completed);
        assert!(matches!(
            result.output("record").unwrap().resources[0],
            ResourceOutcome::AlreadyExists { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_policy_fail_aborts() {
        let provider = Arc::new(ScriptedProvider::new().conflict_on("site"));
        let stages = vec![
            Stage::provision("container", |_| Ok(vec![ResourceSpec::container("site", true)]))
                .on_conflict(ConflictPolicy::Fail),
        ];

        let result = engine(&provider).run(stages).await;

        assert!(matches!(
            result.failure().unwrap().error,
            ProvisionError::Conflict { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_reuses_existing_and_never_cleans_it_up() {
        let zone = ResourceState::new(
            "zone-9",
            "example.com",
            ResourceDetails::Zone(ZoneDetails {
                domain: "example.com".to_string(),
                email: None,
            }),
        )
        .with_status(ResourceStatus::Active);
        let provider = Arc::new(ScriptedProvider::new().existing(zone).never_ready("host"));
        let stages = vec![
            Stage::ensure("zone", ResourceKind::Zone, "example.com").cleanup(DeleteResources),
            server_stage("server", "host"),
        ];

        let result = engine(&provider).run(stages).await;

        assert_eq!(result.failure().unwrap().stage_id, "server");
        assert!(result.failure().unwrap().cleanups.is_empty());
        assert!(provider.delete_calls().is_empty());
        assert_eq!(result.states("zone")[0].id, "zone-9");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_missing_without_create_is_validation() {
        let provider = Arc::new(ScriptedProvider::new());
        let stages = vec![Stage::ensure("zone", ResourceKind::Zone, "example.com")];

        let result = engine(&provider).run(stages).await;

        assert!(matches!(
            result.failure().unwrap().error,
            ProvisionError::Validation(_)
        ));
        assert!(provider.create_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_creates_when_allowed() {
        let provider = Arc::new(ScriptedProvider::new());
        let stages = vec![
            Stage::ensure("zone", ResourceKind::Zone, "example.com")
                .or_create(|_| Ok(vec![ResourceSpec::zone("example.com", None)])),
        ];

        let result = engine(&provider).run(stages).await;

        assert!(result.is_success());
        assert!(matches!(
            result.output("zone").unwrap().resources[0],
            ResourceOutcome::Ready(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_effort_delete_failure_completes_with_errors() {
        let provider = Arc::new(ScriptedProvider::new().fail_delete("img"));
        let stages = vec![
            Stage::provision("image", |_| Ok(vec![ResourceSpec::image("img", "srv")])),
            server_stage("server", "clone").depends_on(["image"]),
            Stage::delete("delete-image", "image").best_effort(),
        ];

        let result = engine(&provider).run(stages).await;

        assert_eq!(result.status(), WorkflowStatus::CompletedWithCleanupErrors);
        assert_eq!(result.phase("delete-image"), Some(StagePhase::Failed));
        assert_eq!(result.cleanup_errors()[0].stage_id, "delete-image");
        assert_eq!(result.states("server")[0].name, "clone");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_resources_are_not_cleaned_up_twice() {
        let provider = Arc::new(ScriptedProvider::new().never_ready("late"));
        let stages = vec![
            Stage::provision("image", |_| Ok(vec![ResourceSpec::image("img", "srv")]))
                .cleanup(DeleteResources),
            Stage::delete("delete-image", "image"),
            server_stage("server", "late"),
        ];

        let result = engine(&provider).run(stages).await;

        assert_eq!(result.failure().unwrap().stage_id, "server");
        assert!(result.failure().unwrap().cleanups.is_empty());
        assert_eq!(provider.delete_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_delete_is_not_cleaned_up_again() {
        let provider = Arc::new(ScriptedProvider::new().fail_delete("b"));
        let stages = vec![
            Stage::provision("servers", |_| {
                Ok(vec![
                    ResourceSpec::server("a", "2", "img"),
                    ResourceSpec::server("b", "2", "img"),
                ])
            })
            .poll(fast())
            .cleanup(DeleteResources),
            Stage::delete("rm", "servers"),
        ];

        let result = engine(&provider).run(stages).await;

        let failure = result.failure().unwrap();
        assert_eq!(failure.stage_id, "rm");
        assert_eq!(failure.cleanups.len(), 1);
        assert_eq!(failure.cleanups[0].stage_id, "servers");
        let deleted: Vec<_> = provider
            .delete_calls()
            .into_iter()
            .map(|h| h.name)
            .collect();
        // "a" went in the delete stage; cleanup only retries "b"
        assert_eq!(deleted, ["a", "b", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_after_create_reports_orphan() {
        let provider = Arc::new(ScriptedProvider::new().fail_fetch("site"));
        let stages = vec![
            Stage::provision("container", |_| Ok(vec![ResourceSpec::container("site", true)]))
                .on_conflict(ConflictPolicy::Fail)
                .poll(fast()),
        ];

        let result = engine(&provider).run(stages).await;

        let failure = result.failure().unwrap();
        assert_eq!(failure.stage_id, "container");
        assert!(matches!(failure.error, ProvisionError::Provider(_)));
        assert_eq!(failure.orphaned.len(), 1);
        assert_eq!(failure.orphaned[0].name, "site");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_workflow_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::new());
        let stages = vec![
            server_stage("server", "host"),
            Stage::delete("cleanup", "image"),
        ];

        let result = engine(&provider).run(stages).await;

        assert_eq!(result.failure().unwrap().stage_id, "cleanup");
        assert!(provider.create_calls().is_empty());
        assert_eq!(result.phase("server"), Some(StagePhase::Pending));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_phase_sequence() {
        let provider = Arc::new(ScriptedProvider::new().ready_after("web1", 2));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let result = engine(&provider)
            .with_observer(move |stage, phase| {
                sink.lock().unwrap().push(format!("{stage}:{phase}"));
            })
            .run(vec![server_stage("servers", "web1")])
            .await;

        assert!(result.is_success());
        assert_eq!(
            *seen.lock().unwrap(),
            ["servers:creating", "servers:waiting-ready", "servers:done"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_unwinds_done_stages() {
        let provider = Arc::new(ScriptedProvider::new().never_ready("second"));
        let token = CancellationToken::new();
        let stages = vec![
            server_stage("one", "first"),
            server_stage("two", "second")
                .poll(PollConfig::new(Duration::from_secs(5), Duration::from_secs(3600)).unwrap()),
        ];

        let engine = engine(&provider).with_cancellation(token.clone());
        let canceller = async {
            tokio::time::sleep(Duration::from_secs(12)).await;
            token.cancel();
        };
        let (result, _) = tokio::join!(engine.run(stages), canceller);

        let failure = result.failure().unwrap();
        assert!(failure.error.is_cancelled());
        assert_eq!(failure.cleanups.len(), 1);
        assert_eq!(failure.cleanups[0].stage_id, "one");
    }
}
