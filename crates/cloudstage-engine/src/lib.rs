//! cloudstage provisioning workflow engine
//!
//! Drives a [`ResourceProvider`](cloudstage_provider::ResourceProvider)
//! through multi-stage provisioning workflows: each stage creates one or
//! more resources, waits until the provider reports them usable, and hands
//! the frozen snapshots to the stages that depend on it.
//!
//! # Example
//!
//! ```ignore
//! use cloudstage_engine::{WorkflowEngine, workflows};
//!
//! let engine = WorkflowEngine::new(provider);
//! let stages = workflows::server_batch("web", 3, "2", image_id, &profile)?;
//! let result = engine.run(stages).await;
//! for state in result.states("servers") {
//!     println!("{}: {}", state.name, state.field("ipv4").unwrap_or_default());
//! }
//! ```

pub mod engine;
pub mod error;
pub mod namer;
pub mod poller;
pub mod record;
pub mod result;
pub mod stage;
pub mod workflows;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::WorkflowEngine;
pub use error::{ProvisionError, Result};
pub use namer::UniqueNamer;
pub use poller::{PollConfig, Readiness, wait_until_all_ready, wait_until_ready};
pub use record::{RecordOutcome, create_record, submit_record};
pub use result::{
    CleanupReport, ResourceOutcome, StageFailure, StageOutput, StagePhase, WorkflowResult,
    WorkflowStatus,
};
pub use stage::{CleanupAction, ConflictPolicy, DeleteResources, Stage, StageInputs};
pub use workflows::{Fqdn, Locator, PollProfile, locate};
