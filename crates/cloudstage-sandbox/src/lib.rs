//! In-process sandbox provider for cloudstage
//!
//! A deterministic stand-in for the cloud API. Resources go through the
//! same `Pending -> Active` lifecycle the real service reports, server
//! addresses are assigned late, and named resources (containers, zones,
//! records, objects) conflict when created twice.
//!
//! ```ignore
//! let provider = SandboxProvider::open(SandboxConfig {
//!     state_file: Some(state_dir.join("sandbox.json")),
//!     ..Default::default()
//! })
//! .await?;
//! provider.seed(ResourceSpec::zone("example.com", None)).await?;
//! ```

pub mod error;
pub mod provider;
pub mod state;

pub use error::{Result, SandboxError};
pub use provider::{SandboxConfig, SandboxProvider};
pub use state::{SandboxResource, StateStore, World};
