//! cloudstage resource provider capability
//!
//! This crate defines what the provisioning engine needs from a cloud
//! provider, and nothing more: the resource data model and the
//! [`ResourceProvider`] trait that a concrete client implements.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 cloudstage CLI                   │
//! │       (servers / clone / dns / static-site)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               cloudstage-engine                  │
//! │   poller · namer · record writer · workflows     │
//! └─────────────────┬───────────────────────────────┘
//!                   │  trait ResourceProvider
//! ┌─────────────────▼───────────────────────────────┐
//! │              cloudstage-provider                 │
//! │  ResourceKind / ResourceSpec / ResourceState     │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │    sandbox    │  (or any concrete API client)
//! │   provider    │
//! └───────────────┘
//! ```

pub mod error;
pub mod provider;
pub mod state;

// Re-exports
pub use error::{ProviderError, Result};
pub use provider::{Handle, ResourceProvider, ResourceSpec, params};
pub use state::{
    ContainerDetails, ImageDetails, ObjectDetails, RecordDetails, ResourceDetails, ResourceKind,
    ResourceState, ResourceStatus, ServerDetails, ZoneDetails,
};
