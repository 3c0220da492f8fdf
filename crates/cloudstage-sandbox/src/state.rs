//! Sandbox world persistence
//!
//! The simulated world is stored as pretty-printed JSON. Every save first
//! moves the previous file to `<file>.backup`.

use crate::error::{Result, SandboxError};
use chrono::{DateTime, Utc};
use cloudstage_provider::{ResourceKind, ResourceSpec, ResourceStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const BACKUP_EXTENSION: &str = "backup";

/// Every resource the sandbox knows about, in creation order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    pub resources: Vec<SandboxResource>,
}

impl Default for World {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: Vec::new(),
        }
    }
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&SandboxResource> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut SandboxResource> {
        self.updated_at = Utc::now();
        self.resources.iter_mut().find(|r| r.id == id)
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &SandboxResource> {
        self.resources.iter().filter(move |r| r.spec.kind == kind)
    }

    pub fn insert(&mut self, resource: SandboxResource) {
        self.resources.push(resource);
        self.updated_at = Utc::now();
    }

    /// Remove `id` and everything nested under it (records of a zone,
    /// objects of a container)
    pub fn remove(&mut self, id: &str) -> Option<SandboxResource> {
        let index = self.resources.iter().position(|r| r.id == id)?;
        let removed = self.resources.remove(index);
        self.resources.retain(|r| !r.is_nested_in(&removed));
        self.updated_at = Utc::now();
        Some(removed)
    }
}

/// A simulated resource and the hidden values it reveals over time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxResource {
    pub id: String,
    pub spec: ResourceSpec,
    /// Number of fetches observed so far
    pub fetches: u32,
    /// Overrides the simulated lifecycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<ResourceStatus>,
    #[serde(default)]
    pub ipv4: String,
    #[serde(default)]
    pub ipv6: String,
    #[serde(default)]
    pub password: String,
    /// Flavor inherited from the source server of an image
    #[serde(default)]
    pub flavor_id: String,
    pub created_at: DateTime<Utc>,
}

impl SandboxResource {
    fn is_nested_in(&self, parent: &SandboxResource) -> bool {
        use cloudstage_provider::params;
        match (parent.spec.kind, self.spec.kind) {
            (ResourceKind::Zone, ResourceKind::Record) => {
                self.spec.str_param(params::ZONE_ID) == Some(parent.id.as_str())
            }
            (ResourceKind::Container, ResourceKind::Object) => {
                self.spec.str_param(params::CONTAINER) == Some(parent.spec.name.as_str())
            }
            _ => false,
        }
    }
}

/// Reads and writes the sandbox state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".");
        name.push(BACKUP_EXTENSION);
        PathBuf::from(name)
    }

    /// Load the world; a missing file is an empty world
    pub async fn load(&self) -> Result<World> {
        if !self.path.exists() {
            tracing::debug!("State file not found, starting with an empty world");
            return Ok(World::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        let world: World = serde_json::from_str(&content)?;

        if world.version > STATE_VERSION {
            return Err(SandboxError::State(format!(
                "State file version {} is newer than supported version {}",
                world.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded sandbox world with {} resources", world.resources.len());
        Ok(world)
    }

    pub async fn save(&self, world: &World) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).await?;
                tracing::debug!("Created state directory: {}", dir.display());
            }
        }

        let backup = self.backup_path();
        if self.path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&self.path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(world)?;
        fs::write(&self.path, content).await?;

        tracing::debug!("Saved sandbox world with {} resources", world.resources.len());
        Ok(())
    }
}
