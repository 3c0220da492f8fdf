//! Sandbox resource provider
//!
//! Behaves like the real cloud API as far as the engine can tell: creation
//! returns immediately, resources turn active only after a number of
//! fetches, and a server's network addresses show up a few fetches after it
//! turned active.

use crate::error::SandboxError;
use crate::state::{SandboxResource, StateStore, World};
use async_trait::async_trait;
use chrono::Utc;
use cloudstage_provider::{
    ContainerDetails, Handle, ImageDetails, ObjectDetails, ProviderError, RecordDetails,
    ResourceDetails, ResourceKind, ResourceProvider, ResourceSpec, ResourceState, ResourceStatus,
    Result, ServerDetails, ZoneDetails, params,
};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

const DEFAULT_TTL: u32 = 300;
const PASSWORD_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub region: String,
    /// Fetches until a new resource turns active
    pub ready_after_polls: u32,
    /// Per-kind override of `ready_after_polls`
    pub kind_ready_after: HashMap<ResourceKind, u32>,
    /// Further fetches until a server's addresses are assigned
    pub address_lag_polls: u32,
    /// Persist the world here between runs
    pub state_file: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            region: "dfw".to_string(),
            ready_after_polls: 2,
            kind_ready_after: HashMap::new(),
            address_lag_polls: 1,
            state_file: None,
        }
    }
}

impl SandboxConfig {
    pub fn with_ready_after(mut self, kind: ResourceKind, polls: u32) -> Self {
        self.kind_ready_after.insert(kind, polls);
        self
    }

    fn ready_after(&self, kind: ResourceKind) -> u32 {
        self.kind_ready_after
            .get(&kind)
            .copied()
            .unwrap_or(self.ready_after_polls)
    }
}

pub struct SandboxProvider {
    config: SandboxConfig,
    world: Mutex<World>,
    store: Option<StateStore>,
}

impl SandboxProvider {
    /// In-memory sandbox; `state_file` is ignored
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            world: Mutex::new(World::new()),
            store: None,
        }
    }

    /// Sandbox backed by `config.state_file`, loading what is already there
    pub async fn open(config: SandboxConfig) -> std::result::Result<Self, SandboxError> {
        let Some(path) = &config.state_file else {
            return Ok(Self::new(config));
        };
        let store = StateStore::new(path);
        let world = store.load().await?;
        info!(
            path = %store.path().display(),
            resources = world.resources.len(),
            "opened sandbox state"
        );
        Ok(Self {
            config,
            world: Mutex::new(world),
            store: Some(store),
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Create a resource that is already active with every field populated
    pub async fn seed(&self, spec: ResourceSpec) -> Result<ResourceState> {
        let mut world = self.world.lock().await;
        let mut resource = self.admit(&world, &spec)?;
        resource.fetches = self.config.ready_after(spec.kind) + self.config.address_lag_polls;
        let state = self.snapshot(&resource);
        let id = resource.id.clone();
        let mut next = world.clone();
        next.insert(resource);
        self.commit(&mut world, next).await?;
        info!(kind = %spec.kind, name = %spec.name, %id, "seeded");
        Ok(state)
    }

    /// Force a resource into `status` regardless of how often it is fetched
    pub async fn pin_status(&self, id: &str, status: ResourceStatus) -> Result<()> {
        let mut world = self.world.lock().await;
        let resource = world
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        resource.pinned = Some(status);
        self.persist(&world).await
    }

    async fn persist(&self, world: &World) -> Result<()> {
        if let Some(store) = &self.store {
            store.save(world).await?;
        }
        Ok(())
    }

    /// Save `next` and only then make it the current world
    async fn commit(&self, world: &mut World, next: World) -> Result<()> {
        self.persist(&next).await?;
        *world = next;
        Ok(())
    }

    /// Validate `spec` against the current world and build its record
    fn admit(&self, world: &World, spec: &ResourceSpec) -> Result<SandboxResource> {
        if spec.name.trim().is_empty() {
            return Err(ProviderError::InvalidSpec(format!("{} name is empty", spec.kind)));
        }
        let required = |key: &str| -> Result<String> {
            spec.str_param(key)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    ProviderError::InvalidSpec(format!(
                        "{} '{}' requires {}",
                        spec.kind, spec.name, key
                    ))
                })
        };

        let mut resource = SandboxResource {
            id: uuid::Uuid::new_v4().to_string(),
            spec: spec.clone(),
            fetches: 0,
            pinned: None,
            ipv4: String::new(),
            ipv6: String::new(),
            password: String::new(),
            flavor_id: String::new(),
            created_at: Utc::now(),
        };

        let conflict = || ProviderError::Conflict {
            kind: spec.kind,
            name: spec.name.clone(),
        };

        match spec.kind {
            ResourceKind::Server => {
                required(params::FLAVOR_ID)?;
                required(params::IMAGE_ID)?;
                let mut rng = rand::thread_rng();
                resource.ipv4 = format!(
                    "10.{}.{}.{}",
                    rng.gen_range(0..=255),
                    rng.gen_range(0..=255),
                    rng.gen_range(1..=254)
                );
                resource.ipv6 = format!(
                    "2001:db8::{:x}:{:x}",
                    rng.gen_range(1..=0xffff),
                    rng.gen_range(1..=0xffff)
                );
                resource.password = (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(PASSWORD_LEN)
                    .map(char::from)
                    .collect();
            }
            ResourceKind::Image => {
                let server_id = required(params::SERVER_ID)?;
                let source = world
                    .get(&server_id)
                    .filter(|r| r.spec.kind == ResourceKind::Server)
                    .ok_or(ProviderError::NotFound(server_id))?;
                resource.flavor_id = source
                    .spec
                    .str_param(params::FLAVOR_ID)
                    .unwrap_or_default()
                    .to_string();
            }
            ResourceKind::Container => {
                if world.of_kind(ResourceKind::Container).any(|r| r.spec.name == spec.name) {
                    return Err(conflict());
                }
            }
            ResourceKind::Object => {
                let container = required(params::CONTAINER)?;
                if !world
                    .of_kind(ResourceKind::Container)
                    .any(|r| r.spec.name == container)
                {
                    return Err(ProviderError::NotFound(format!("container {}", container)));
                }
                if world.of_kind(ResourceKind::Object).any(|r| {
                    r.spec.name == spec.name
                        && r.spec.str_param(params::CONTAINER) == Some(container.as_str())
                }) {
                    return Err(conflict());
                }
            }
            ResourceKind::Zone => {
                if world.of_kind(ResourceKind::Zone).any(|r| r.spec.name == spec.name) {
                    return Err(conflict());
                }
            }
            ResourceKind::Record => {
                let zone_id = required(params::ZONE_ID)?;
                let record_type = required(params::RECORD_TYPE)?;
                required(params::VALUE)?;
                if !world
                    .of_kind(ResourceKind::Zone)
                    .any(|r| r.id == zone_id)
                {
                    return Err(ProviderError::NotFound(format!("zone {}", zone_id)));
                }
                if world.of_kind(ResourceKind::Record).any(|r| {
                    r.spec.name == spec.name
                        && r.spec.str_param(params::ZONE_ID) == Some(zone_id.as_str())
                        && r.spec.str_param(params::RECORD_TYPE) == Some(record_type.as_str())
                }) {
                    return Err(conflict());
                }
            }
        }
        Ok(resource)
    }

    fn snapshot(&self, resource: &SandboxResource) -> ResourceState {
        let spec = &resource.spec;
        let ready_after = self.config.ready_after(spec.kind);
        let status = resource.pinned.unwrap_or(if resource.fetches >= ready_after {
            ResourceStatus::Active
        } else {
            ResourceStatus::Pending
        });
        let active = status == ResourceStatus::Active;
        let param = |key: &str| spec.str_param(key).unwrap_or_default().to_string();

        let details = match spec.kind {
            ResourceKind::Server => {
                let addressed = active
                    && resource.fetches >= ready_after + self.config.address_lag_polls;
                ResourceDetails::Server(ServerDetails {
                    flavor_id: param(params::FLAVOR_ID),
                    image_id: param(params::IMAGE_ID),
                    ipv4: if addressed { resource.ipv4.clone() } else { String::new() },
                    ipv6: if addressed { resource.ipv6.clone() } else { String::new() },
                    username: if active { "root".to_string() } else { String::new() },
                    password: if active { resource.password.clone() } else { String::new() },
                })
            }
            ResourceKind::Image => ResourceDetails::Image(ImageDetails {
                source_server_id: param(params::SERVER_ID),
                flavor_id: resource.flavor_id.clone(),
            }),
            ResourceKind::Container => {
                let public = spec.param::<bool>(params::PUBLIC).unwrap_or(false);
                let token: String = resource.id.chars().filter(|c| *c != '-').take(12).collect();
                ResourceDetails::Container(ContainerDetails {
                    public,
                    public_url: (public && active).then(|| {
                        format!("https://{}.{}.cdn.cloudstage.test", token, self.config.region)
                    }),
                })
            }
            ResourceKind::Object => ResourceDetails::Object(ObjectDetails {
                container: param(params::CONTAINER),
                content_type: spec
                    .str_param(params::CONTENT_TYPE)
                    .unwrap_or("application/octet-stream")
                    .to_string(),
                size: spec.str_param(params::BODY).map_or(0, |b| b.len() as u64),
            }),
            ResourceKind::Zone => ResourceDetails::Zone(ZoneDetails {
                domain: spec.name.clone(),
                email: spec.str_param(params::EMAIL).map(str::to_string),
            }),
            ResourceKind::Record => ResourceDetails::Record(RecordDetails {
                zone_id: param(params::ZONE_ID),
                record_type: param(params::RECORD_TYPE),
                value: param(params::VALUE),
                ttl: spec.param::<u32>(params::TTL).unwrap_or(DEFAULT_TTL),
            }),
        };

        ResourceState::new(resource.id.clone(), spec.name.clone(), details).with_status(status)
    }
}

#[async_trait]
impl ResourceProvider for SandboxProvider {
    fn name(&self) -> &str {
        "sandbox"
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<Handle> {
        let mut world = self.world.lock().await;
        let resource = self.admit(&world, spec)?;
        let handle = Handle::new(spec.kind, resource.id.clone(), spec.name.clone());
        let mut next = world.clone();
        next.insert(resource);
        self.commit(&mut world, next).await?;
        info!(region = %self.config.region, resource = %handle, "create accepted");
        Ok(handle)
    }

    async fn fetch(&self, handle: &Handle) -> Result<ResourceState> {
        let mut world = self.world.lock().await;
        let resource = world
            .get_mut(&handle.id)
            .ok_or_else(|| ProviderError::NotFound(handle.to_string()))?;
        resource.fetches += 1;
        let state = self.snapshot(resource);
        self.persist(&world).await?;
        debug!(resource = %handle, status = %state.status, "fetched");
        Ok(state)
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<ResourceState>> {
        let world = self.world.lock().await;
        Ok(world.of_kind(kind).map(|r| self.snapshot(r)).collect())
    }

    async fn delete(&self, handle: &Handle) -> Result<()> {
        let mut world = self.world.lock().await;
        let mut next = world.clone();
        next.remove(&handle.id).ok_or_else(|| ProviderError::NotFound(handle.to_string()))?;
        self.commit(&mut world, next).await?;
        info!(resource = %handle, "deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sandbox(ready: u32, lag: u32) -> SandboxProvider {
        SandboxProvider::new(SandboxConfig {
            ready_after_polls: ready,
            address_lag_polls: lag,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_server_address_lags_activation() {
        let provider = sandbox(2, 1);
        let handle = provider
            .create(&ResourceSpec::server("web1", "2", "img"))
            .await
            .unwrap();

        let first = provider.fetch(&handle).await.unwrap();
        assert_eq!(first.status, ResourceStatus::Pending);
        assert!(first.field("password").is_none());

        let second = provider.fetch(&handle).await.unwrap();
        assert_eq!(second.status, ResourceStatus::Active);
        assert!(second.field("ipv4").is_none());
        assert!(!second.is_usable());

        let third = provider.fetch(&handle).await.unwrap();
        assert!(third.is_usable());
        assert!(third.field("ipv4").unwrap().starts_with("10."));
        assert_eq!(third.field("username").as_deref(), Some("root"));
        assert_eq!(third.field("password").unwrap().len(), PASSWORD_LEN);
    }

    #[tokio::test]
    async fn test_missing_parameters_rejected() {
        let provider = sandbox(1, 0);
        let spec =
            ResourceSpec::new(ResourceKind::Server, "web1").with_param(params::FLAVOR_ID, "2");

        let err = provider.create(&spec).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidSpec(ref m) if m.contains("image_id")));
    }

    #[tokio::test]
    async fn test_image_inherits_source_flavor() {
        let provider = sandbox(1, 0);
        let server = provider
            .seed(ResourceSpec::server("app1", "4", "base"))
            .await
            .unwrap();

        let handle = provider
            .create(&ResourceSpec::image("app1.abc", &server.id))
            .await
            .unwrap();
        let image = provider.fetch(&handle).await.unwrap();

        assert_eq!(image.field("flavor_id").as_deref(), Some("4"));
        assert_eq!(image.field("source_server_id"), Some(server.id));
    }

    #[tokio::test]
    async fn test_named_resources_conflict() {
        let provider = sandbox(1, 0);
        let zone = provider
            .seed(ResourceSpec::zone("example.com", None))
            .await
            .unwrap();
        let record = ResourceSpec::record(&zone.id, "host.example.com", "A", "10.0.0.5");

        provider.create(&record).await.unwrap();
        let err = provider.create(&record).await.unwrap_err();
        assert!(err.is_conflict());

        // same name, different type is fine
        let aaaa = ResourceSpec::record(&zone.id, "host.example.com", "AAAA", "2001:db8::5");
        provider.create(&aaaa).await.unwrap();

        let zone = provider.seed(ResourceSpec::zone("example.com", None)).await;
        assert!(zone.unwrap_err().is_conflict());
        provider.create(&ResourceSpec::container("site", true)).await.unwrap();
        let container = provider.create(&ResourceSpec::container("site", false)).await;
        assert!(container.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_servers_may_share_names() {
        let provider = sandbox(1, 0);
        provider.create(&ResourceSpec::server("web", "2", "img")).await.unwrap();
        provider.create(&ResourceSpec::server("web", "2", "img")).await.unwrap();

        assert_eq!(provider.list(ResourceKind::Server).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_public_container_url() {
        let provider = sandbox(1, 0);
        let handle = provider
            .create(&ResourceSpec::container("site", true))
            .await
            .unwrap();

        let state = provider.fetch(&handle).await.unwrap();
        let url = state.field("public_url").unwrap();
        assert!(url.starts_with("https://"));
        assert!(url.ends_with(".dfw.cdn.cloudstage.test"));
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let provider = sandbox(1, 0);
        let handle = Handle::new(ResourceKind::Server, "missing", "web1");

        assert!(matches!(
            provider.delete(&handle).await,
            Err(ProviderError::NotFound(_))
        ));
        assert!(matches!(
            provider.fetch(&handle).await,
            Err(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pinned_status() {
        let provider = sandbox(1, 0);
        let handle = provider
            .create(&ResourceSpec::server("web1", "2", "img"))
            .await
            .unwrap();
        provider.pin_status(&handle.id, ResourceStatus::Error).await.unwrap();

        assert_eq!(provider.fetch(&handle).await.unwrap().status, ResourceStatus::Error);
    }

    #[tokio::test]
    async fn test_world_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let config = SandboxConfig {
            state_file: Some(temp_dir.path().join("sandbox.json")),
            ..Default::default()
        };

        let provider = SandboxProvider::open(config.clone()).await.unwrap();
        let zone = provider
            .seed(ResourceSpec::zone("example.com", Some("admin@example.com".into())))
            .await
            .unwrap();
        drop(provider);

        let reopened = SandboxProvider::open(config).await.unwrap();
        let zones = reopened.list(ResourceKind::Zone).await.unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].id, zone.id);
        assert!(zones[0].is_usable());
    }

    #[tokio::test]
    async fn test_failed_save_leaves_world_unchanged() {
        let temp_dir = tempdir().unwrap();
        let state_dir = temp_dir.path().join("state");
        let provider = SandboxProvider::open(SandboxConfig {
            state_file: Some(state_dir.join("sandbox.json")),
            ..Default::default()
        })
        .await
        .unwrap();

        // a plain file where the state directory should be
        std::fs::write(&state_dir, "").unwrap();
        let result = provider.create(&ResourceSpec::server("web1", "2", "img")).await;

        assert!(result.is_err());
        assert!(provider.list(ResourceKind::Server).await.unwrap().is_empty());
    }
}
