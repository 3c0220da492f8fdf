//! Scripted in-memory provider for unit tests

use async_trait::async_trait;
use cloudstage_provider::{
    ContainerDetails, Handle, ImageDetails, ObjectDetails, ProviderError, RecordDetails,
    ResourceDetails, ResourceKind, ResourceProvider, ResourceSpec, ResourceState, ResourceStatus,
    ServerDetails, ZoneDetails, params,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// How a named resource behaves once created
#[derive(Debug, Clone, Copy)]
pub(crate) struct Script {
    /// Fetch number on which the resource turns active
    pub ready_after: u32,
    /// Extra fetches before a server's address shows up
    pub address_after: u32,
    /// Status pinned regardless of fetch count
    pub pinned: Option<ResourceStatus>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            ready_after: 1,
            address_after: 0,
            pinned: None,
        }
    }
}

struct Created {
    handle: Handle,
    spec: ResourceSpec,
    fetches: u32,
}

#[derive(Default)]
struct Inner {
    next_id: u32,
    created: Vec<Created>,
    listed: Vec<ResourceState>,
    scripts: HashMap<String, Script>,
    fail_create: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_fetch: HashSet<String>,
    conflicts: HashSet<String>,
    create_calls: Vec<ResourceSpec>,
    delete_calls: Vec<Handle>,
    list_calls: u32,
}

#[derive(Default)]
pub(crate) struct ScriptedProvider {
    inner: Mutex<Inner>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, name: &str, script: Script) -> Self {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .insert(name.to_string(), script);
        self
    }

    pub fn ready_after(self, name: &str, polls: u32) -> Self {
        self.script(
            name,
            Script {
                ready_after: polls,
                ..Default::default()
            },
        )
    }

    pub fn never_ready(self, name: &str) -> Self {
        self.script(
            name,
            Script {
                pinned: Some(ResourceStatus::Pending),
                ..Default::default()
            },
        )
    }

    pub fn fail_create(self, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .fail_create
            .insert(name.to_string());
        self
    }

    pub fn fail_delete(self, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .fail_delete
            .insert(name.to_string());
        self
    }

    /// Every fetch of `name` fails after a successful create
    pub fn fail_fetch(self, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .fail_fetch
            .insert(name.to_string());
        self
    }

    pub fn conflict_on(self, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .conflicts
            .insert(name.to_string());
        self
    }

    /// Pre-existing resource returned by `list`
    pub fn existing(self, state: ResourceState) -> Self {
        self.inner.lock().unwrap().listed.push(state);
        self
    }

    pub fn create_calls(&self) -> Vec<ResourceSpec> {
        self.inner.lock().unwrap().create_calls.clone()
    }

    pub fn delete_calls(&self) -> Vec<Handle> {
        self.inner.lock().unwrap().delete_calls.clone()
    }

    pub fn list_calls(&self) -> u32 {
        self.inner.lock().unwrap().list_calls
    }

    pub fn fetches_of(&self, name: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .created
            .iter()
            .filter(|c| c.handle.name == name)
            .map(|c| c.fetches)
            .sum()
    }
}

fn snapshot(created: &Created, script: Script) -> ResourceState {
    let spec = &created.spec;
    let status = script.pinned.unwrap_or(if created.fetches >= script.ready_after {
        ResourceStatus::Active
    } else {
        ResourceStatus::Pending
    });
    let param = |key: &str| spec.str_param(key).unwrap_or_default().to_string();
    let details = match spec.kind {
        ResourceKind::Server => {
            let addressed = status == ResourceStatus::Active
                && created.fetches >= script.ready_after + script.address_after;
            ResourceDetails::Server(ServerDetails {
                flavor_id: param(params::FLAVOR_ID),
                image_id: param(params::IMAGE_ID),
                ipv4: if addressed {
                    format!("10.0.0.{}", created.handle.id.trim_start_matches("id-"))
                } else {
                    String::new()
                },
                ipv6: if addressed {
                    format!("2001:db8::{}", created.handle.id.trim_start_matches("id-"))
                } else {
                    String::new()
                },
                username: "root".to_string(),
                password: format!("pw-{}", created.handle.id),
            })
        }
        ResourceKind::Image => ResourceDetails::Image(ImageDetails {
            source_server_id: param(params::SERVER_ID),
            flavor_id: String::new(),
        }),
        ResourceKind::Container => {
            let public = spec.param::<bool>(params::PUBLIC).unwrap_or(false);
            ResourceDetails::Container(ContainerDetails {
                public,
                public_url: public.then(|| format!("https://{}.cdn.example.net", spec.name)),
            })
        }
        ResourceKind::Object => ResourceDetails::Object(ObjectDetails {
            container: param(params::CONTAINER),
            content_type: param(params::CONTENT_TYPE),
            size: param(params::BODY).len() as u64,
        }),
        ResourceKind::Zone => ResourceDetails::Zone(ZoneDetails {
            domain: spec.name.clone(),
            email: spec.str_param(params::EMAIL).map(str::to_string),
        }),
        ResourceKind::Record => ResourceDetails::Record(RecordDetails {
            zone_id: param(params::ZONE_ID),
            record_type: param(params::RECORD_TYPE),
            value: param(params::VALUE),
            ttl: 300,
        }),
    };
    ResourceState::new(created.handle.id.clone(), spec.name.clone(), details).with_status(status)
}

#[async_trait]
impl ResourceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create(&self, spec: &ResourceSpec) -> cloudstage_provider::Result<Handle> {
        let mut inner = self.inner.lock().unwrap();
        inner.create_calls.push(spec.clone());
        if inner.fail_create.contains(&spec.name) {
            return Err(ProviderError::Api(format!("create of {} rejected", spec.name)));
        }
        if inner.conflicts.contains(&spec.name) {
            return Err(ProviderError::Conflict {
                kind: spec.kind,
                name: spec.name.clone(),
            });
        }
        inner.next_id += 1;
        let handle = Handle::new(spec.kind, format!("id-{}", inner.next_id), spec.name.clone());
        inner.created.push(Created {
            handle: handle.clone(),
            spec: spec.clone(),
            fetches: 0,
        });
        Ok(handle)
    }

    async fn fetch(&self, handle: &Handle) -> cloudstage_provider::Result<ResourceState> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_fetch.contains(&handle.name) {
            return Err(ProviderError::Api(format!("fetch of {} unavailable", handle.name)));
        }
        let script = inner
            .scripts
            .get(&handle.name)
            .copied()
            .unwrap_or_default();
        let created = inner
            .created
            .iter_mut()
            .find(|c| c.handle.id == handle.id)
            .ok_or_else(|| ProviderError::NotFound(handle.id.clone()))?;
        created.fetches += 1;
        Ok(snapshot(created, script))
    }

    async fn list(&self, kind: ResourceKind) -> cloudstage_provider::Result<Vec<ResourceState>> {
        let mut inner = self.inner.lock().unwrap();
        inner.list_calls += 1;
        Ok(inner
            .listed
            .iter()
            .filter(|s| s.kind() == kind)
            .cloned()
            .collect())
    }

    async fn delete(&self, handle: &Handle) -> cloudstage_provider::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.delete_calls.push(handle.clone());
        if inner.fail_delete.contains(&handle.name) {
            return Err(ProviderError::Api(format!("delete of {} rejected", handle.name)));
        }
        inner.created.retain(|c| c.handle.id != handle.id);
        Ok(())
    }
}
