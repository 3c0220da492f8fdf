//! Resource provider trait definition

use crate::error::Result;
use crate::state::{ResourceKind, ResourceState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Resource provider capability
///
/// The engine only ever submits (`create`, `delete`) and reads (`fetch`,
/// `list`). Implementations must map their own "already exists" failure
/// onto [`ProviderError::Conflict`](crate::ProviderError::Conflict).
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Returns the provider name (e.g., "sandbox")
    fn name(&self) -> &str;

    /// Submit a creation request.
    ///
    /// Returns as soon as the provider accepted the request; the real
    /// lifecycle status is only observable through [`fetch`](Self::fetch).
    async fn create(&self, spec: &ResourceSpec) -> Result<Handle>;

    /// Fetch the current state. Safe to call repeatedly, never cached.
    async fn fetch(&self, handle: &Handle) -> Result<ResourceState>;

    /// List all resources of a kind
    async fn list(&self, kind: ResourceKind) -> Result<Vec<ResourceState>>;

    async fn delete(&self, handle: &Handle) -> Result<()>;
}

/// Reference to a resource accepted by the provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub kind: ResourceKind,
    pub id: String,
    pub name: String,
}

impl Handle {
    pub fn new(kind: ResourceKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.name, self.id)
    }
}

/// Well-known creation parameter keys
pub mod params {
    pub const FLAVOR_ID: &str = "flavor_id";
    pub const IMAGE_ID: &str = "image_id";
    pub const SERVER_ID: &str = "server_id";
    pub const PUBLIC: &str = "public";
    pub const CONTAINER: &str = "container";
    pub const BODY: &str = "body";
    pub const CONTENT_TYPE: &str = "content_type";
    pub const EMAIL: &str = "email";
    pub const ZONE_ID: &str = "zone_id";
    pub const RECORD_TYPE: &str = "record_type";
    pub const VALUE: &str = "value";
    pub const TTL: &str = "ttl";
    pub const METADATA: &str = "metadata";
}

/// Creation parameters for one resource
///
/// Built by a workflow stage at execution time and submitted once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,

    pub name: String,

    /// Kind-specific parameters
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            params: serde_json::Map::new(),
        }
    }

    pub fn server(
        name: impl Into<String>,
        flavor_id: impl Into<String>,
        image_id: impl Into<String>,
    ) -> Self {
        Self::new(ResourceKind::Server, name)
            .with_param(params::FLAVOR_ID, flavor_id.into())
            .with_param(params::IMAGE_ID, image_id.into())
    }

    pub fn image(name: impl Into<String>, server_id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Image, name).with_param(params::SERVER_ID, server_id.into())
    }

    pub fn container(name: impl Into<String>, public: bool) -> Self {
        Self::new(ResourceKind::Container, name).with_param(params::PUBLIC, public)
    }

    pub fn object(
        container: impl Into<String>,
        name: impl Into<String>,
        body: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self::new(ResourceKind::Object, name)
            .with_param(params::CONTAINER, container.into())
            .with_param(params::BODY, body.into())
            .with_param(params::CONTENT_TYPE, content_type.into())
    }

    pub fn zone(domain: impl Into<String>, email: Option<String>) -> Self {
        let spec = Self::new(ResourceKind::Zone, domain);
        match email {
            Some(email) => spec.with_param(params::EMAIL, email),
            None => spec,
        }
    }

    pub fn record(
        zone_id: impl Into<String>,
        name: impl Into<String>,
        record_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(ResourceKind::Record, name)
            .with_param(params::ZONE_ID, zone_id.into())
            .with_param(params::RECORD_TYPE, record_type.into())
            .with_param(params::VALUE, value.into())
    }

    pub fn with_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get a parameter as a specific type
    pub fn param<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.params
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}
