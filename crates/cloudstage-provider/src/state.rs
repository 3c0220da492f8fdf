//! Provider-reported resource snapshots
//!
//! A [`ResourceState`] is a point-in-time view returned by
//! [`ResourceProvider::fetch`](crate::ResourceProvider::fetch) or
//! [`ResourceProvider::list`](crate::ResourceProvider::list). It is never
//! patched locally; callers discard it and fetch again.

use crate::provider::Handle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of provider-managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Server,
    Image,
    Container,
    Object,
    Zone,
    Record,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Server,
        ResourceKind::Image,
        ResourceKind::Container,
        ResourceKind::Object,
        ResourceKind::Zone,
        ResourceKind::Record,
    ];
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Server => write!(f, "server"),
            ResourceKind::Image => write!(f, "image"),
            ResourceKind::Container => write!(f, "container"),
            ResourceKind::Object => write!(f, "object"),
            ResourceKind::Zone => write!(f, "zone"),
            ResourceKind::Record => write!(f, "record"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" | "servers" => Ok(ResourceKind::Server),
            "image" | "images" => Ok(ResourceKind::Image),
            "container" | "containers" => Ok(ResourceKind::Container),
            "object" | "objects" => Ok(ResourceKind::Object),
            "zone" | "zones" => Ok(ResourceKind::Zone),
            "record" | "records" => Ok(ResourceKind::Record),
            other => Err(format!("unknown resource kind: {}", other)),
        }
    }
}

/// Lifecycle status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Accepted by the provider, still building
    Pending,
    /// Usable
    Active,
    /// Provider gave up on the resource
    Error,
    /// Resource has been deleted
    Deleted,
    /// Status is unknown
    Unknown,
}

impl ResourceStatus {
    /// Statuses from which a resource never becomes active
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceStatus::Error | ResourceStatus::Deleted)
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Pending => write!(f, "pending"),
            ResourceStatus::Active => write!(f, "active"),
            ResourceStatus::Error => write!(f, "error"),
            ResourceStatus::Deleted => write!(f, "deleted"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Server network assignment and login credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDetails {
    pub flavor_id: String,
    pub image_id: String,
    /// Empty until the provider assigns a public address
    pub ipv4: String,
    pub ipv6: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDetails {
    pub source_server_id: String,
    pub flavor_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub public: bool,
    /// CDN URL, only for public containers
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDetails {
    pub container: String,
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneDetails {
    pub domain: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDetails {
    pub zone_id: String,
    pub record_type: String,
    pub value: String,
    pub ttl: u32,
}

/// Kind-specific payload of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceDetails {
    Server(ServerDetails),
    Image(ImageDetails),
    Container(ContainerDetails),
    Object(ObjectDetails),
    Zone(ZoneDetails),
    Record(RecordDetails),
}

impl ResourceDetails {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDetails::Server(_) => ResourceKind::Server,
            ResourceDetails::Image(_) => ResourceKind::Image,
            ResourceDetails::Container(_) => ResourceKind::Container,
            ResourceDetails::Object(_) => ResourceKind::Object,
            ResourceDetails::Zone(_) => ResourceKind::Zone,
            ResourceDetails::Record(_) => ResourceKind::Record,
        }
    }

    /// Whether every field a dependent stage may read is populated
    pub fn is_complete(&self) -> bool {
        match self {
            ResourceDetails::Server(s) => !s.ipv4.is_empty(),
            ResourceDetails::Image(_) | ResourceDetails::Object(_) => true,
            ResourceDetails::Container(c) => {
                !c.public || c.public_url.as_deref().is_some_and(|u| !u.is_empty())
            }
            ResourceDetails::Zone(z) => !z.domain.is_empty(),
            ResourceDetails::Record(r) => !r.value.is_empty(),
        }
    }
}

/// Snapshot of a single resource as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-specific resource ID
    pub id: String,

    pub name: String,

    pub status: ResourceStatus,

    pub details: ResourceDetails,

    /// When this snapshot was taken
    pub fetched_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, name: impl Into<String>, details: ResourceDetails) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ResourceStatus::Unknown,
            details,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.details.kind()
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.kind(), self.id.clone(), self.name.clone())
    }

    /// Active with every kind-specific field populated.
    ///
    /// A server reported active before its address is assigned is not usable.
    pub fn is_usable(&self) -> bool {
        self.status == ResourceStatus::Active && self.details.is_complete()
    }

    pub fn server(&self) -> Option<&ServerDetails> {
        match &self.details {
            ResourceDetails::Server(s) => Some(s),
            _ => None,
        }
    }

    pub fn container(&self) -> Option<&ContainerDetails> {
        match &self.details {
            ResourceDetails::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn record(&self) -> Option<&RecordDetails> {
        match &self.details {
            ResourceDetails::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Look up a named output field; empty values count as absent
    pub fn field(&self, name: &str) -> Option<String> {
        let value = match (name, &self.details) {
            ("id", _) => self.id.clone(),
            ("name", _) => self.name.clone(),
            ("status", _) => self.status.to_string(),
            ("ipv4", ResourceDetails::Server(s)) => s.ipv4.clone(),
            ("ipv6", ResourceDetails::Server(s)) => s.ipv6.clone(),
            ("username", ResourceDetails::Server(s)) => s.username.clone(),
            ("password", ResourceDetails::Server(s)) => s.password.clone(),
            ("flavor_id", ResourceDetails::Server(s)) => s.flavor_id.clone(),
            ("image_id", ResourceDetails::Server(s)) => s.image_id.clone(),
            ("flavor_id", ResourceDetails::Image(i)) => i.flavor_id.clone(),
            ("source_server_id", ResourceDetails::Image(i)) => i.source_server_id.clone(),
            ("public_url", ResourceDetails::Container(c)) => c.public_url.clone()?,
            ("container", ResourceDetails::Object(o)) => o.container.clone(),
            ("domain", ResourceDetails::Zone(z)) => z.domain.clone(),
            ("zone_id", ResourceDetails::Record(r)) => r.zone_id.clone(),
            ("record_type", ResourceDetails::Record(r)) => r.record_type.clone(),
            ("value", ResourceDetails::Record(r)) => r.value.clone(),
            _ => return None,
        };
        if value.is_empty() { None } else { Some(value) }
    }
}
