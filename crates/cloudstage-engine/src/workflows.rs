//! Prebuilt provisioning workflows
//!
//! Each function returns an ordinary stage list for
//! [`WorkflowEngine::run`](crate::WorkflowEngine::run). Stage ids are stable
//! so callers can read results back by id (`"servers"`, `"server"`,
//! `"record"`, ...).

use crate::error::{ProvisionError, Result};
use crate::poller::{PollConfig, Readiness};
use crate::stage::{ConflictPolicy, DeleteResources, Stage};
use cloudstage_provider::{
    ResourceKind, ResourceProvider, ResourceSpec, ResourceState, params,
};
use std::net::IpAddr;
use std::time::Duration;

/// Poll settings per resource family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollProfile {
    pub server: PollConfig,
    pub image: PollConfig,
    pub storage: PollConfig,
}

impl PollProfile {
    pub fn new(
        interval: Duration,
        server_timeout: Duration,
        image_timeout: Duration,
    ) -> Result<Self> {
        let base = PollConfig::new(interval, server_timeout)?;
        Ok(Self {
            server: base,
            image: base.with_timeout(image_timeout),
            storage: base.with_timeout(Duration::from_secs(120)),
        })
    }
}

impl Default for PollProfile {
    fn default() -> Self {
        let base = PollConfig::default();
        Self {
            server: base.with_timeout(Duration::from_secs(1200)),
            image: base.with_timeout(Duration::from_secs(3600)),
            storage: base.with_timeout(Duration::from_secs(120)),
        }
    }
}

/// A fully qualified host name such as `www.example.com`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fqdn {
    name: String,
    domain: String,
}

impl Fqdn {
    /// Needs at least three labels; the zone is the last two
    pub fn parse(input: &str) -> Result<Self> {
        let name = input.trim().trim_end_matches('.').to_ascii_lowercase();
        let labels: Vec<&str> = name.split('.').collect();
        if labels.len() < 3 || labels.iter().any(|l| l.is_empty()) {
            return Err(ProvisionError::validation(format!(
                "{} is not a valid fully qualified domain name",
                input
            )));
        }
        let domain = labels[labels.len() - 2..].join(".");
        Ok(Self { name, domain })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl std::fmt::Display for Fqdn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// How to find an existing resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Name(String),
    Id(String),
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Name(name) => write!(f, "named '{}'", name),
            Locator::Id(id) => write!(f, "with id '{}'", id),
        }
    }
}

/// Resolve an existing resource from the provider's live listing
pub async fn locate(
    provider: &dyn ResourceProvider,
    kind: ResourceKind,
    locator: &Locator,
) -> Result<ResourceState> {
    provider
        .list(kind)
        .await?
        .into_iter()
        .find(|state| match locator {
            Locator::Name(name) => &state.name == name,
            Locator::Id(id) => &state.id == id,
        })
        .ok_or_else(|| ProvisionError::validation(format!("no {} {}", kind, locator)))
}

/// `count` identical servers named `<base>1..<base>N`, created concurrently
pub fn server_batch(
    base: &str,
    count: usize,
    flavor: &str,
    image: &str,
    profile: &PollProfile,
) -> Result<Vec<Stage>> {
    if count == 0 {
        return Err(ProvisionError::validation("server count must be at least 1"));
    }
    let base = base.to_string();
    let flavor = flavor.to_string();
    let image = image.to_string();

    Ok(vec![
        Stage::provision("servers", move |_| {
            Ok((1..=count)
                .map(|i| ResourceSpec::server(format!("{}{}", base, i), &flavor, &image))
                .collect())
        })
        .poll(profile.server)
        .cleanup(DeleteResources),
    ])
}

/// Image `source`, build `dest` from that image, optionally drop the image.
///
/// The image gets a unique `<source>.<suffix>` name. When the image is kept
/// it is not cleaned up if the new server fails.
pub fn clone_server(
    source: &ResourceState,
    dest: &str,
    delete_image: bool,
    profile: &PollProfile,
) -> Result<Vec<Stage>> {
    let flavor = source.field("flavor_id").ok_or_else(|| {
        ProvisionError::validation(format!("server '{}' has no flavor_id", source.name))
    })?;
    let source_name = source.name.clone();
    let source_id = source.id.clone();
    let dest = dest.to_string();

    let mut image = Stage::provision("image", move |_| {
        Ok(vec![ResourceSpec::image(&source_name, &source_id)])
    })
    .unique_names()
    .readiness(Readiness::active())
    .poll(profile.image);
    if delete_image {
        image = image.cleanup(DeleteResources);
    }

    let mut stages = vec![
        image,
        Stage::provision("server", move |inputs| {
            Ok(vec![ResourceSpec::server(
                &dest,
                &flavor,
                inputs.field("image", "id")?,
            )])
        })
        .depends_on(["image"])
        .poll(profile.server)
        .cleanup(DeleteResources),
    ];
    if delete_image {
        stages.push(Stage::delete("delete-image", "image").best_effort());
    }
    Ok(stages)
}

/// A server named after `fqdn` plus an A record pointing at it.
///
/// The zone must already exist.
pub fn server_with_dns(
    fqdn: &Fqdn,
    flavor: &str,
    image: &str,
    profile: &PollProfile,
) -> Vec<Stage> {
    let host = fqdn.name().to_string();
    let record_host = host.clone();
    let flavor = flavor.to_string();
    let image = image.to_string();

    vec![
        Stage::ensure("zone", ResourceKind::Zone, fqdn.domain()),
        Stage::provision("server", move |_| {
            Ok(vec![ResourceSpec::server(&host, &flavor, &image)])
        })
        .poll(profile.server)
        .cleanup(DeleteResources),
        Stage::provision("record", move |inputs| {
            Ok(vec![ResourceSpec::record(
                inputs.field("zone", "id")?,
                &record_host,
                "A",
                inputs.field("server", "ipv4")?,
            )])
        })
        .depends_on(["zone", "server"])
        .on_conflict(ConflictPolicy::Tolerate)
        .poll(profile.storage),
    ]
}

/// An A or AAAA record for `fqdn`, depending on the address family.
///
/// With `zone_email` set a missing zone is created first.
pub fn dns_record(
    fqdn: &Fqdn,
    address: &str,
    zone_email: Option<String>,
    profile: &PollProfile,
) -> Result<Vec<Stage>> {
    let ip: IpAddr = address.trim().parse().map_err(|_| {
        ProvisionError::validation(format!("{} is not a valid IP address", address))
    })?;
    let record_type = if ip.is_ipv4() { "A" } else { "AAAA" };
    let host = fqdn.name().to_string();
    let domain = fqdn.domain().to_string();

    let mut zone = Stage::ensure("zone", ResourceKind::Zone, &domain).poll(profile.storage);
    if let Some(email) = zone_email {
        zone = zone.or_create(move |_| Ok(vec![ResourceSpec::zone(&domain, Some(email.clone()))]));
    }

    Ok(vec![
        zone,
        Stage::provision("record", move |inputs| {
            Ok(vec![ResourceSpec::record(
                inputs.field("zone", "id")?,
                &host,
                record_type,
                ip.to_string(),
            )])
        })
        .depends_on(["zone"])
        .on_conflict(ConflictPolicy::Tolerate)
        .poll(profile.storage),
    ])
}

fn cdn_container(name: &str, index: Option<&str>, profile: &PollProfile) -> Stage {
    let name = name.to_string();
    let index = index.map(str::to_string);
    Stage::provision("container", move |_| {
        let spec = ResourceSpec::container(&name, true);
        Ok(vec![match &index {
            Some(index) => spec.with_param(
                params::METADATA,
                serde_json::json!({ "web-index": index }),
            ),
            None => spec,
        }])
    })
    .on_conflict(ConflictPolicy::Fail)
    .poll(profile.storage)
    .cleanup(DeleteResources)
}

/// A CDN-enabled container; an existing one with the same name is a failure
pub fn public_container(name: &str, profile: &PollProfile) -> Vec<Stage> {
    vec![cdn_container(name, None, profile)]
}

/// Static website: public container, index page, CNAME to the CDN host
pub fn static_site(
    container: &str,
    fqdn: &Fqdn,
    index_name: &str,
    body: &str,
    profile: &PollProfile,
) -> Vec<Stage> {
    let container_name = container.to_string();
    let index_name = index_name.to_string();
    let body = body.to_string();
    let host = fqdn.name().to_string();

    vec![
        Stage::ensure("zone", ResourceKind::Zone, fqdn.domain()),
        cdn_container(container, Some(&index_name), profile),
        Stage::provision("index", move |_| {
            Ok(vec![ResourceSpec::object(
                &container_name,
                &index_name,
                &body,
                "text/html",
            )])
        })
        .depends_on(["container"])
        .poll(profile.storage)
        .cleanup(DeleteResources),
        Stage::provision("record", move |inputs| {
            let url = inputs.field("container", "public_url")?;
            Ok(vec![ResourceSpec::record(
                inputs.field("zone", "id")?,
                &host,
                "CNAME",
                url_host(&url)?,
            )])
        })
        .depends_on(["zone", "container"])
        .on_conflict(ConflictPolicy::Tolerate)
        .poll(profile.storage),
    ]
}

fn url_host(url: &str) -> Result<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = rest.split(['/', '?']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(ProvisionError::validation(format!(
            "public URL '{}' has no host",
            url
        )));
    }
    Ok(host.to_string())
}
