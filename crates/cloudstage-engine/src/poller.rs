//! Readiness polling
//!
//! Fetches a resource at a fixed interval until a readiness predicate holds
//! or the timeout budget is spent. Every wait is bounded.

use crate::error::{ProvisionError, Result};
use cloudstage_provider::{Handle, ResourceProvider, ResourceState, ResourceStatus};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval and overall budget for one readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    interval: Duration,
    timeout: Duration,
}

impl PollConfig {
    /// Rejects a zero interval
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(ProvisionError::InvalidPollConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self { interval, timeout })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Predicate deciding whether a snapshot is usable by dependent stages
#[derive(Clone)]
pub struct Readiness {
    label: &'static str,
    check: Arc<dyn Fn(&ResourceState) -> bool + Send + Sync>,
}

impl Readiness {
    pub fn new(
        label: &'static str,
        check: impl Fn(&ResourceState) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            label,
            check: Arc::new(check),
        }
    }

    /// Active and every kind-specific field populated.
    ///
    /// For a server this means an IPv4 address has been assigned; network
    /// assignment can lag the status transition.
    pub fn usable() -> Self {
        Self::new("usable", ResourceState::is_usable)
    }

    /// Status is active, nothing else checked
    pub fn active() -> Self {
        Self::new("active", |state| state.status == ResourceStatus::Active)
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_ready(&self, state: &ResourceState) -> bool {
        (self.check)(state)
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::usable()
    }
}

impl std::fmt::Debug for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Readiness").field(&self.label).finish()
    }
}

/// Wait until `readiness` holds for the resource behind `handle`.
///
/// Fetches immediately, then every `interval`. Once the elapsed time since
/// the call reaches `timeout` the last observed state is returned inside
/// [`ProvisionError::Timeout`]. A resource that reports `Error` or
/// `Deleted` fails immediately with [`ProvisionError::ResourceFailed`].
/// Cancellation is observed before each fetch and during each sleep; an
/// in-flight fetch is never interrupted.
pub async fn wait_until_ready(
    provider: &dyn ResourceProvider,
    handle: &Handle,
    readiness: &Readiness,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<ResourceState> {
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }

        attempt += 1;
        let state = provider.fetch(handle).await?;
        debug!(
            resource = %handle,
            attempt,
            status = %state.status,
            predicate = readiness.label(),
            "polled resource"
        );

        if readiness.is_ready(&state) {
            return Ok(state);
        }
        if state.status.is_terminal() {
            return Err(ProvisionError::ResourceFailed {
                state: Box::new(state),
            });
        }

        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            return Err(ProvisionError::Timeout {
                handle: handle.clone(),
                waited: elapsed,
                last_state: Box::new(state),
            });
        }

        // never sleep past the deadline
        let pause = config.interval.min(config.timeout - elapsed);
        tokio::select! {
            _ = sleep(pause) => {}
            _ = cancel.cancelled() => return Err(ProvisionError::Cancelled),
        }
    }
}

/// Wait for several independent resources concurrently.
///
/// Results come back in `handles` order. The first failure cancels the
/// remaining waits; the error reported is the first non-cancellation error
/// in request order.
pub async fn wait_until_all_ready(
    provider: &dyn ResourceProvider,
    handles: &[Handle],
    readiness: &Readiness,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<Vec<ResourceState>> {
    let group = cancel.child_token();

    let waits = handles.iter().map(|handle| {
        let group = group.clone();
        async move {
            let result = wait_until_ready(provider, handle, readiness, config, &group).await;
            if result.is_err() {
                group.cancel();
            }
            result
        }
    });
    let results = join_all(waits).await;

    let mut states = Vec::with_capacity(results.len());
    let mut cancelled = false;
    for result in results {
        match result {
            Ok(state) => states.push(state),
            Err(ProvisionError::Cancelled) => cancelled = true,
            Err(err) => return Err(err),
        }
    }
    if cancelled {
        return Err(ProvisionError::Cancelled);
    }
    Ok(states)
}
