//! Decides, cheaply, whether a reload should run before serving a request.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::loader::AgentLoader;
use super::registry::AgentRegistry;
use super::source::{Collection, RELOAD_MARKER};

struct SchedulerState {
    /// Updated only when a reload actually completes.
    last_loaded_at: DateTime<Utc>,
    /// Updated on every check regardless of outcome, bounding probe rate.
    last_checked_at: DateTime<Utc>,
}

/// Process-wide reload policy: probe at most once per `check_interval`,
/// reload unconditionally after `force_interval`, and in between honor the
/// freshness marker written by the agent-authoring tools.
///
/// The state lock is held across an entire reload, so concurrent requests
/// cannot run duplicate passes.
pub struct ReloadScheduler {
    state: Mutex<SchedulerState>,
    check_interval: Duration,
    force_interval: Duration,
}

impl ReloadScheduler {
    pub fn new(check_interval_secs: u64, force_interval_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            state: Mutex::new(SchedulerState {
                last_loaded_at: now,
                last_checked_at: now,
            }),
            check_interval: Duration::seconds(check_interval_secs as i64),
            force_interval: Duration::seconds(force_interval_secs as i64),
        }
    }

    /// Stamp the completion of an externally-run load pass (process start).
    pub async fn mark_loaded(&self) {
        let mut state = self.state.lock().await;
        state.last_loaded_at = Utc::now();
    }

    pub async fn last_loaded_at(&self) -> DateTime<Utc> {
        self.state.lock().await.last_loaded_at
    }

    /// Per-request check. Returns whether a reload was performed (and the
    /// registry swapped).
    pub async fn check_and_reload(&self, loader: &AgentLoader, registry: &AgentRegistry) -> bool {
        self.check_and_reload_at(Utc::now(), loader, registry).await
    }

    /// Same as [`check_and_reload`](Self::check_and_reload) with an explicit
    /// clock, so callers controlling time get deterministic behavior.
    pub async fn check_and_reload_at(
        &self,
        now: DateTime<Utc>,
        loader: &AgentLoader,
        registry: &AgentRegistry,
    ) -> bool {
        let mut state = self.state.lock().await;

        if now.signed_duration_since(state.last_checked_at) < self.check_interval {
            return false;
        }
        state.last_checked_at = now;

        let since_load = now.signed_duration_since(state.last_loaded_at);
        let mut marker_seen = false;
        let mut reload = since_load > self.force_interval;
        if !reload {
            reload = self.marker_is_newer(loader, state.last_loaded_at).await;
            marker_seen = reload;
        }
        if !reload {
            return false;
        }

        info!(
            forced = since_load > self.force_interval,
            marker = marker_seen,
            since_load_secs = since_load.num_seconds(),
            "reloading agents"
        );
        let reloaded = self.run_reload(&mut state, now, loader, registry).await;
        if reloaded && marker_seen {
            self.clear_marker(loader).await;
        }
        reloaded
    }

    /// Unconditional reload, bypassing the rate limit. Used for dispatch
    /// cache misses and the operator endpoint.
    pub async fn force_reload(&self, loader: &AgentLoader, registry: &AgentRegistry) -> bool {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.last_checked_at = now;
        self.run_reload(&mut state, now, loader, registry).await
    }

    /// Run a full pass and swap the registry only if it produced anything.
    /// An empty result implies a systemic fetch problem; the old registry
    /// stays live and `last_loaded_at` is not advanced, so the next check
    /// interval retries.
    async fn run_reload(
        &self,
        state: &mut SchedulerState,
        now: DateTime<Utc>,
        loader: &AgentLoader,
        registry: &AgentRegistry,
    ) -> bool {
        let agents = loader.reload().await;
        if agents.is_empty() {
            warn!("reload produced no agents; keeping previous registry");
            return false;
        }

        let old_count = registry.len().await;
        let new_count = agents.len();
        registry.swap(agents).await;
        state.last_loaded_at = now;

        if old_count != new_count {
            info!(old_count, new_count, "agent count changed after reload");
        } else {
            debug!(count = new_count, "agents reloaded");
        }
        true
    }

    /// Probe the freshness marker. An unreadable or unparseable marker means
    /// "no signal", never an error.
    async fn marker_is_newer(&self, loader: &AgentLoader, loaded_at: DateTime<Utc>) -> bool {
        let content = match loader
            .store()
            .read(Collection::RemoteAgents, RELOAD_MARKER)
            .await
        {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return false,
            Err(e) => {
                debug!("failed to probe reload marker: {e}");
                return false;
            }
        };

        let text = String::from_utf8_lossy(&content);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return false;
        }
        match DateTime::parse_from_rfc3339(trimmed) {
            Ok(marker_time) => {
                let newer = marker_time.with_timezone(&Utc) > loaded_at;
                if newer {
                    info!(marker = %trimmed, "reload marker is newer than last load");
                }
                newer
            }
            Err(e) => {
                debug!(marker = %trimmed, "unparseable reload marker: {e}");
                false
            }
        }
    }

    /// Blank the marker after acting on it, best-effort.
    async fn clear_marker(&self, loader: &AgentLoader) {
        if let Err(e) = loader
            .store()
            .write(Collection::RemoteAgents, RELOAD_MARKER, bytes::Bytes::new())
            .await
        {
            debug!("failed to clear reload marker: {e}");
        }
    }
}
