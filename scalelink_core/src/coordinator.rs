//! Owns every scale connection of a station and keeps the set in line with
//! the local working set and the server's authoritative configuration.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use scalelink_config::{ScaleConfig, ScaleSet};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval_at;

use crate::config::CoordinatorCfg;
use crate::connection::{LinkDeps, ScaleConnection};
use crate::fingerprint::{Fingerprint, fingerprint};
use crate::session::StationSession;
use crate::state::ScaleRuntimeState;

/// Snapshot returned by `AcquisitionCoordinator::status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStatus {
    pub running: bool,
    pub station_id: String,
    pub server_url: String,
    pub scales: Vec<ScaleRuntimeState>,
}

struct Inner {
    running: bool,
    session: Arc<StationSession>,
    connections: Vec<ScaleConnection>,
    fingerprint: Option<Fingerprint>,
    poll_task: Option<JoinHandle<()>>,
}

struct Shared {
    deps: LinkDeps,
    config_poll: std::time::Duration,
    /// Local scales; only those in the work zone are started.
    local: ScaleSet,
    inner: Mutex<Inner>,
}

/// Cheap to clone; clones drive the same coordinator.
#[derive(Clone)]
pub struct AcquisitionCoordinator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AcquisitionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionCoordinator")
            .field("running", &self.is_running())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

impl AcquisitionCoordinator {
    pub fn new(
        cfg: CoordinatorCfg,
        session: StationSession,
        local: ScaleSet,
        deps: LinkDeps,
    ) -> Self {
        let deps = LinkDeps {
            link: cfg.link,
            ..deps
        };
        Self {
            shared: Arc::new(Shared {
                deps,
                config_poll: cfg.config_poll,
                local,
                inner: Mutex::new(Inner {
                    running: false,
                    session: Arc::new(session),
                    connections: Vec::new(),
                    fingerprint: None,
                    poll_task: None,
                }),
            }),
        }
    }

    /// Start local working scales, apply the remote config once, then keep
    /// polling it. No-op if already running.
    pub async fn start(&self) {
        {
            let Some(mut inner) = self.shared.lock() else {
                return;
            };
            if inner.running {
                return;
            }
            inner.running = true;
            tracing::info!(
                station_id = %inner.session.station_id,
                server_url = %inner.session.server_url,
                "starting acquisition"
            );
            let working: Vec<ScaleConfig> = self.shared.local.working().cloned().collect();
            self.shared.start_connections(&mut inner, working);
        }

        let applied = self.shared.apply_config().await;
        if !applied && self.connection_count() == 0 {
            tracing::warn!("no remote config and no local scales in the work zone");
        }

        let handle = tokio::spawn(poll_config(
            Arc::downgrade(&self.shared),
            self.shared.config_poll,
        ));
        match self.shared.lock() {
            Some(mut inner) if inner.running && inner.poll_task.is_none() => {
                inner.poll_task = Some(handle);
            }
            // stopped (or restarted) while the first fetch was in flight
            _ => handle.abort(),
        }
    }

    /// Fetch the remote config and rebuild connections if it changed.
    /// Returns whether a usable config was obtained.
    pub async fn apply_config(&self) -> bool {
        self.shared.apply_config().await
    }

    /// Cancel config polling and destroy every connection. Idempotent.
    pub fn stop(&self) {
        let Some(mut inner) = self.shared.lock() else {
            return;
        };
        if !inner.running {
            return;
        }
        inner.running = false;
        tracing::info!("stopping acquisition");
        if let Some(task) = inner.poll_task.take() {
            task.abort();
        }
        Shared::destroy_all(&mut inner);
        inner.fingerprint = None;
    }

    pub fn status(&self) -> CoordinatorStatus {
        match self.shared.lock() {
            Some(inner) => CoordinatorStatus {
                running: inner.running,
                station_id: inner.session.station_id.clone(),
                server_url: inner.session.server_url.clone(),
                scales: inner.connections.iter().map(ScaleConnection::state).collect(),
            },
            None => CoordinatorStatus {
                running: false,
                station_id: String::new(),
                server_url: String::new(),
                scales: Vec::new(),
            },
        }
    }

    /// State changes of every connection, current and future.
    pub fn subscribe(&self) -> broadcast::Receiver<ScaleRuntimeState> {
        self.shared.deps.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().is_some_and(|i| i.running)
    }

    pub fn connection_count(&self) -> usize {
        self.shared.lock().map_or(0, |i| i.connections.len())
    }

    pub fn session(&self) -> Option<Arc<StationSession>> {
        self.shared.lock().map(|i| Arc::clone(&i.session))
    }

    /// Destroy a single connection, leaving its siblings untouched.
    pub fn destroy_scale(&self, scale_id: &str) -> bool {
        let Some(mut inner) = self.shared.lock() else {
            return false;
        };
        let Some(idx) = inner
            .connections
            .iter()
            .position(|c| c.scale_id() == scale_id)
        else {
            return false;
        };
        let conn = inner.connections.remove(idx);
        conn.destroy();
        true
    }
}

impl Shared {
    fn lock(&self) -> Option<MutexGuard<'_, Inner>> {
        match self.inner.lock() {
            Ok(g) => Some(g),
            Err(e) => {
                tracing::error!(error = %e, "coordinator state poisoned");
                None
            }
        }
    }

    fn start_connections(&self, inner: &mut Inner, scales: Vec<ScaleConfig>) {
        for cfg in scales {
            tracing::info!(scale_id = %cfg.scale_id, port = %cfg.port, "starting scale");
            let conn = ScaleConnection::new(cfg, Arc::clone(&inner.session), self.deps.clone());
            conn.connect();
            inner.connections.push(conn);
        }
    }

    fn destroy_all(inner: &mut Inner) {
        for conn in inner.connections.drain(..) {
            conn.destroy();
        }
    }

    async fn apply_config(&self) -> bool {
        let Some(remote) = self.deps.api.fetch_config().await else {
            tracing::warn!("no valid remote config");
            return false;
        };
        let Some(set) = remote.usable_scales() else {
            tracing::warn!("remote config has no usable scales");
            return false;
        };
        let fp = fingerprint(set.iter());

        let Some(mut inner) = self.lock() else {
            return false;
        };
        if !inner.running {
            return true;
        }
        if inner.fingerprint.as_ref() == Some(&fp) {
            tracing::debug!(fingerprint = %fp, "remote config unchanged");
            return true;
        }

        tracing::info!(fingerprint = %fp, scales = set.len(), "remote config changed, restarting connections");
        inner.fingerprint = Some(fp);
        if let Some(id) = remote.station_id.filter(|id| !id.is_empty())
            && id != inner.session.station_id
        {
            inner.session = Arc::new(inner.session.with_station_id(id));
        }
        Self::destroy_all(&mut inner);
        self.start_connections(&mut inner, set.into_vec());
        true
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.get_mut()
            && let Some(task) = inner.poll_task.take()
        {
            task.abort();
        }
    }
}

async fn poll_config(shared: Weak<Shared>, period: std::time::Duration) {
    let mut iv = interval_at(tokio::time::Instant::now() + period, period);
    loop {
        iv.tick().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        tracing::debug!("checking remote config");
        shared.apply_config().await;
    }
}
