//! The explicit application context: config snapshot, remote client and the
//! acquisition coordinator, with an `init`/`shutdown` lifecycle.

use std::sync::Arc;

use scalelink_config::{Config, ScaleSet};
use scalelink_traits::{Clock, SerialOpener};
use tokio::sync::broadcast;

use crate::clock::TokioClock;
use crate::config::CoordinatorCfg;
use crate::connection::LinkDeps;
use crate::coordinator::{AcquisitionCoordinator, CoordinatorStatus};
use crate::error::{BuildError, RemoteError};
use crate::remote::SyncApi;
use crate::session::StationSession;
use crate::state::ScaleRuntimeState;

/// Capacity of the state-change broadcast; slow subscribers lag, they never
/// block a connection.
pub const EVENT_CAPACITY: usize = 256;

pub struct Station {
    config: Config,
    api: Arc<dyn SyncApi>,
    coordinator: AcquisitionCoordinator,
}

impl std::fmt::Debug for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("station_id", &self.config.station.station_id)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct StationBuilder {
    config: Option<Config>,
    api: Option<Arc<dyn SyncApi>>,
    opener: Option<Arc<dyn SerialOpener>>,
    clock: Option<Arc<dyn Clock>>,
}

impl StationBuilder {
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_api(mut self, api: Arc<dyn SyncApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_opener(mut self, opener: Arc<dyn SerialOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Defaults to the tokio clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Station, BuildError> {
        let config = self.config.ok_or(BuildError::MissingConfig)?;
        let api = self.api.ok_or(BuildError::MissingApi)?;
        let opener = self.opener.ok_or(BuildError::MissingOpener)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock));

        config
            .validate()
            .map_err(|e| BuildError::InvalidConfig(e.to_string()))?;
        let local = config
            .scale_set()
            .map_err(|e| BuildError::InvalidConfig(e.to_string()))?;

        let cfg = CoordinatorCfg::from(&config.tuning);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let deps = LinkDeps {
            opener,
            api: Arc::clone(&api),
            clock,
            events,
            link: cfg.link,
        };
        let coordinator =
            AcquisitionCoordinator::new(cfg, StationSession::from(&config.station), local, deps);

        Ok(Station {
            config,
            api,
            coordinator,
        })
    }
}

impl Station {
    pub fn builder() -> StationBuilder {
        StationBuilder::default()
    }

    /// Start acquisition.
    pub async fn init(&self) {
        self.coordinator.start().await;
    }

    /// Stop acquisition and tell the server this station is going away.
    pub async fn shutdown(&self) {
        self.coordinator.stop();
        match self.api.disconnect().await {
            Ok(()) => tracing::info!("station disconnected"),
            Err(e) => tracing::warn!(error = %e, "disconnect notification failed"),
        }
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.coordinator.status()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScaleRuntimeState> {
        self.coordinator.subscribe()
    }

    pub fn coordinator(&self) -> &AcquisitionCoordinator {
        &self.coordinator
    }

    pub fn api(&self) -> &Arc<dyn SyncApi> {
        &self.api
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Push every scale's work-zone flag to the server. Failures are logged and
/// reported per scale.
pub async fn sync_zones(
    api: &dyn SyncApi,
    set: &ScaleSet,
) -> Vec<(String, Result<(), RemoteError>)> {
    let mut results = Vec::with_capacity(set.len());
    for scale in set.iter() {
        let r = api.set_zone(&scale.scale_id, scale.working).await;
        if let Err(e) = &r {
            tracing::warn!(scale_id = %scale.scale_id, error = %e, "zone sync failed");
        }
        results.push((scale.scale_id.clone(), r));
    }
    let synced = results.iter().filter(|(_, r)| r.is_ok()).count();
    tracing::info!(synced, total = results.len(), "zones synced");
    results
}
