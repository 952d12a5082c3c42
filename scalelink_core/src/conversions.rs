//! `From` implementations bridging `scalelink_config` types to core types.

use std::time::Duration;

use crate::config::{CoordinatorCfg, LinkCfg, StabilityCfg, SyncCfg};
use crate::session::StationSession;

impl From<&scalelink_config::Tuning> for StabilityCfg {
    fn from(t: &scalelink_config::Tuning) -> Self {
        Self {
            window_size: t.stability_window_size,
            threshold_kg: t.stability_threshold_kg,
            required: Duration::from_millis(t.stability_required_ms),
        }
    }
}

impl From<&scalelink_config::Tuning> for SyncCfg {
    fn from(t: &scalelink_config::Tuning) -> Self {
        Self {
            interval: Duration::from_millis(t.api_sync_interval_ms),
            heartbeat: Duration::from_millis(t.heartbeat_ms),
            rate_limit_backoff: Duration::from_millis(t.rate_limit_backoff_ms),
        }
    }
}

impl From<&scalelink_config::Tuning> for LinkCfg {
    fn from(t: &scalelink_config::Tuning) -> Self {
        Self {
            stability: t.into(),
            sync: t.into(),
            reconnect_interval: Duration::from_millis(t.reconnect_interval_ms),
        }
    }
}

impl From<&scalelink_config::Tuning> for CoordinatorCfg {
    fn from(t: &scalelink_config::Tuning) -> Self {
        Self {
            link: t.into(),
            config_poll: Duration::from_millis(t.config_poll_ms),
        }
    }
}

impl From<&scalelink_config::StationCfg> for StationSession {
    fn from(s: &scalelink_config::StationCfg) -> Self {
        Self {
            server_url: s.server_url.clone(),
            bearer_token: s.bearer_token.clone(),
            station_id: s.station_id.clone(),
            station_key: s.station_key.clone(),
        }
    }
}
