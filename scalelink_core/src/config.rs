//! Runtime configuration for the acquisition engine.
//!
//! These mirror `scalelink_config::Tuning` with `Duration`s instead of raw
//! milliseconds. Conversions live in `conversions`.

use std::time::Duration;

/// Stability detection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityCfg {
    /// Number of most recent samples compared.
    pub window_size: usize,
    /// Max spread (kg) inside the window.
    pub threshold_kg: f64,
    /// How long the spread must stay within threshold.
    pub required: Duration,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            window_size: 5,
            threshold_kg: 0.05,
            required: Duration::from_millis(500),
        }
    }
}

/// Outbound sync cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCfg {
    /// Period of the sync timer.
    pub interval: Duration,
    /// Unchanged state is resent at least this often.
    pub heartbeat: Duration,
    /// Pause after a 429.
    pub rate_limit_backoff: Duration,
}

impl Default for SyncCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            heartbeat: Duration::from_millis(2000),
            rate_limit_backoff: Duration::from_millis(5000),
        }
    }
}

/// Everything one scale connection needs besides its framing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkCfg {
    pub stability: StabilityCfg,
    pub sync: SyncCfg,
    /// Flat delay between reconnect attempts.
    pub reconnect_interval: Duration,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            stability: StabilityCfg::default(),
            sync: SyncCfg::default(),
            reconnect_interval: Duration::from_millis(5000),
        }
    }
}

/// Coordinator-level settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorCfg {
    pub link: LinkCfg,
    /// Remote configuration refresh period.
    pub config_poll: Duration,
}

impl Default for CoordinatorCfg {
    fn default() -> Self {
        Self {
            link: LinkCfg::default(),
            config_poll: Duration::from_secs(30),
        }
    }
}
