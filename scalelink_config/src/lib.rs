#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Station file schema for the scale bridge.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `[[scales]]` entries name a built-in profile or carry custom framing;
//!   both are resolved once into `ScaleConfig` by `Config::scale_set`.
//! - The core treats a loaded `Config` as an immutable snapshot. Only the CLI
//!   writes the file back, after registration or working-set edits.
pub mod profiles;
pub mod scale;
pub mod set;

pub use profiles::{CUSTOM_PROFILE_ID, PROFILES, ScaleProfile, detectable_profiles, profile_by_id};
pub use scale::{Framing, ScaleConfig, ScaleEntry, ScaleSource};
pub use set::{ScaleEdit, ScaleSet, ScaleSetError};

use serde::{Deserialize, Serialize};

/// Server credentials and station identity.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StationCfg {
    pub server_url: String,
    pub bearer_token: String,
    pub station_id: String,
    pub station_key: String,
    /// Name used when registering this station.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Timing and stability knobs shared by every scale of the station.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Tuning {
    /// Samples considered by the stability check.
    pub stability_window_size: usize,
    /// Max spread (kg) inside the window for the reading to count as settled.
    pub stability_threshold_kg: f64,
    /// How long the spread must stay within threshold (ms).
    pub stability_required_ms: u64,
    pub api_sync_interval_ms: u64,
    /// Resend unchanged state at least this often (ms).
    pub heartbeat_ms: u64,
    pub reconnect_interval_ms: u64,
    /// Remote configuration refresh period (ms).
    pub config_poll_ms: u64,
    /// Send pause after the server answers 429 (ms).
    pub rate_limit_backoff_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            stability_window_size: 5,
            stability_threshold_kg: 0.05,
            stability_required_ms: 500,
            api_sync_interval_ms: 200,
            heartbeat_ms: 2000,
            reconnect_interval_ms: 5000,
            config_poll_ms: 30_000,
            rate_limit_backoff_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Logging {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>, // path to .log (JSON lines)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub station: StationCfg,
    #[serde(default)]
    pub tuning: Tuning,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub scales: Vec<ScaleEntry>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and parse a station file. Does not validate.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))
}

impl Config {
    pub fn to_toml(&self) -> eyre::Result<String> {
        toml::to_string_pretty(self).map_err(|e| eyre::eyre!("serialize config: {e}"))
    }

    /// Resolve every `[[scales]]` entry and check uniqueness of ids and ports.
    pub fn scale_set(&self) -> eyre::Result<ScaleSet> {
        let mut set = ScaleSet::new();
        for entry in &self.scales {
            let cfg = entry.resolve()?;
            set.add(cfg)?;
        }
        Ok(set)
    }

    /// Replace the `[[scales]]` entries with the contents of `set`.
    pub fn set_scales(&mut self, set: &ScaleSet) {
        self.scales = set.iter().map(ScaleEntry::from).collect();
    }

    /// Whether enough is configured to start acquisition.
    pub fn is_configured(&self) -> bool {
        !self.station.server_url.is_empty()
            && !self.station.station_id.is_empty()
            && !self.scales.is_empty()
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Station
        if self.station.server_url.trim().is_empty() {
            eyre::bail!("station.server_url must not be empty");
        }
        if !(self.station.server_url.starts_with("http://")
            || self.station.server_url.starts_with("https://"))
        {
            eyre::bail!("station.server_url must start with http:// or https://");
        }

        // Tuning
        let t = &self.tuning;
        if t.stability_window_size == 0 {
            eyre::bail!("tuning.stability_window_size must be >= 1");
        }
        if !(t.stability_threshold_kg.is_finite() && t.stability_threshold_kg > 0.0) {
            eyre::bail!("tuning.stability_threshold_kg must be > 0");
        }
        if t.stability_required_ms > 5 * 60 * 1000 {
            eyre::bail!("tuning.stability_required_ms is unreasonably large (>5min)");
        }
        if t.api_sync_interval_ms == 0 {
            eyre::bail!("tuning.api_sync_interval_ms must be >= 1");
        }
        if t.heartbeat_ms == 0 {
            eyre::bail!("tuning.heartbeat_ms must be >= 1");
        }
        if t.reconnect_interval_ms == 0 {
            eyre::bail!("tuning.reconnect_interval_ms must be >= 1");
        }
        if t.config_poll_ms == 0 {
            eyre::bail!("tuning.config_poll_ms must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Scales: resolution covers framing checks and duplicates
        self.scale_set()?;
        Ok(())
    }
}
