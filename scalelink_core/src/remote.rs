//! The remote sync seam and its wire types.
//!
//! `scalelink_remote::ApiClient` is the HTTP implementation; tests use
//! `mocks::RecordingApi`. Every operation returns a typed outcome and never
//! panics; `fetch_config` collapses all failures into `None`.

use async_trait::async_trait;
use scalelink_config::{ScaleConfig, ScaleSet};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::sync::WeightPayload;

/// Body of a successful `GET /health`. Only `status` is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Credentials returned by `POST /register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub station_id: String,
    pub station_key: String,
}

/// Authoritative scale list from `GET /config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(default)]
    pub station_id: Option<String>,
    #[serde(default)]
    pub scales: Vec<ScaleConfig>,
}

impl RemoteConfig {
    /// The server stores poll commands with escaped control characters.
    pub fn unescape_poll_commands(&mut self) {
        for s in &mut self.scales {
            if let Some(cmd) = s.poll_command.as_mut() {
                *cmd = unescape_control(cmd);
            }
        }
    }

    /// Resolve into a checked scale set. Empty lists, invalid framing and
    /// duplicate ids or ports count as "no config available".
    pub fn usable_scales(&self) -> Option<ScaleSet> {
        if self.scales.is_empty() {
            return None;
        }
        if let Some(e) = self.scales.iter().find_map(|s| s.validate().err()) {
            tracing::warn!(error = %e, "remote config rejected");
            return None;
        }
        match ScaleSet::from_configs(self.scales.iter().cloned()) {
            Ok(set) => Some(set),
            Err(e) => {
                tracing::warn!(error = %e, "remote config rejected");
                None
            }
        }
    }
}

/// Turn literal `\r`, `\n` and `\t` escape sequences into control characters.
pub fn unescape_control(s: &str) -> String {
    s.replace("\\r", "\r")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
}

/// Client of the station API under `{server_url}/api/scale`.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// `GET /health`, bearer token only.
    async fn verify_connection(&self) -> Result<HealthInfo, RemoteError>;

    /// `POST /register {name}`. Re-registering a known name recovers the
    /// same station.
    async fn register_station(&self, name: &str) -> Result<Registration, RemoteError>;

    /// `POST /weight`. A 429 comes back as `RemoteError::RateLimited`.
    async fn send_weight(&self, payload: &WeightPayload) -> Result<(), RemoteError>;

    /// `POST /disconnect`. Best effort.
    async fn disconnect(&self) -> Result<(), RemoteError>;

    /// `GET /config` with poll commands already unescaped; `None` on any
    /// failure.
    async fn fetch_config(&self) -> Option<RemoteConfig>;

    /// `POST /zone {scaleId, active}`.
    async fn set_zone(&self, scale_id: &str, active: bool) -> Result<(), RemoteError>;
}
