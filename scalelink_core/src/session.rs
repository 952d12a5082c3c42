//! Station credentials shared by every connection of a coordinator.

use serde::Serialize;

/// Read-only to connections. The coordinator replaces the whole value (behind
/// an `Arc`) when the remote configuration names a different station id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSession {
    pub server_url: String,
    #[serde(skip_serializing)]
    pub bearer_token: String,
    pub station_id: String,
    #[serde(skip_serializing)]
    pub station_key: String,
}

impl StationSession {
    pub fn is_registered(&self) -> bool {
        !self.station_id.is_empty() && !self.station_key.is_empty()
    }

    pub fn with_station_id(&self, station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            ..self.clone()
        }
    }
}
