//! Observable per-scale state published by a connection.

use serde::Serialize;

/// Where a connection is in its open/reconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    Disconnected,
    Connecting,
    Open,
    ReconnectPending,
    /// Terminal. No further reconnects.
    Destroyed,
}

/// Snapshot of one scale; this is what subscribers receive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleRuntimeState {
    pub scale_id: String,
    pub port: String,
    /// Last parsed weight in kg, rounded to 3 decimals.
    pub weight: f64,
    pub stable: bool,
    pub connected: bool,
    /// Lines received since the last (re)connect.
    pub read_count: u64,
    pub last_error: Option<String>,
    pub phase: LinkPhase,
}

impl ScaleRuntimeState {
    pub fn new(scale_id: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            scale_id: scale_id.into(),
            port: port.into(),
            weight: 0.0,
            stable: false,
            connected: false,
            read_count: 0,
            last_error: None,
            phase: LinkPhase::Disconnected,
        }
    }

    /// Clear everything a previous session may have left behind.
    pub(crate) fn reset_readings(&mut self) {
        self.weight = 0.0;
        self.stable = false;
        self.read_count = 0;
    }
}
