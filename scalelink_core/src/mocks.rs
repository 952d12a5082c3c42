//! Test doubles for the serial and remote seams.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use scalelink_traits::{BoxedSerial, SerialOpener, SerialSettings};
use tokio::io::DuplexStream;

use crate::error::RemoteError;
use crate::remote::{HealthInfo, Registration, RemoteConfig, SyncApi};
use crate::sync::WeightPayload;

/// Bytes buffered in each direction of a scripted duplex device.
const DUPLEX_CAPACITY: usize = 64 * 1024;

type Scripted = Result<BoxedSerial, String>;

/// Opener that hands out pre-arranged streams or errors, in order.
/// Entries queued for a specific port are used first for that port. Once the
/// script runs out every open fails.
#[derive(Default)]
pub struct ScriptedOpener {
    script: Mutex<VecDeque<Scripted>>,
    by_port: Mutex<HashMap<String, VecDeque<Scripted>>>,
    opened: Mutex<Vec<SerialSettings>>,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_error(&self, msg: &str) {
        if let Ok(mut s) = self.script.lock() {
            s.push_back(Err(msg.to_string()));
        }
    }

    pub fn push_stream(&self, stream: BoxedSerial) {
        if let Ok(mut s) = self.script.lock() {
            s.push_back(Ok(stream));
        }
    }

    /// Queue one end of an in-memory pipe and return the device end.
    pub fn push_duplex(&self) -> DuplexStream {
        let (host, device) = tokio::io::duplex(DUPLEX_CAPACITY);
        self.push_stream(Box::new(host));
        device
    }

    /// Like `push_duplex`, but only handed out for `port`.
    pub fn push_duplex_on(&self, port: &str) -> DuplexStream {
        let (host, device) = tokio::io::duplex(DUPLEX_CAPACITY);
        if let Ok(mut m) = self.by_port.lock() {
            m.entry(port.to_string())
                .or_default()
                .push_back(Ok(Box::new(host)));
        }
        device
    }

    /// Attempts so far, successful or not.
    pub fn open_count(&self) -> usize {
        self.opened.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn opened_ports(&self) -> Vec<String> {
        self.opened
            .lock()
            .map(|o| o.iter().map(|s| s.port.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SerialOpener for ScriptedOpener {
    async fn open(
        &self,
        settings: &SerialSettings,
    ) -> Result<BoxedSerial, Box<dyn std::error::Error + Send + Sync>> {
        if let Ok(mut o) = self.opened.lock() {
            o.push(settings.clone());
        }
        let keyed = self
            .by_port
            .lock()
            .ok()
            .and_then(|mut m| m.get_mut(&settings.port).and_then(VecDeque::pop_front));
        let next = keyed.or_else(|| self.script.lock().ok().and_then(|mut s| s.pop_front()));
        match next {
            Some(Ok(stream)) => Ok(stream),
            Some(Err(msg)) => Err(msg.into()),
            None => Err(format!("no device on {}", settings.port).into()),
        }
    }
}

/// In-memory `SyncApi` that records calls. Weight sends succeed unless an
/// outcome was scripted with `push_send_outcome`.
#[derive(Default)]
pub struct RecordingApi {
    sent: Mutex<Vec<WeightPayload>>,
    send_script: Mutex<VecDeque<Result<(), RemoteError>>>,
    config: Mutex<Option<RemoteConfig>>,
    zones: Mutex<Vec<(String, bool)>>,
    failing_zones: Mutex<Vec<String>>,
    health: Mutex<Option<RemoteError>>,
    fetches: AtomicUsize,
    disconnects: AtomicUsize,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_send_outcome(&self, outcome: Result<(), RemoteError>) {
        if let Ok(mut s) = self.send_script.lock() {
            s.push_back(outcome);
        }
    }

    /// What the next `fetch_config` returns (`None` = unavailable).
    pub fn set_config(&self, cfg: Option<RemoteConfig>) {
        if let Ok(mut c) = self.config.lock() {
            *c = cfg;
        }
    }

    pub fn fail_health(&self, err: RemoteError) {
        if let Ok(mut h) = self.health.lock() {
            *h = Some(err);
        }
    }

    pub fn fail_zone(&self, scale_id: &str) {
        if let Ok(mut f) = self.failing_zones.lock() {
            f.push(scale_id.to_string());
        }
    }

    pub fn sent(&self) -> Vec<WeightPayload> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_for(&self, scale_id: &str) -> Vec<WeightPayload> {
        self.sent()
            .into_iter()
            .filter(|p| p.scale_id == scale_id)
            .collect()
    }

    pub fn zones(&self) -> Vec<(String, bool)> {
        self.zones.lock().map(|z| z.clone()).unwrap_or_default()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncApi for RecordingApi {
    async fn verify_connection(&self) -> Result<HealthInfo, RemoteError> {
        match self.health.lock().ok().and_then(|h| h.clone()) {
            Some(e) => Err(e),
            None => Ok(HealthInfo {
                status: Some("ok".into()),
                ..Default::default()
            }),
        }
    }

    async fn register_station(&self, name: &str) -> Result<Registration, RemoteError> {
        Ok(Registration {
            station_id: format!("station-{name}"),
            station_key: "key".into(),
        })
    }

    async fn send_weight(&self, payload: &WeightPayload) -> Result<(), RemoteError> {
        if let Ok(mut s) = self.sent.lock() {
            s.push(payload.clone());
        }
        self.send_script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(Ok(()))
    }

    async fn disconnect(&self) -> Result<(), RemoteError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_config(&self) -> Option<RemoteConfig> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.config.lock().ok().and_then(|c| c.clone())
    }

    async fn set_zone(&self, scale_id: &str, active: bool) -> Result<(), RemoteError> {
        let failing = self
            .failing_zones
            .lock()
            .map(|f| f.iter().any(|id| id == scale_id))
            .unwrap_or(false);
        if failing {
            return Err(RemoteError::Status {
                status: 404,
                message: Some("unknown scale".into()),
            });
        }
        if let Ok(mut z) = self.zones.lock() {
            z.push((scale_id.to_string(), active));
        }
        Ok(())
    }
}
