//! HTTP client for the station API (`{server_url}/api/scale/...`).
//!
//! Every call has its own timeout: 2s for weight updates, 5s for the rest.
//! Failures come back as `RemoteError`; nothing here panics or retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use scalelink_core::{
    HealthInfo, Registration, RemoteConfig, RemoteError, StationSession, SyncApi, WeightPayload,
};
use serde::{Deserialize, Serialize};

pub const WEIGHT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const STATION_KEY_HEADER: &str = "X-Station-Key";

#[derive(Serialize)]
struct RegisterBody<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ZoneBody<'a> {
    scale_id: &'a str,
    active: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base: String,
    bearer_token: String,
    station_key: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(session: &StationSession) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base: session.server_url.trim_end_matches('/').to_string(),
            bearer_token: session.bearer_token.clone(),
            station_key: session.station_key.clone(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/scale{path}", self.base)
    }

    /// Bearer token only.
    fn bearer(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.bearer_token)
            .header(ACCEPT, "application/json")
    }

    /// Bearer token plus station key.
    fn station(&self, req: RequestBuilder) -> RequestBuilder {
        self.bearer(req).header(STATION_KEY_HEADER, &self.station_key)
    }
}

fn transport(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else if e.is_decode() {
        RemoteError::Decode(e.to_string())
    } else {
        RemoteError::Transport(e.to_string())
    }
}

/// Non-2xx response to `RemoteError::Status`, keeping the server's `error`
/// field (or raw body text) as the message.
async fn status_error(resp: Response) -> RemoteError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.error)
        .or_else(|| {
            let t = text.trim();
            (!t.is_empty()).then(|| t.to_string())
        });
    RemoteError::Status { status, message }
}

async fn expect_ok(resp: Response) -> Result<Response, RemoteError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(status_error(resp).await)
    }
}

#[async_trait]
impl SyncApi for ApiClient {
    async fn verify_connection(&self) -> Result<HealthInfo, RemoteError> {
        let resp = self
            .bearer(self.client.get(self.url("/health")))
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        let resp = expect_ok(resp).await?;
        resp.json::<HealthInfo>().await.map_err(transport)
    }

    async fn register_station(&self, name: &str) -> Result<Registration, RemoteError> {
        let resp = self
            .bearer(self.client.post(self.url("/register")))
            .json(&RegisterBody { name })
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        let resp = expect_ok(resp).await?;
        let reg = resp.json::<Registration>().await.map_err(transport)?;
        tracing::info!(station_id = %reg.station_id, "station registered");
        Ok(reg)
    }

    async fn send_weight(&self, payload: &WeightPayload) -> Result<(), RemoteError> {
        let resp = self
            .station(self.client.post(self.url("/weight")))
            .json(payload)
            .timeout(WEIGHT_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RemoteError::RateLimited);
        }
        expect_ok(resp).await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<(), RemoteError> {
        let resp = self
            .station(self.client.post(self.url("/disconnect")))
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        expect_ok(resp).await.map(|_| ())
    }

    async fn fetch_config(&self) -> Option<RemoteConfig> {
        let result = async {
            let resp = self
                .station(self.client.get(self.url("/config")))
                .timeout(DEFAULT_TIMEOUT)
                .send()
                .await
                .map_err(transport)?;
            let resp = expect_ok(resp).await?;
            resp.json::<RemoteConfig>().await.map_err(transport)
        }
        .await;

        match result {
            Ok(mut cfg) => {
                cfg.unescape_poll_commands();
                Some(cfg)
            }
            Err(e) => {
                tracing::error!(error = %e, "fetching remote config failed");
                None
            }
        }
    }

    async fn set_zone(&self, scale_id: &str, active: bool) -> Result<(), RemoteError> {
        let resp = self
            .station(self.client.post(self.url("/zone")))
            .json(&ZoneBody { scale_id, active })
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        expect_ok(resp).await.map(|_| ())
    }
}
