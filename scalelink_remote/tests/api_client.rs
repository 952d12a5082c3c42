//! `ApiClient` against an in-process axum server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use scalelink_core::{RemoteError, StationSession, SyncApi, WeightPayload};
use scalelink_remote::ApiClient;
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<(String, HeaderMap, Value)>>>,
}

impl Seen {
    fn push(&self, path: &str, headers: HeaderMap, body: Value) {
        if let Ok(mut r) = self.requests.lock() {
            r.push((path.to_string(), headers, body));
        }
    }

    fn last(&self, path: &str) -> (HeaderMap, Value) {
        let r = self.requests.lock().expect("lock");
        let (_, h, b) = r.iter().rev().find(|(p, _, _)| p == path).expect("request");
        (h.clone(), b.clone())
    }
}

async fn health(State(seen): State<Seen>, headers: HeaderMap) -> impl IntoResponse {
    let ok = headers
        .get("authorization")
        .is_some_and(|v| v == "Bearer good-token");
    seen.push("/health", headers, Value::Null);
    if ok {
        (StatusCode::OK, Json(json!({"status": "ok", "version": "1.2"})))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid token"})))
    }
}

async fn register(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let name = body["name"].as_str().unwrap_or_default().to_string();
    seen.push("/register", headers, body);
    Json(json!({"stationId": format!("st-{name}"), "stationKey": "sk-123"}))
}

async fn weight(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let w = body["weight"].as_f64().unwrap_or_default();
    seen.push("/weight", headers, body);
    match w {
        w if w == 429.0 => StatusCode::TOO_MANY_REQUESTS,
        w if w == 500.0 => StatusCode::INTERNAL_SERVER_ERROR,
        w if w == 999.0 => {
            tokio::time::sleep(Duration::from_secs(4)).await;
            StatusCode::OK
        }
        _ => StatusCode::OK,
    }
}

async fn disconnect(State(seen): State<Seen>, headers: HeaderMap) -> StatusCode {
    seen.push("/disconnect", headers, Value::Null);
    StatusCode::NO_CONTENT
}

async fn config(State(seen): State<Seen>, headers: HeaderMap) -> Json<Value> {
    seen.push("/config", headers, Value::Null);
    Json(json!({
        "stationId": "st-remote",
        "scales": [
            {"scaleId": "B1", "port": "/dev/ttyUSB0", "pollCommand": "W\\r\\n", "delimiter": "\r",
             "baudRate": 9600, "readIntervalMs": 250, "label": "ignored"},
            {"scaleId": "B2", "port": "/dev/ttyUSB1", "pollCommand": null}
        ]
    }))
}

async fn zone(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    seen.push("/zone", headers, body);
    StatusCode::OK
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}/")
}

async fn server() -> (String, Seen) {
    let seen = Seen::default();
    let api = Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/weight", post(weight))
        .route("/disconnect", post(disconnect))
        .route("/config", get(config))
        .route("/zone", post(zone))
        .with_state(seen.clone());
    let url = serve(Router::new().nest("/api/scale", api)).await;
    (url, seen)
}

fn client(url: &str, token: &str) -> ApiClient {
    ApiClient::new(&StationSession {
        server_url: url.to_string(),
        bearer_token: token.to_string(),
        station_id: "st-1".into(),
        station_key: "sk-123".into(),
    })
    .expect("client")
}

fn payload(weight: f64) -> WeightPayload {
    WeightPayload {
        station_id: "st-1".into(),
        scale_id: "B1".into(),
        weight,
        stable: true,
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn health_uses_bearer_only() {
    let (url, seen) = server().await;
    let info = client(&url, "good-token")
        .verify_connection()
        .await
        .expect("healthy");
    assert_eq!(info.status.as_deref(), Some("ok"));
    assert_eq!(info.extra["version"], "1.2");

    let (headers, _) = seen.last("/health");
    assert_eq!(headers["authorization"], "Bearer good-token");
    assert!(headers.get("x-station-key").is_none());
}

#[tokio::test]
async fn health_failure_carries_server_message() {
    let (url, _) = server().await;
    let err = client(&url, "bad").verify_connection().await.unwrap_err();
    assert_eq!(
        err,
        RemoteError::Status {
            status: 401,
            message: Some("invalid token".into())
        }
    );
}

#[tokio::test]
async fn register_returns_credentials() {
    let (url, seen) = server().await;
    let reg = client(&url, "good-token")
        .register_station("line-1")
        .await
        .expect("register");
    assert_eq!(reg.station_id, "st-line-1");
    assert_eq!(reg.station_key, "sk-123");
    let (_, body) = seen.last("/register");
    assert_eq!(body, json!({"name": "line-1"}));
}

#[tokio::test]
async fn weight_is_posted_with_station_key() {
    let (url, seen) = server().await;
    client(&url, "good-token")
        .send_weight(&payload(12.5))
        .await
        .expect("sent");
    let (headers, body) = seen.last("/weight");
    assert_eq!(headers["x-station-key"], "sk-123");
    assert_eq!(headers["authorization"], "Bearer good-token");
    assert_eq!(body["station_id"], "st-1");
    assert_eq!(body["scale_id"], "B1");
    assert_eq!(body["weight"], 12.5);
    assert_eq!(body["stable"], true);
    assert!(body["timestamp"].as_str().is_some_and(|t| t.contains('T')));
}

#[tokio::test]
async fn rate_limit_is_distinct_from_other_failures() {
    let (url, _) = server().await;
    let c = client(&url, "good-token");
    assert_eq!(
        c.send_weight(&payload(429.0)).await,
        Err(RemoteError::RateLimited)
    );
    assert!(matches!(
        c.send_weight(&payload(500.0)).await,
        Err(RemoteError::Status { status: 500, .. })
    ));
}

#[tokio::test]
async fn slow_weight_send_times_out() {
    let (url, _) = server().await;
    let err = client(&url, "good-token")
        .send_weight(&payload(999.0))
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::Timeout);
}

#[tokio::test]
async fn config_poll_commands_are_unescaped() {
    let (url, seen) = server().await;
    let cfg = client(&url, "good-token")
        .fetch_config()
        .await
        .expect("config");
    assert_eq!(cfg.station_id.as_deref(), Some("st-remote"));
    assert_eq!(cfg.scales.len(), 2);
    assert_eq!(cfg.scales[0].poll_command(), Some("W\r\n"));
    assert_eq!(cfg.scales[0].read_interval_ms, 250);
    assert!(cfg.scales[1].is_continuous());
    let (headers, _) = seen.last("/config");
    assert_eq!(headers["x-station-key"], "sk-123");
}

#[tokio::test]
async fn config_failure_is_none() {
    // nothing listens here once the listener is dropped
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let c = client(&format!("http://{addr}"), "good-token");
    assert!(c.fetch_config().await.is_none());
    assert!(matches!(
        c.disconnect().await,
        Err(RemoteError::Transport(_))
    ));

    // a server without the route answers 404
    let url = serve(Router::new()).await;
    assert!(client(&url, "t").fetch_config().await.is_none());
}

#[tokio::test]
async fn zone_and_disconnect() {
    let (url, seen) = server().await;
    let c = client(&url, "good-token");
    c.set_zone("B2", false).await.expect("zone");
    let (_, body) = seen.last("/zone");
    assert_eq!(body, json!({"scaleId": "B2", "active": false}));

    c.disconnect().await.expect("disconnect");
    let (headers, _) = seen.last("/disconnect");
    assert_eq!(headers["x-station-key"], "sk-123");
}
