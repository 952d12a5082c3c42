#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Scale acquisition and sync engine (hardware-agnostic).
//!
//! Serial devices are reached through `scalelink_traits::SerialOpener` and
//! the server through the `SyncApi` trait, so everything here runs against
//! in-memory doubles in tests.
//!
//! ## Architecture
//!
//! - **Parsing**: raw device line to weight (`parser`)
//! - **Stability**: sliding-window settle detection (`stability`)
//! - **Sync**: latest-state-wins send policy with heartbeat and 429 cool-down (`sync`)
//! - **Connection**: per-device supervisor task with flat reconnect (`connection`)
//! - **Coordinator**: connection set, remote config polling, fingerprinted rebuilds (`coordinator`)
//! - **Station**: application context with `init`/`shutdown` (`station`)
//!
//! State changes are published on a `tokio::sync::broadcast` channel; nothing
//! in this crate blocks on a subscriber.

pub mod clock;
pub mod config;
pub mod connection;
pub mod conversions;
pub mod coordinator;
pub mod detect;
pub mod error;
pub mod fingerprint;
pub mod lines;
pub mod mocks;
pub mod parser;
pub mod remote;
pub mod session;
pub mod stability;
pub mod state;
pub mod station;
pub mod sync;

pub use clock::TokioClock;
pub use config::{CoordinatorCfg, LinkCfg, StabilityCfg, SyncCfg};
pub use connection::{LinkDeps, ScaleConnection};
pub use coordinator::{AcquisitionCoordinator, CoordinatorStatus};
pub use detect::{Detected, PROBE_TIMEOUT, ProbeReading, auto_detect, probe};
pub use error::{BuildError, LinkError, ProbeError, RemoteError, Report, Result};
pub use fingerprint::{Fingerprint, fingerprint};
pub use parser::{parse_weight, round_weight};
pub use remote::{HealthInfo, Registration, RemoteConfig, SyncApi, unescape_control};
pub use session::StationSession;
pub use stability::StabilityDetector;
pub use state::{LinkPhase, ScaleRuntimeState};
pub use station::{Station, StationBuilder, sync_zones};
pub use sync::{SendOutcome, SyncDecision, SyncPolicy, WeightPayload};
