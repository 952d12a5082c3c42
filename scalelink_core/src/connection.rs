//! One serial scale: open, read, settle, sync, reconnect.
//!
//! A connection is driven by a single supervisor task:
//!
//! ```text
//! Disconnected -> Connecting -> Open -> (error | close) -> ReconnectPending -> Connecting ...
//!                      \-> (open failed) -> ReconnectPending
//! any state -> Destroyed (terminal)
//! ```
//!
//! While a session is open the supervisor also owns the poll timer (only for
//! devices with a poll command) and a separate sync task. Both die with the
//! session, and the whole tree is aborted on `destroy`. Only one supervisor
//! exists per connection, so reconnect attempts can never overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use scalelink_config::ScaleConfig;
use scalelink_traits::{BoxedSerial, Clock, SerialOpener};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval_at};

use crate::config::LinkCfg;
use crate::error::{LinkError, RemoteError};
use crate::lines::LineReader;
use crate::parser::{parse_weight, round_weight};
use crate::remote::SyncApi;
use crate::session::StationSession;
use crate::stability::StabilityDetector;
use crate::state::{LinkPhase, ScaleRuntimeState};
use crate::sync::{SendOutcome, SyncPolicy, WeightPayload};

/// Collaborators shared by every connection of a coordinator.
#[derive(Clone)]
pub struct LinkDeps {
    pub opener: Arc<dyn SerialOpener>,
    pub api: Arc<dyn SyncApi>,
    pub clock: Arc<dyn Clock>,
    /// Every observable state change is broadcast here. Lagging or absent
    /// receivers never slow a connection down.
    pub events: broadcast::Sender<ScaleRuntimeState>,
    pub link: LinkCfg,
}

impl std::fmt::Debug for LinkDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkDeps")
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

struct LinkCtx {
    cfg: ScaleConfig,
    session: Arc<StationSession>,
    deps: LinkDeps,
    state: watch::Sender<ScaleRuntimeState>,
    destroyed: AtomicBool,
}

impl LinkCtx {
    fn scale_id(&self) -> &str {
        &self.cfg.scale_id
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Apply `f` and broadcast the result. Once `Destroyed` is published the
    /// state is frozen, so a task that has not yet observed its abort cannot
    /// overwrite it.
    fn publish(&self, f: impl FnOnce(&mut ScaleRuntimeState)) {
        let events = &self.deps.events;
        self.state.send_if_modified(|s| {
            if s.phase == LinkPhase::Destroyed {
                return false;
            }
            f(s);
            let _ = events.send(s.clone());
            true
        });
    }

    fn current(&self) -> (f64, bool) {
        let s = self.state.borrow();
        (s.weight, s.stable)
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct ScaleConnection {
    ctx: Arc<LinkCtx>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ScaleConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScaleConnection")
            .field("scale_id", &self.ctx.cfg.scale_id)
            .field("port", &self.ctx.cfg.port)
            .field("destroyed", &self.ctx.is_destroyed())
            .finish_non_exhaustive()
    }
}

impl ScaleConnection {
    pub fn new(cfg: ScaleConfig, session: Arc<StationSession>, deps: LinkDeps) -> Self {
        let (state, _) = watch::channel(ScaleRuntimeState::new(&cfg.scale_id, &cfg.port));
        Self {
            ctx: Arc::new(LinkCtx {
                cfg,
                session,
                deps,
                state,
                destroyed: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn scale_id(&self) -> &str {
        self.ctx.scale_id()
    }

    pub fn config(&self) -> &ScaleConfig {
        &self.ctx.cfg
    }

    pub fn state(&self) -> ScaleRuntimeState {
        self.ctx.state.borrow().clone()
    }

    /// Follow this connection's state only.
    pub fn watch(&self) -> watch::Receiver<ScaleRuntimeState> {
        self.ctx.state.subscribe()
    }

    pub fn is_destroyed(&self) -> bool {
        self.ctx.is_destroyed()
    }

    /// Start the supervisor. No-op when destroyed or already running.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        if self.ctx.is_destroyed() {
            return;
        }
        let Ok(mut task) = self.task.lock() else {
            return;
        };
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let ctx = Arc::clone(&self.ctx);
        *task = Some(tokio::spawn(supervise(ctx)));
    }

    /// Stop everything and never reconnect. Safe to call repeatedly and from
    /// any state; does not wait for the tasks to unwind.
    pub fn destroy(&self) {
        if self.ctx.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut task) = self.task.lock()
            && let Some(t) = task.take()
        {
            t.abort();
        }
        self.ctx.publish(|s| {
            s.connected = false;
            s.stable = false;
            s.phase = LinkPhase::Destroyed;
        });
        tracing::info!(scale_id = %self.ctx.scale_id(), "connection destroyed");
    }
}

impl Drop for ScaleConnection {
    fn drop(&mut self) {
        self.ctx.destroyed.store(true, Ordering::Release);
        if let Ok(mut task) = self.task.lock()
            && let Some(t) = task.take()
        {
            t.abort();
        }
    }
}

async fn supervise(ctx: Arc<LinkCtx>) {
    let settings = ctx.cfg.serial_settings();
    let retry = ctx.deps.link.reconnect_interval;
    loop {
        if ctx.is_destroyed() {
            return;
        }
        ctx.publish(|s| s.phase = LinkPhase::Connecting);
        tracing::info!(
            scale_id = %ctx.scale_id(),
            port = %settings.port,
            baud = settings.baud_rate,
            "opening serial port"
        );

        let err = match ctx.deps.opener.open(&settings).await {
            Ok(stream) => {
                tracing::info!(scale_id = %ctx.scale_id(), port = %settings.port, "port open");
                ctx.publish(|s| {
                    s.reset_readings();
                    s.connected = true;
                    s.last_error = None;
                    s.phase = LinkPhase::Open;
                });
                let err = run_session(&ctx, stream).await;
                match &err {
                    LinkError::Closed => {
                        tracing::warn!(scale_id = %ctx.scale_id(), "serial port closed")
                    }
                    e => tracing::error!(scale_id = %ctx.scale_id(), error = %e, "serial error"),
                }
                err
            }
            Err(e) => {
                let err = LinkError::Open(e.to_string());
                tracing::error!(scale_id = %ctx.scale_id(), error = %err, "could not open port");
                err
            }
        };

        if ctx.is_destroyed() {
            return;
        }
        ctx.publish(|s| {
            s.connected = false;
            s.stable = false;
            s.last_error = Some(err.to_string());
            s.phase = LinkPhase::ReconnectPending;
        });
        tracing::info!(scale_id = %ctx.scale_id(), delay_ms = retry.as_millis() as u64, "reconnecting later");
        tokio::time::sleep(retry).await;
    }
}

/// Read until the device fails or goes away. All per-session state (window,
/// read count, sync memory) lives and dies here.
async fn run_session(ctx: &Arc<LinkCtx>, stream: BoxedSerial) -> LinkError {
    let (rd, mut wr) = tokio::io::split(stream);
    let mut lines = LineReader::new(rd, &ctx.cfg.delimiter);
    let mut detector = StabilityDetector::new(ctx.deps.link.stability);
    let mut read_count: u64 = 0;

    let _sync = AbortOnDrop(tokio::spawn(sync_loop(Arc::clone(ctx))));

    let poll_cmd = ctx.cfg.poll_command().map(|c| c.as_bytes().to_vec());
    let mut poll_timer = poll_cmd.as_ref().map(|_| {
        let period = std::time::Duration::from_millis(ctx.cfg.read_interval_ms.max(1));
        let mut iv = interval_at(tokio::time::Instant::now() + period, period);
        iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(scale_id = %ctx.scale_id(), interval_ms = ctx.cfg.read_interval_ms, "polling");
        iv
    });

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(raw)) => {
                    read_count += 1;
                    handle_line(ctx, &raw, read_count, &mut detector);
                }
                Ok(None) => return LinkError::Closed,
                Err(e) => return LinkError::Read(e.to_string()),
            },
            () = next_tick(&mut poll_timer) => {
                if let Some(cmd) = &poll_cmd {
                    let write = async {
                        wr.write_all(cmd).await?;
                        wr.flush().await
                    };
                    if let Err(e) = write.await {
                        return LinkError::Write(e.to_string());
                    }
                }
            }
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn handle_line(ctx: &LinkCtx, raw: &str, read_count: u64, detector: &mut StabilityDetector) {
    let weight = parse_weight(raw);
    if read_count <= 3 || read_count % 100 == 0 {
        tracing::debug!(scale_id = %ctx.scale_id(), read = read_count, raw = ?raw, weight = ?weight, "reading");
    }
    let Some(w) = weight else {
        tracing::trace!(scale_id = %ctx.scale_id(), raw = ?raw, "unparsable line dropped");
        return;
    };
    let stable = detector.update(w, ctx.deps.clock.now());
    ctx.publish(|s| {
        s.weight = round_weight(w);
        s.stable = stable;
        s.read_count = read_count;
    });
}

/// Push the current reading on every tick the policy allows. Sends run
/// inline, so a slow server delays the next tick instead of stacking calls.
async fn sync_loop(ctx: Arc<LinkCtx>) {
    let cfg = ctx.deps.link.sync;
    let mut policy = SyncPolicy::new(cfg);
    let mut iv = interval_at(tokio::time::Instant::now() + cfg.interval, cfg.interval);
    iv.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        iv.tick().await;
        if ctx.is_destroyed() {
            return;
        }
        let (weight, stable) = ctx.current();
        let now = ctx.deps.clock.now();
        let decision = policy.decide(weight, stable, now);
        if !decision.should_send() {
            continue;
        }
        let changed = policy.last_sent() != Some((weight, stable));

        let payload = WeightPayload {
            station_id: ctx.session.station_id.clone(),
            scale_id: ctx.cfg.scale_id.clone(),
            weight,
            stable,
            timestamp: Utc::now(),
        };
        let result = ctx.deps.api.send_weight(&payload).await;
        policy.record(SendOutcome::from(&result), weight, stable, now);

        match result {
            Ok(()) => {
                if changed && stable && weight > 0.0 {
                    tracing::info!(scale_id = %ctx.scale_id(), weight, "stable weight sent");
                }
            }
            Err(RemoteError::RateLimited) => {
                tracing::warn!(
                    scale_id = %ctx.scale_id(),
                    backoff_ms = cfg.rate_limit_backoff.as_millis() as u64,
                    "rate limited"
                );
            }
            Err(e) => {
                tracing::warn!(scale_id = %ctx.scale_id(), error = %e, "weight send failed");
            }
        }
    }
}
