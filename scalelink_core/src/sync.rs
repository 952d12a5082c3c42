//! Outbound weight sync: payload shape and the send/skip policy.
//!
//! The policy is pure. The connection's sync task asks it what to do on every
//! tick and reports the outcome back, so all timing decisions are testable
//! with an injected `Instant`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SyncCfg;
use crate::error::RemoteError;

/// Body of `POST /weight`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightPayload {
    pub station_id: String,
    pub scale_id: String,
    pub weight: f64,
    pub stable: bool,
    /// Serialized as RFC 3339 / ISO 8601.
    pub timestamp: DateTime<Utc>,
}

/// Verdict for one sync tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Inside the 429 cool-down.
    Backoff,
    /// Same pair as last sent and the heartbeat is not due.
    Unchanged,
    /// Changed but unstable; held back until the heartbeat forces a send.
    UnstableChurn,
    Send { heartbeat_due: bool },
}

impl SyncDecision {
    pub fn should_send(self) -> bool {
        matches!(self, Self::Send { .. })
    }
}

/// What happened to the last send, as far as the policy cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    RateLimited,
    Failed,
}

impl<T> From<&Result<T, RemoteError>> for SendOutcome {
    fn from(r: &Result<T, RemoteError>) -> Self {
        match r {
            Ok(_) => Self::Sent,
            Err(RemoteError::RateLimited) => Self::RateLimited,
            Err(_) => Self::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncPolicy {
    cfg: SyncCfg,
    last_sent: Option<(f64, bool)>,
    last_sent_at: Option<Instant>,
    backoff_until: Option<Instant>,
}

impl SyncPolicy {
    pub fn new(cfg: SyncCfg) -> Self {
        Self {
            cfg,
            last_sent: None,
            last_sent_at: None,
            backoff_until: None,
        }
    }

    pub fn decide(&self, weight: f64, stable: bool, now: Instant) -> SyncDecision {
        if self.in_backoff(now) {
            return SyncDecision::Backoff;
        }
        let changed = self.last_sent != Some((weight, stable));
        let heartbeat_due = self
            .last_sent_at
            .is_none_or(|at| now.saturating_duration_since(at) >= self.cfg.heartbeat);

        if !changed && !heartbeat_due {
            return SyncDecision::Unchanged;
        }
        if !stable && !heartbeat_due {
            return SyncDecision::UnstableChurn;
        }
        SyncDecision::Send { heartbeat_due }
    }

    /// Record the result of a send that was attempted for `(weight, stable)`
    /// at `sent_at`.
    pub fn record(&mut self, outcome: SendOutcome, weight: f64, stable: bool, sent_at: Instant) {
        match outcome {
            SendOutcome::Sent => {
                self.last_sent = Some((weight, stable));
                self.last_sent_at = Some(sent_at);
            }
            SendOutcome::RateLimited => {
                self.backoff_until = Some(sent_at + self.cfg.rate_limit_backoff);
            }
            // retried on the next tick with whatever is current then
            SendOutcome::Failed => {}
        }
    }

    pub fn last_sent(&self) -> Option<(f64, bool)> {
        self.last_sent
    }

    pub fn in_backoff(&self, now: Instant) -> bool {
        self.backoff_until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use scalelink_traits::{Clock, ManualClock};
    use std::time::Duration;

    fn policy() -> SyncPolicy {
        SyncPolicy::new(SyncCfg {
            interval: Duration::from_millis(200),
            heartbeat: Duration::from_millis(2000),
            rate_limit_backoff: Duration::from_millis(5000),
        })
    }

    #[test]
    fn first_tick_always_sends() {
        let clock = ManualClock::new();
        let p = policy();
        assert_eq!(
            p.decide(0.0, false, clock.now()),
            SyncDecision::Send { heartbeat_due: true }
        );
    }

    #[test]
    fn unchanged_state_waits_for_heartbeat() {
        let clock = ManualClock::new();
        let mut p = policy();
        p.record(SendOutcome::Sent, 10.0, true, clock.now());

        let mut sends = 0;
        for _ in 0..9 {
            clock.advance_ms(200);
            if p.decide(10.0, true, clock.now()).should_send() {
                sends += 1;
            }
        }
        assert_eq!(sends, 0, "1800ms in, heartbeat not due");

        clock.advance_ms(200);
        let d = p.decide(10.0, true, clock.now());
        assert_eq!(d, SyncDecision::Send { heartbeat_due: true });
        p.record(SendOutcome::Sent, 10.0, true, clock.now());
        clock.advance_ms(200);
        assert_eq!(p.decide(10.0, true, clock.now()), SyncDecision::Unchanged);
    }

    #[test]
    fn stable_change_is_sent_immediately() {
        let clock = ManualClock::new();
        let mut p = policy();
        p.record(SendOutcome::Sent, 10.0, false, clock.now());
        clock.advance_ms(200);
        assert_eq!(
            p.decide(10.0, true, clock.now()),
            SyncDecision::Send { heartbeat_due: false }
        );
    }

    #[rstest]
    #[case(10.5, false)]
    #[case(0.0, false)]
    fn unstable_change_is_held_until_heartbeat(#[case] weight: f64, #[case] stable: bool) {
        let clock = ManualClock::new();
        let mut p = policy();
        p.record(SendOutcome::Sent, 10.0, true, clock.now());
        clock.advance_ms(1999);
        assert_eq!(
            p.decide(weight, stable, clock.now()),
            SyncDecision::UnstableChurn
        );
        clock.advance_ms(1);
        assert!(p.decide(weight, stable, clock.now()).should_send());
    }

    #[test]
    fn rate_limit_suppresses_everything_for_backoff() {
        let clock = ManualClock::new();
        let mut p = policy();
        let t0 = clock.now();
        p.record(SendOutcome::RateLimited, 10.0, true, t0);
        assert!(p.in_backoff(t0));

        // any state, heartbeat long overdue: still nothing
        for step in 1..25 {
            clock.advance_ms(200);
            assert_eq!(
                p.decide(f64::from(step), true, clock.now()),
                SyncDecision::Backoff,
                "t={}ms",
                step * 200
            );
        }
        clock.advance_ms(200);
        assert_eq!(clock.ms_since(t0), 5000);
        assert!(p.decide(42.0, true, clock.now()).should_send());
    }

    #[test]
    fn failure_does_not_record_the_pair() {
        let clock = ManualClock::new();
        let mut p = policy();
        p.record(SendOutcome::Failed, 10.0, true, clock.now());
        assert_eq!(p.last_sent(), None);
        assert!(p.decide(10.0, true, clock.now()).should_send());
    }

    #[test]
    fn outcome_from_result() {
        let ok: Result<(), RemoteError> = Ok(());
        let limited: Result<(), RemoteError> = Err(RemoteError::RateLimited);
        let other: Result<(), RemoteError> = Err(RemoteError::Timeout);
        assert_eq!(SendOutcome::from(&ok), SendOutcome::Sent);
        assert_eq!(SendOutcome::from(&limited), SendOutcome::RateLimited);
        assert_eq!(SendOutcome::from(&other), SendOutcome::Failed);
    }

    #[test]
    fn payload_uses_snake_case_and_iso_timestamp() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .expect("ts")
            .with_timezone(&Utc);
        let p = WeightPayload {
            station_id: "st".into(),
            scale_id: "B1".into(),
            weight: 12.5,
            stable: true,
            timestamp: ts,
        };
        let v = serde_json::to_value(&p).expect("json");
        assert_eq!(v["station_id"], "st");
        assert_eq!(v["scale_id"], "B1");
        assert_eq!(v["weight"], 12.5);
        assert_eq!(v["stable"], true);
        assert_eq!(v["timestamp"], "2024-05-01T12:00:00Z");
    }
}
