//! Settled-reading detection over a sliding window.
//!
//! A reading is stable once the last `window_size` samples have stayed within
//! `threshold_kg` of each other, with a positive mean, for at least
//! `required`. The first qualifying sample only starts the timer. Any breach
//! discards the elapsed time entirely.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::StabilityCfg;

#[derive(Debug, Clone)]
pub struct StabilityDetector {
    cfg: StabilityCfg,
    /// Most recent last. Capped at 2x window, trimmed back to 1x.
    window: VecDeque<f64>,
    stable_since: Option<Instant>,
}

impl StabilityDetector {
    pub fn new(cfg: StabilityCfg) -> Self {
        let window_size = cfg.window_size.max(1);
        Self {
            cfg: StabilityCfg { window_size, ..cfg },
            window: VecDeque::with_capacity(window_size * 2 + 1),
            stable_since: None,
        }
    }

    /// Feed one sample observed at `now`; returns whether the scale is settled.
    pub fn update(&mut self, sample: f64, now: Instant) -> bool {
        let n = self.cfg.window_size;
        self.window.push_back(sample);
        if self.window.len() > n * 2 {
            let excess = self.window.len() - n;
            self.window.drain(..excess);
        }

        if self.window.len() < n {
            return false;
        }

        let recent = self.window.range(self.window.len() - n..);
        let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
        for &w in recent {
            min = min.min(w);
            max = max.max(w);
            sum += w;
        }
        let avg = sum / n as f64;

        // Settling around zero or below is noise, not a weighing.
        if avg <= 0.0 {
            self.stable_since = None;
            return false;
        }
        if max - min > self.cfg.threshold_kg {
            self.stable_since = None;
            return false;
        }

        match self.stable_since {
            None => {
                self.stable_since = Some(now);
                false
            }
            Some(since) => now.saturating_duration_since(since) >= self.cfg.required,
        }
    }

    /// Time spent within threshold so far, if the timer is running.
    pub fn settled_for(&self, now: Instant) -> Option<Duration> {
        self.stable_since
            .map(|since| now.saturating_duration_since(since))
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scalelink_traits::{Clock, ManualClock};

    fn detector() -> StabilityDetector {
        StabilityDetector::new(StabilityCfg {
            window_size: 5,
            threshold_kg: 0.05,
            required: Duration::from_millis(500),
        })
    }

    #[test]
    fn constant_weight_becomes_stable_after_required_time() {
        let clock = ManualClock::new();
        let mut d = detector();
        // t = 0, 100, 200, 300, 400
        for i in 0..5 {
            if i > 0 {
                clock.advance_ms(100);
            }
            assert!(!d.update(10.0, clock.now()), "sample {i} must be unstable");
        }
        // timer started at t=400; t=500 is only 100ms in
        clock.advance_ms(100);
        assert!(!d.update(10.0, clock.now()));
        clock.advance_ms(399);
        assert!(!d.update(10.0, clock.now()), "1ms short of required");
        clock.advance_ms(1);
        assert!(d.update(10.0, clock.now()));
    }

    #[test]
    fn short_window_does_not_reset_timer() {
        let clock = ManualClock::new();
        let mut d = StabilityDetector::new(StabilityCfg {
            window_size: 3,
            threshold_kg: 0.05,
            required: Duration::ZERO,
        });
        assert!(!d.update(5.0, clock.now()));
        assert!(!d.update(5.0, clock.now()));
        assert!(d.settled_for(clock.now()).is_none());
        // third sample fills the window and starts the timer
        assert!(!d.update(5.0, clock.now()));
        assert!(d.settled_for(clock.now()).is_some());
        // with zero required time the next qualifying sample is stable
        assert!(d.update(5.0, clock.now()));
    }

    #[test]
    fn variation_breach_discards_progress() {
        let clock = ManualClock::new();
        let mut d = detector();
        for _ in 0..6 {
            d.update(10.0, clock.now());
            clock.advance_ms(200);
        }
        assert!(d.update(10.0, clock.now()));

        // one outlier resets the timer
        assert!(!d.update(10.2, clock.now()));
        assert!(d.settled_for(clock.now()).is_none());

        // the outlier stays in the window for four more samples
        for _ in 0..4 {
            clock.advance_ms(10);
            assert!(!d.update(10.0, clock.now()));
        }
        // window is clean again: this sample starts a fresh timer
        clock.advance_ms(10);
        assert!(!d.update(10.0, clock.now()));
        clock.advance_ms(499);
        assert!(!d.update(10.0, clock.now()));
        clock.advance_ms(1);
        assert!(d.update(10.0, clock.now()));
    }

    #[test]
    fn non_positive_average_is_never_stable() {
        let clock = ManualClock::new();
        let mut d = detector();
        for _ in 0..20 {
            assert!(!d.update(0.0, clock.now()));
            clock.advance_ms(1000);
        }
        for _ in 0..20 {
            assert!(!d.update(-1.0, clock.now()));
            clock.advance_ms(1000);
        }
    }

    #[test]
    fn window_is_bounded() {
        let clock = ManualClock::new();
        let mut d = detector();
        for i in 0..100 {
            d.update(i as f64, clock.now());
            assert!(d.window_len() <= 10);
        }
        assert!(d.window_len() >= 5);
    }
}
