use std::time::Instant;

use scalelink_traits::Clock;

/// Clock backed by tokio's timer, so a paused test runtime also pauses
/// stability and heartbeat timing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}
