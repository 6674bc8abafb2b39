//! Tokio-driven clock
//!
//! Wall time captured once, then advanced by `tokio::time::Instant`. Under a
//! paused runtime the clock moves only with `tokio::time::advance`, which
//! keeps window boundaries deterministic in tests.

use contracts::{Clock, SystemClock, TimestampMs};
use tokio::time::Instant;

/// Clock shared by the source adapter and the scheduler
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    base_ms: TimestampMs,
    anchor: Instant,
}

impl TokioClock {
    /// Clock reading `base_ms` now
    pub fn starting_at(base_ms: TimestampMs) -> Self {
        Self {
            base_ms,
            anchor: Instant::now(),
        }
    }

    /// Clock anchored at the current wall time
    pub fn system() -> Self {
        Self::starting_at(SystemClock.now_ms())
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> TimestampMs {
        self.base_ms + self.anchor.elapsed().as_millis() as TimestampMs
    }
}
