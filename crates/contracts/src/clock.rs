//! Clock abstraction shared by source adapters and the scheduler

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::TimestampMs;

/// Source of `ingested_at_ms` stamps and window boundaries
///
/// Adapters and the scheduler must share one clock so that records land in
/// the window that was open when they were pulled.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> TimestampMs;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as TimestampMs)
            .unwrap_or_default()
    }
}
