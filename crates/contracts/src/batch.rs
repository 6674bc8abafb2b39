//! BatchWindow / MicroBatch - Batch Scheduler output

use serde::{Deserialize, Serialize};

use crate::{CanonicalRecord, TimestampMs};

/// A closed micro-batch window, half-open `[start_ms, end_ms)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWindow {
    /// Strictly increasing, gap-free sequence number
    pub sequence_number: u64,

    /// Inclusive start (epoch ms)
    pub start_ms: TimestampMs,

    /// Exclusive end (epoch ms)
    pub end_ms: TimestampMs,
}

impl BatchWindow {
    /// Window length in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Whether `ts` falls inside the window
    pub fn contains(&self, ts: TimestampMs) -> bool {
        ts >= self.start_ms && ts < self.end_ms
    }

    /// Time elapsed since the window closed; zero if `now_ms` precedes the end
    pub fn age_ms(&self, now_ms: TimestampMs) -> i64 {
        (now_ms - self.end_ms).max(0)
    }

    /// Whether `other` directly follows this window
    pub fn is_followed_by(&self, other: &BatchWindow) -> bool {
        other.sequence_number == self.sequence_number + 1 && other.start_ms == self.end_ms
    }
}

/// The atomic unit handed to the downstream sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroBatch {
    /// Window this batch covers
    pub window: BatchWindow,

    /// Normalized records in arrival order
    pub records: Vec<CanonicalRecord>,
}

impl MicroBatch {
    pub fn new(window: BatchWindow, records: Vec<CanonicalRecord>) -> Self {
        Self { window, records }
    }

    pub fn sequence_number(&self) -> u64 {
        self.window.sequence_number
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Per-batch delivery facts, published after each commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Committed window
    pub window: BatchWindow,

    /// Records handed to the sink
    pub records: usize,

    /// Raw records the normalizer rejected in this window
    pub malformed_dropped: u64,

    /// Later duplicates of an id already in the batch
    pub duplicates_dropped: u64,

    /// Records stamped at or after the window end, moved to the next window
    pub carried_over: usize,

    /// Sink attempts used (1 = first try succeeded)
    pub attempts: u32,

    /// Time from window close to checkpoint commit
    pub commit_latency_ms: i64,

    /// How far the window ran past the batch interval, e.g. across downtime
    /// before a resume
    #[serde(default)]
    pub overrun_ms: i64,
}
