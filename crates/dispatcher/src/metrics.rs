//! Per-sink delivery counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared between a `SinkHandle` and its worker
#[derive(Debug, Default)]
pub struct SinkMetrics {
    queued: AtomicUsize,
    acked_batches: AtomicU64,
    acked_records: AtomicU64,
    rejected_batches: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests waiting in the worker queue
    pub fn set_queued(&self, len: usize) {
        self.queued.store(len, Ordering::Relaxed);
    }

    pub fn on_ack(&self, records: usize) {
        self.acked_batches.fetch_add(1, Ordering::Relaxed);
        self.acked_records.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn on_reject(&self) {
        self.rejected_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            acked_batches: self.acked_batches.load(Ordering::Relaxed),
            acked_records: self.acked_records.load(Ordering::Relaxed),
            rejected_batches: self.rejected_batches.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `SinkMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queued: usize,
    pub acked_batches: u64,
    pub acked_records: u64,
    pub rejected_batches: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_counts_batches_and_records() {
        let m = SinkMetrics::new();
        m.on_ack(3);
        m.on_ack(0);
        m.on_reject();
        m.set_queued(2);
        assert_eq!(
            m.snapshot(),
            MetricsSnapshot {
                queued: 2,
                acked_batches: 2,
                acked_records: 3,
                rejected_batches: 1,
            }
        );
    }
}
