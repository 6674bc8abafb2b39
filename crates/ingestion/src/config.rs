//! Ingestion metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Ingestion metrics
///
/// Shared between the active source adapter and the pump.
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Raw records pulled from the source
    pub records_pulled: AtomicU64,

    /// Keep-alive lines received from the live feed
    pub keepalives: AtomicU64,

    /// Successful reconnects after a lost connection
    pub reconnects: AtomicU64,

    /// Failed connect attempts
    pub connect_failures: AtomicU64,

    /// Replay files fully consumed
    pub files_completed: AtomicU64,

    /// Replay lines skipped on resume, already inside committed batches
    pub lines_skipped: AtomicU64,

    /// Transient read errors absorbed by the source
    pub read_errors: AtomicU64,

    /// Current queue length
    pub queue_len: AtomicUsize,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pulled(&self) {
        self.records_pulled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_keepalive(&self) {
        self.keepalives.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_completed(&self) {
        self.files_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lines_skipped(&self, lines: u64) {
        self.lines_skipped.fetch_add(lines, Ordering::Relaxed);
    }

    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Update queue length
    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_pulled: self.records_pulled.load(Ordering::Relaxed),
            keepalives: self.keepalives.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            files_completed: self.files_completed.load(Ordering::Relaxed),
            lines_skipped: self.lines_skipped.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub records_pulled: u64,
    pub keepalives: u64,
    pub reconnects: u64,
    pub connect_failures: u64,
    pub files_completed: u64,
    pub lines_skipped: u64,
    pub read_errors: u64,
    pub queue_len: usize,
}
