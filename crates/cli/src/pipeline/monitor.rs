//! Scheduler status follower - state change logs and retention gauges.

use batch_engine::{SchedulerState, SchedulerStatus};
use tokio::sync::watch;
use tracing::{debug, info};

/// What the monitor saw before the scheduler went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSummary {
    pub updates: u64,
    pub last_state: SchedulerState,
    /// Most batches held in the retention ledger at once
    pub peak_retained: usize,
}

/// Follow status updates until the scheduler is dropped
pub async fn watch_status(mut rx: watch::Receiver<SchedulerStatus>) -> MonitorSummary {
    let mut summary = MonitorSummary {
        updates: 0,
        last_state: rx.borrow().state,
        peak_retained: 0,
    };

    while rx.changed().await.is_ok() {
        let (state, next_seq, buffered, retained, oldest_age_ms) = {
            let status = rx.borrow_and_update();
            (
                status.state,
                status.next_sequence,
                status.buffered,
                status.retained.len(),
                status.retained.first().map(|b| b.age_ms),
            )
        };
        summary.updates += 1;

        if state != summary.last_state {
            info!(from = %summary.last_state, to = %state, next_seq, "Scheduler state changed");
            summary.last_state = state;
        }

        observability::record_retention(retained, oldest_age_ms);
        summary.peak_retained = summary.peak_retained.max(retained);
        debug!(
            next_seq,
            buffered,
            retained,
            oldest_retained_age_ms = ?oldest_age_ms,
            "Scheduler status"
        );
    }

    summary
}
