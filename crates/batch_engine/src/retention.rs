//! Retention ledger ("remember duration")
//!
//! 已提交 batch 在 remember 时长内保持可查询；过期后淘汰。

use std::collections::VecDeque;
use std::time::Duration;

use contracts::{BatchWindow, TimestampMs};
use serde::Serialize;

/// A committed batch still inside the remember duration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetainedBatch {
    pub window: BatchWindow,
    pub records: usize,
    pub committed_at_ms: TimestampMs,
    /// Age at the time of the last status publication
    pub age_ms: i64,
}

/// Committed batches ordered by sequence number
#[derive(Debug, Clone)]
pub struct RetentionLedger {
    remember_ms: i64,
    entries: VecDeque<RetainedBatch>,
}

impl RetentionLedger {
    pub fn new(remember: Duration) -> Self {
        Self {
            remember_ms: remember.as_millis() as i64,
            entries: VecDeque::new(),
        }
    }

    /// Record a commit, then evict what has aged out
    pub fn record(&mut self, window: BatchWindow, records: usize, now_ms: TimestampMs) {
        self.entries.push_back(RetainedBatch {
            window,
            records,
            committed_at_ms: now_ms,
            age_ms: window.age_ms(now_ms),
        });
        self.evict(now_ms);
    }

    /// Drop batches whose window closed more than the remember duration ago
    pub fn evict(&mut self, now_ms: TimestampMs) -> usize {
        let before = self.entries.len();
        while self
            .entries
            .front()
            .is_some_and(|e| e.window.age_ms(now_ms) > self.remember_ms)
        {
            self.entries.pop_front();
        }
        before - self.entries.len()
    }

    /// Retained batches with ages as of `now_ms`
    pub fn snapshot(&self, now_ms: TimestampMs) -> Vec<RetainedBatch> {
        self.entries
            .iter()
            .map(|e| RetainedBatch {
                age_ms: e.window.age_ms(now_ms),
                ..e.clone()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
