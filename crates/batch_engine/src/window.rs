//! Window bookkeeping
//!
//! 窗口序号与起点只在 commit 后前移，重试时同一窗口保持不变。

use contracts::{BatchWindow, TimestampMs};
use tracing::warn;

/// Next window to close: its sequence number and inclusive start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowClock {
    next_seq: u64,
    start_ms: TimestampMs,
}

impl WindowClock {
    /// 首次启动从序号 1 开始
    pub fn fresh(start_ms: TimestampMs) -> Self {
        Self {
            next_seq: 1,
            start_ms,
        }
    }

    /// 从 checkpoint 恢复：紧接上一个已提交窗口
    pub fn resume(last_seq: u64, last_end_ms: TimestampMs) -> Self {
        Self {
            next_seq: last_seq + 1,
            start_ms: last_end_ms,
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_seq
    }

    pub fn start_ms(&self) -> TimestampMs {
        self.start_ms
    }

    /// Window ending at `end_ms`
    ///
    /// An end before the start (clock stepped backwards) yields an empty
    /// window at the start so windows stay contiguous.
    pub fn close_at(&self, end_ms: TimestampMs) -> BatchWindow {
        if end_ms < self.start_ms {
            warn!(
                start_ms = self.start_ms,
                end_ms, "window end precedes start; clamping"
            );
        }
        BatchWindow {
            sequence_number: self.next_seq,
            start_ms: self.start_ms,
            end_ms: end_ms.max(self.start_ms),
        }
    }

    /// 窗口已提交，前移到下一个
    pub fn advance(&mut self, committed: &BatchWindow) {
        debug_assert_eq!(committed.sequence_number, self.next_seq);
        self.next_seq = committed.sequence_number + 1;
        self.start_ms = committed.end_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_are_contiguous_and_gap_free() {
        let mut clock = WindowClock::fresh(0);
        let mut previous: Option<BatchWindow> = None;

        for end in [5_000, 10_000, 15_000, 20_000] {
            let window = clock.close_at(end);
            if let Some(prev) = previous {
                assert!(prev.is_followed_by(&window));
            }
            clock.advance(&window);
            previous = Some(window);
        }
        assert_eq!(clock.next_sequence(), 5);
    }

    #[test]
    fn test_close_does_not_advance() {
        let clock = WindowClock::fresh(0);
        assert_eq!(clock.close_at(5_000), clock.close_at(5_000));
        assert_eq!(clock.next_sequence(), 1);
    }

    #[test]
    fn test_resume_continues_after_checkpoint() {
        let clock = WindowClock::resume(7, 35_000);
        let window = clock.close_at(41_000);
        assert_eq!(window.sequence_number, 8);
        assert_eq!(window.start_ms, 35_000);
        assert_eq!(window.end_ms, 41_000);
    }

    #[test]
    fn test_backwards_end_is_clamped() {
        let clock = WindowClock::resume(1, 10_000);
        let window = clock.close_at(9_000);
        assert_eq!(window.start_ms, 10_000);
        assert_eq!(window.end_ms, 10_000);
    }
}
