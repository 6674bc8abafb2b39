//! RecordSource trait - Source adapter abstraction
//!
//! Live and replay feeds are consumed through the same lazy pull interface:
//! `open(resume)` once, then `next_record()` until it returns `None`.

use crate::{CheckpointRecord, ContractError, RawRecord, ReplayProgress, SourceTag, TimestampMs};

/// Where a restarted source picks up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumePoint {
    /// End of the last committed window; `None` on a fresh start
    pub since: Option<TimestampMs>,

    /// Replay lines already inside committed batches
    pub replay: ReplayProgress,
}

impl ResumePoint {
    pub fn fresh() -> Self {
        Self::default()
    }

    pub fn from_checkpoint(checkpoint: &CheckpointRecord) -> Self {
        Self {
            since: Some(checkpoint.last_batch_end_time),
            replay: checkpoint.replay_progress.clone(),
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.since.is_none()
    }
}

/// Lazy sequence of raw records
#[trait_variant::make(RecordSource: Send)]
pub trait LocalRecordSource {
    /// Source name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Provenance tag stamped on every record
    fn tag(&self) -> SourceTag;

    /// Prepare the source, skipping what `resume` proves committed where the
    /// source can honor it
    ///
    /// # Errors
    /// Fails when the source is unreachable or misconfigured; this is fatal.
    async fn open(&mut self, resume: &ResumePoint) -> Result<(), ContractError>;

    /// Next record; `Ok(None)` once a finite source is exhausted
    ///
    /// Transient failures are retried inside the source and never surface here.
    async fn next_record(&mut self) -> Result<Option<RawRecord>, ContractError>;

    /// Release connections/handles
    async fn close(&mut self) -> Result<(), ContractError>;
}
