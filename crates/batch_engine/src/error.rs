//! Scheduler error types

use checkpoint::CheckpointError;
use contracts::ContractError;
use thiserror::Error;

use crate::scheduler::SchedulerState;

/// Fatal scheduler errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Checkpoint could not be read or written
    #[error("checkpoint failure: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Stored checkpoint belongs to a different adapter configuration
    #[error("{0}")]
    Contract(#[from] ContractError),

    /// Sink refused the batch on every attempt
    #[error("sink '{sink}' rejected batch {seq} after {attempts} attempts: {last_error}")]
    SinkExhausted {
        sink: String,
        seq: u64,
        attempts: u32,
        last_error: String,
    },

    /// Operation not valid in the current state
    #[error("scheduler is {actual}, expected {expected}")]
    InvalidState {
        expected: SchedulerState,
        actual: SchedulerState,
    },
}

/// Scheduler Result 类型别名
pub type Result<T> = std::result::Result<T, SchedulerError>;
