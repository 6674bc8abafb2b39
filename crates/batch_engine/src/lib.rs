//! # Batch Engine
//!
//! 微批调度引擎。
//!
//! 负责：
//! - 按固定间隔切分记录流为连续、不重叠的 `BatchWindow`
//! - 归一化 + 批内去重后整体交给 sink
//! - sink ack 后持久化 checkpoint，失败按指数退避重试
//! - 启动时 resume-or-fresh，两条分支显式记录日志
//!
//! ## 使用示例
//!
//! ```ignore
//! use batch_engine::{BatchScheduler, SchedulerConfig, TokioClock};
//!
//! let clock = Arc::new(TokioClock::system());
//! let mut scheduler = BatchScheduler::initialize(
//!     SchedulerConfig::from_streaming(&blueprint.streaming),
//!     FileCheckpointStore::new(&blueprint.checkpoint.directory),
//!     blueprint.source.fingerprint(),
//!     clock.clone(),
//! )
//! .await?;
//!
//! source.open(&scheduler.resume_point()).await?;
//! let summary = scheduler.run(rx, &normalizer, &mut sink, cancel).await?;
//! ```

mod buffer;
mod clock;
mod error;
mod retention;
mod retry;
mod scheduler;
mod window;

// Re-exports
pub use buffer::BatchBuffer;
pub use clock::TokioClock;
pub use error::{Result, SchedulerError};
pub use retention::{RetainedBatch, RetentionLedger};
pub use retry::RetryPolicy;
pub use scheduler::{
    BatchScheduler, RunSummary, SchedulerConfig, SchedulerState, SchedulerStatus, StopReason,
};
pub use window::WindowClock;
