//! # Dispatcher
//!
//! 下游 sink 分发模块。
//!
//! 负责：
//! - 每个 sink 独立队列 + worker task
//! - 将 `MicroBatch` fan-out 到所有 sinks
//! - 所有 sink ack 后才向调度器 ack（任一失败则整批失败，由调度器重试）

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{BatchSink, MicroBatch};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, LogSink, NetworkSink};
