//! # Ingestion
//!
//! Record source adapters and the ingestion pump.
//!
//! Responsibilities:
//! - Pull raw records from the live feed or the replay directory
//! - Retry transient source failures internally, with backoff
//! - Normalize raw status payloads into `CanonicalRecord`
//! - Forward records to the scheduler via a bounded async-channel (back-pressure)
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{IngestionPipeline, SourceAdapter};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut source = SourceAdapter::from_config(&blueprint.source, clock, metrics)?;
//! source.open(&resume_point).await?;
//!
//! let mut pipeline = IngestionPipeline::new(1024);
//! let rx = pipeline.take_receiver().unwrap();
//! let pump = pipeline.start(source, CancellationToken::new());
//! while let Ok(record) = rx.recv().await {
//!     // hand to the scheduler
//! }
//! ```

mod backoff;
mod config;
mod error;
pub mod live;
mod normalizer;
mod pipeline;
pub mod replay;
mod scripted;
mod source;

// Re-exports
pub use backoff::Backoff;
pub use config::{IngestionMetrics, MetricsSnapshot};
pub use error::{IngestionError, Result};
pub use live::LiveFeedSource;
pub use normalizer::StatusNormalizer;
pub use pipeline::{IngestionPipeline, PumpExit, PumpHandle, PumpSummary};
pub use replay::ReplayFileSource;
pub use scripted::{ScriptedSource, ScriptedStep};
pub use source::SourceAdapter;
