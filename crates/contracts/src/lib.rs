//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace: the
//! record/batch/checkpoint data model, the source, normalizer and sink traits,
//! the configuration blueprint and the error taxonomy.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - All timestamps are epoch milliseconds (`TimestampMs`)
//! - A [`BatchWindow`] is half-open: `[start_ms, end_ms)`
//! - Records are assigned to windows by `ingested_at_ms`, stamped by a shared [`Clock`]

mod batch;
mod blueprint;
mod checkpoint;
mod clock;
mod error;
mod fingerprint;
mod normalizer;
mod record;
mod sink;
mod source;

pub use batch::*;
pub use blueprint::*;
pub use checkpoint::*;
pub use clock::{Clock, SystemClock};
pub use error::*;
pub use fingerprint::AdapterFingerprint;
pub use normalizer::RecordNormalizer;
pub use record::*;
pub use sink::*;
pub use source::*;
