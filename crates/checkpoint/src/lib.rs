//! # Checkpoint
//!
//! Durable progress store for the batch scheduler.
//!
//! Responsibilities:
//! - Persist `CheckpointRecord` after each acknowledged batch
//! - Load the last checkpoint once at startup
//! - Refuse to guess on corruption: a bad file is a fatal error
//!
//! ## Stores
//!
//! - [`FileCheckpointStore`]: `<dir>/checkpoint.json`, atomic replace + fsync
//! - [`MemoryCheckpointStore`]: in-memory, with write fault injection for tests

pub mod error;
pub mod file;
pub mod memory;
mod store;

pub use error::{CheckpointError, Result};
pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use store::{CheckpointStore, LocalCheckpointStore};
