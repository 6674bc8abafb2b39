//! Checkpoint error types

use std::path::{Path, PathBuf};

use contracts::ContractError;
use thiserror::Error;

/// Checkpoint store errors
///
/// Every variant is fatal to the scheduler.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Filesystem failure
    #[error("checkpoint io error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint file exists but is not a valid record
    #[error("checkpoint at '{}' is corrupt: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },

    /// Record could not be encoded
    #[error("failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),

    /// Write refused by the store (memory store fault injection)
    #[error("checkpoint write rejected: {0}")]
    WriteRejected(String),
}

impl CheckpointError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn corrupt(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }
}

impl From<CheckpointError> for ContractError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Io { path, source } => {
                ContractError::checkpoint_io(path.display().to_string(), source.to_string())
            }
            CheckpointError::Corrupt { path, message } => {
                ContractError::checkpoint_corrupt(path.display().to_string(), message)
            }
            CheckpointError::Encode(e) => ContractError::checkpoint_io("<encode>", e.to_string()),
            CheckpointError::WriteRejected(message) => {
                ContractError::checkpoint_io("<memory>", message)
            }
        }
    }
}

/// Checkpoint Result 类型别名
pub type Result<T> = std::result::Result<T, CheckpointError>;
