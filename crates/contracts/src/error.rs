//! Layered error definitions
//!
//! Categorized by source: config / source / sink / checkpoint

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Source Errors =====
    /// Source could not be opened (unreachable endpoint, missing directory)
    #[error("source '{name}' unavailable: {message}")]
    SourceUnavailable { name: String, message: String },

    /// Source failed while producing records
    #[error("source '{name}' read error: {message}")]
    SourceRead { name: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== Checkpoint Errors =====
    /// Checkpoint could not be read or written
    #[error("checkpoint io error at '{path}': {message}")]
    CheckpointIo { path: String, message: String },

    /// Checkpoint exists but cannot be decoded
    #[error("checkpoint at '{path}' is corrupt: {message}; inspect or reset it before restarting")]
    CheckpointCorrupt { path: String, message: String },

    /// Checkpoint was written by an incompatible adapter configuration
    #[error(
        "checkpoint was written with a different '{field}' (stored {stored}, current {current}); \
         restore the previous configuration or reset the checkpoint"
    )]
    AdapterMismatch {
        field: String,
        stored: String,
        current: String,
    },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create source unavailable error
    pub fn source_unavailable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create source read error
    pub fn source_read(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceRead {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create checkpoint io error
    pub fn checkpoint_io(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CheckpointIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create checkpoint corruption error
    pub fn checkpoint_corrupt(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CheckpointCorrupt {
            path: path.into(),
            message: message.into(),
        }
    }
}
