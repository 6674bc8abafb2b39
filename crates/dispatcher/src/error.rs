//! Dispatcher errors

use contracts::ContractError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A configured sink could not be built
    #[error("cannot create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Worker task is gone; the batch never reached the sink
    #[error("sink '{sink_name}' worker stopped, batch {seq} not delivered")]
    WorkerStopped { sink_name: String, seq: u64 },

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl DispatcherError {
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<DispatcherError> for ContractError {
    fn from(err: DispatcherError) -> Self {
        match err {
            DispatcherError::Contract(e) => e,
            DispatcherError::SinkCreation { name, message } => Self::SinkConnection {
                sink_name: name,
                message,
            },
            DispatcherError::WorkerStopped { sink_name, seq } => {
                Self::sink_write(sink_name, format!("worker stopped before batch {seq}"))
            }
        }
    }
}
