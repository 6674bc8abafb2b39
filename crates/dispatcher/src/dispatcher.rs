//! Dispatcher - fan-out of micro-batches to every configured sink

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use contracts::{BatchSink, ContractError, MicroBatch, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::{PendingAck, SinkHandle};
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink, NetworkSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sink configurations
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    /// Build the dispatcher and start one worker per sink
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        let handles = Self::initialize_handles(&self.config).await?;
        Ok(Dispatcher::with_handles(handles))
    }

    #[instrument(
        name = "dispatcher_initialize_handles",
        skip(config),
        fields(sink_count = config.sinks.len())
    )]
    async fn initialize_handles(
        config: &DispatcherConfig,
    ) -> Result<Vec<SinkHandle>, DispatcherError> {
        if config.sinks.is_empty() {
            warn!("no sinks configured; falling back to a log sink");
            return Ok(vec![SinkHandle::spawn(LogSink::new("log"), 16)]);
        }

        let mut handles = Vec::with_capacity(config.sinks.len());
        for sink_config in &config.sinks {
            handles.push(create_sink_handle(sink_config).await?);
        }
        Ok(handles)
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
async fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::from_params(&config.name, &config.params);
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .await
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}

/// Fans each batch out to all sinks and acks only when every sink acked
///
/// A retried batch goes to every sink again, including the ones that already
/// accepted it; sinks must tolerate a repeated sequence number.
pub struct Dispatcher {
    name: String,
    handles: Vec<SinkHandle>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>) -> Self {
        let name = handles
            .iter()
            .map(SinkHandle::name)
            .collect::<Vec<_>>()
            .join("+");
        Self { name, handles }
    }

    /// Number of sinks behind this dispatcher
    pub fn sink_count(&self) -> usize {
        self.handles.len()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Wait for every pending ack; report the failed sinks
    async fn collect(pending: Vec<PendingAck>, record_delivery: bool) -> Vec<(String, ContractError)> {
        let mut failures = Vec::new();
        for ack in pending {
            let sink = ack.sink_name().to_string();
            let result = ack.wait().await;
            if record_delivery {
                observability::record_sink_delivery(&sink, result.is_ok());
            }
            if let Err(e) = result {
                failures.push((sink, e));
            }
        }
        failures
    }

    fn failure_error(&self, what: &str, failures: Vec<(String, ContractError)>) -> ContractError {
        let detail = failures
            .iter()
            .map(|(sink, e)| format!("{sink}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");
        ContractError::sink_write(
            &self.name,
            format!(
                "{what} failed on {}/{} sinks ({detail})",
                failures.len(),
                self.handles.len()
            ),
        )
    }
}

impl BatchSink for Dispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "dispatcher_on_batch",
        skip(self, batch),
        fields(seq = batch.sequence_number(), records = batch.len())
    )]
    async fn on_batch(&mut self, batch: &MicroBatch) -> Result<(), ContractError> {
        let shared = Arc::new(batch.clone());
        let mut pending = Vec::with_capacity(self.handles.len());
        for handle in &self.handles {
            pending.push(handle.submit(Arc::clone(&shared)).await?);
        }

        let failures = Self::collect(pending, true).await;
        if failures.is_empty() {
            debug!(sinks = self.handles.len(), "batch acknowledged by all sinks");
            Ok(())
        } else {
            Err(self.failure_error("delivery", failures))
        }
    }

    #[instrument(name = "dispatcher_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        let mut pending = Vec::with_capacity(self.handles.len());
        for handle in &self.handles {
            pending.push(handle.flush().await?);
        }
        let failures = Self::collect(pending, false).await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(self.failure_error("flush", failures))
        }
    }

    #[instrument(name = "dispatcher_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        for handle in std::mem::take(&mut self.handles) {
            handle.shutdown().await;
        }
        info!(sink = %self.name, "Dispatcher shutdown complete");
        Ok(())
    }
}

/// Convenience function to create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs))]
pub async fn create_dispatcher(sink_configs: Vec<SinkConfig>) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config).build().await
}
