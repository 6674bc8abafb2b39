//! LogSink - logs batch summaries via tracing

use std::collections::HashMap;

use contracts::{BatchSink, ContractError, MicroBatch};
use tracing::{info, instrument};

/// Sink that logs batch summaries for debugging
pub struct LogSink {
    name: String,
    /// Also log up to this many records per batch
    sample: usize,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sample: 0,
        }
    }

    /// Create from params map; `sample` sets how many records are echoed
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> Self {
        let sample = params
            .get("sample")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Self {
            sample,
            ..Self::new(name)
        }
    }

    fn log_batch_summary(&self, batch: &MicroBatch) {
        info!(
            sink = %self.name,
            seq = batch.sequence_number(),
            start_ms = batch.window.start_ms,
            end_ms = batch.window.end_ms,
            records = batch.len(),
            "MicroBatch received"
        );

        for record in batch.records.iter().take(self.sample) {
            info!(
                sink = %self.name,
                seq = batch.sequence_number(),
                id = %record.id,
                author = %record.author,
                text = %record.text,
                "record"
            );
        }
    }
}

impl BatchSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_on_batch",
        skip(self, batch),
        fields(sink = %self.name, seq = batch.sequence_number())
    )]
    async fn on_batch(&mut self, batch: &MicroBatch) -> Result<(), ContractError> {
        self.log_batch_summary(batch);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::BatchWindow;

    #[tokio::test]
    async fn test_log_sink_accepts_empty_batch() {
        let mut sink = LogSink::new("test_log");
        let batch = MicroBatch::new(
            BatchWindow {
                sequence_number: 1,
                start_ms: 0,
                end_ms: 5_000,
            },
            Vec::new(),
        );

        assert!(sink.on_batch(&batch).await.is_ok());
    }

    #[test]
    fn test_log_sink_params() {
        let params = HashMap::from([("sample".to_string(), "3".to_string())]);
        let sink = LogSink::from_params("my_logger", &params);
        assert_eq!(sink.name(), "my_logger");
        assert_eq!(sink.sample, 3);
    }
}
