//! BatchSink trait - Downstream sink interface
//!
//! The only interface the ingestion core exposes outward.

use crate::{ContractError, MicroBatch};

/// Downstream batch consumer
///
/// `Ok(())` from [`on_batch`](LocalBatchSink::on_batch) is the acknowledgement
/// that allows the scheduler to checkpoint the batch.
#[trait_variant::make(BatchSink: Send)]
pub trait LocalBatchSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Consume one micro-batch
    ///
    /// # Errors
    /// Returns write error (should include context); the batch will be retried
    async fn on_batch(&mut self, batch: &MicroBatch) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
