//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use contracts::{BatchSink, ContractError, MicroBatch};

use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;

type Ack = oneshot::Sender<Result<(), ContractError>>;

/// Worker request
enum SinkRequest {
    Deliver { batch: Arc<MicroBatch>, ack: Ack },
    Flush { ack: Ack },
}

/// Pending acknowledgement for one submitted request
pub struct PendingAck {
    sink_name: String,
    rx: oneshot::Receiver<Result<(), ContractError>>,
}

impl PendingAck {
    pub fn sink_name(&self) -> &str {
        &self.sink_name
    }

    /// Wait for the worker's verdict
    pub async fn wait(self) -> Result<(), ContractError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(ContractError::sink_write(
                &self.sink_name,
                "worker dropped the request",
            )),
        }
    }
}

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Channel to send requests to worker
    tx: mpsc::Sender<SinkRequest>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: BatchSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a batch for the worker
    ///
    /// Waits for queue space; batches are never dropped.
    pub async fn submit(&self, batch: Arc<MicroBatch>) -> Result<PendingAck, DispatcherError> {
        let seq = batch.sequence_number();
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(SinkRequest::Deliver { batch, ack })
            .await
            .map_err(|_| DispatcherError::WorkerStopped {
                sink_name: self.name.clone(),
                seq,
            })?;
        self.metrics
            .set_queued(self.tx.max_capacity() - self.tx.capacity());
        Ok(self.pending(rx))
    }

    /// Ask the worker to flush after everything queued so far
    pub async fn flush(&self) -> Result<PendingAck, DispatcherError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(SinkRequest::Flush { ack })
            .await
            .map_err(|_| ContractError::sink_write(&self.name, "worker stopped before flush"))?;
        Ok(self.pending(rx))
    }

    fn pending(&self, rx: oneshot::Receiver<Result<(), ContractError>>) -> PendingAck {
        PendingAck {
            sink_name: self.name.clone(),
            rx,
        }
    }

    /// Shutdown the sink worker gracefully
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Worker task that consumes requests and drives the sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: BatchSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<SinkRequest>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(request) = rx.recv().await {
        metrics.set_queued(rx.len());

        match request {
            SinkRequest::Deliver { batch, ack } => {
                let result = sink.on_batch(&batch).await;
                match &result {
                    Ok(()) => metrics.on_ack(batch.len()),
                    Err(e) => {
                        metrics.on_reject();
                        error!(
                            sink = %name,
                            seq = batch.sequence_number(),
                            error = %e,
                            "Batch rejected"
                        );
                    }
                }
                // Receiver may have given up
                let _ = ack.send(result);
            }
            SinkRequest::Flush { ack } => {
                let _ = ack.send(sink.flush().await);
            }
        }
    }

    // Cleanup
    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}
