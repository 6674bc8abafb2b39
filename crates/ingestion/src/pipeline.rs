//! Ingestion Pipeline main entry
//!
//! Runs the opened source in its own task and forwards records, in source
//! order, over a bounded channel. A full channel suspends the pump, which
//! stops pulling from the source.

use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{RawRecord, RecordSource};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};

/// Why the pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// Finite source ran dry
    Exhausted,
    /// Cancellation token fired
    Cancelled,
    /// Receiver dropped
    ReceiverClosed,
}

/// Pump result
#[derive(Debug, Clone)]
pub struct PumpSummary {
    pub source: String,
    pub forwarded: u64,
    /// Records pulled from the source but never handed to the scheduler
    pub unsent: u64,
    pub exit: PumpExit,
}

/// Handle to a running pump
pub struct PumpHandle {
    task: JoinHandle<Result<PumpSummary>>,
}

impl PumpHandle {
    /// Wait for the pump to stop
    pub async fn join(self) -> Result<PumpSummary> {
        self.task.await?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Ingestion Pipeline
///
/// Owns the channel between the source adapter and the scheduler.
pub struct IngestionPipeline {
    /// Shared metrics
    metrics: Arc<IngestionMetrics>,

    /// Data sender
    tx: Sender<RawRecord>,

    /// Data receiver
    rx: Option<Receiver<RawRecord>>,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline
    ///
    /// # Arguments
    /// * `channel_capacity` - Channel capacity
    pub fn new(channel_capacity: usize) -> Self {
        Self::with_metrics(channel_capacity, Arc::new(IngestionMetrics::new()))
    }

    /// Create sharing metrics with the source adapter
    pub fn with_metrics(channel_capacity: usize, metrics: Arc<IngestionMetrics>) -> Self {
        let (tx, rx) = bounded(channel_capacity.max(1));
        Self {
            metrics,
            tx,
            rx: Some(rx),
        }
    }

    /// Get data stream receiver
    ///
    /// Note: Can only be called once, subsequent calls return None
    pub fn take_receiver(&mut self) -> Option<Receiver<RawRecord>> {
        self.rx.take()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Spawn the pump for an already opened source
    ///
    /// The channel closes when the pump stops, which tells the scheduler that
    /// the stream ended.
    #[instrument(name = "ingestion_start", skip_all, fields(source = %source.name()))]
    pub fn start<S>(self, source: S, cancel: CancellationToken) -> PumpHandle
    where
        S: RecordSource + 'static,
    {
        let Self { metrics, tx, rx } = self;
        // 接收端若没被取走则直接丢弃
        drop(rx);

        info!("starting ingestion pump");
        let task = tokio::spawn(pump(source, tx, metrics, cancel));
        PumpHandle { task }
    }
}

async fn pump<S>(
    mut source: S,
    tx: Sender<RawRecord>,
    metrics: Arc<IngestionMetrics>,
    cancel: CancellationToken,
) -> Result<PumpSummary>
where
    S: RecordSource,
{
    let name = source.name().to_string();
    let mut forwarded: u64 = 0;
    let mut unsent: u64 = 0;

    let exit = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break PumpExit::Cancelled,
            next = source.next_record() => next,
        };

        let record = match next {
            Ok(Some(record)) => record,
            Ok(None) => break PumpExit::Exhausted,
            Err(e) => {
                error!(source = %name, error = %e, "source failed");
                if let Err(close_err) = source.close().await {
                    warn!(source = %name, error = %close_err, "source close failed");
                }
                return Err(IngestionError::Source(e));
            }
        };

        let record = match tx.try_send(record) {
            Ok(()) => None,
            Err(TrySendError::Full(record)) => Some(record),
            Err(TrySendError::Closed(_)) => {
                unsent += 1;
                break PumpExit::ReceiverClosed;
            }
        };

        // 通道已满：等待空位，期间允许取消
        if let Some(record) = record {
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    unsent += 1;
                    break PumpExit::Cancelled;
                }
                sent = tx.send(record) => sent,
            };
            if sent.is_err() {
                unsent += 1;
                break PumpExit::ReceiverClosed;
            }
        }

        forwarded += 1;
        metrics.update_queue_len(tx.len());
    };

    if let Err(e) = source.close().await {
        warn!(source = %name, error = %e, "source close failed");
    }
    if unsent > 0 {
        info!(
            source = %name,
            unsent,
            "pulled records left unsent at stop; they are not checkpointed"
        );
    }
    debug!(source = %name, forwarded, exit = ?exit, "ingestion pump stopped");

    Ok(PumpSummary {
        source: name,
        forwarded,
        unsent,
        exit,
    })
}
