//! Pipeline orchestrator - wires source, scheduler, checkpoint store and sinks.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use batch_engine::{BatchScheduler, SchedulerConfig, TokioClock};
use checkpoint::{CheckpointStore, FileCheckpointStore};
use contracts::{BatchSink, Clock, RecordNormalizer, RecordSource, StreamBlueprint};
use ingestion::{IngestionMetrics, IngestionPipeline, SourceAdapter, StatusNormalizer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::monitor::watch_status;
use super::PipelineStats;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The stream blueprint configuration
    pub blueprint: StreamBlueprint,

    /// Stop after this many committed batches (None = unlimited)
    pub max_batches: Option<u64>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the stream ends, `cancel` fires or the batch limit is hit
    ///
    /// The checkpoint is loaded and checked against the configured source
    /// before the source is opened, so a mismatched checkpoint fails the run
    /// without pulling a single record.
    pub async fn run(self, cancel: CancellationToken) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::install_prometheus(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let clock: Arc<dyn Clock> = Arc::new(TokioClock::system());

        // Checkpoint: resume or fresh
        let store = FileCheckpointStore::new(&blueprint.checkpoint.directory);
        info!(location = %store.location(), "Loading checkpoint...");
        let scheduler_config = SchedulerConfig::from_streaming(&blueprint.streaming)
            .with_max_batches(self.config.max_batches);
        let mut scheduler = BatchScheduler::initialize(
            scheduler_config,
            store,
            blueprint.source.fingerprint(),
            Arc::clone(&clock),
        )
        .await
        .context("Failed to initialize batch scheduler")?;
        let monitor = tokio::spawn(watch_status(scheduler.subscribe()));

        // Source
        let metrics = Arc::new(IngestionMetrics::new());
        let mut source =
            SourceAdapter::from_config(&blueprint.source, Arc::clone(&clock), Arc::clone(&metrics))
                .context("Failed to build source adapter")?;
        let source_tag = source.tag();
        source
            .open(&scheduler.resume_point())
            .await
            .with_context(|| format!("Failed to open source '{}'", source.name()))?;

        // Sinks
        let mut dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone())
            .await
            .context("Failed to create dispatcher")?;
        info!(sinks = dispatcher.sink_count(), "Dispatcher started");

        // Ingestion pump
        let mut ingestion =
            IngestionPipeline::with_metrics(blueprint.streaming.channel_capacity, Arc::clone(&metrics));
        let records = ingestion
            .take_receiver()
            .context("Failed to get ingestion receiver")?;
        let pump_cancel = cancel.child_token();
        let pump = ingestion.start(source, pump_cancel.clone());

        info!(max_batches = ?self.config.max_batches, "Pipeline running");

        let normalizer = StatusNormalizer::new();
        let outcome = scheduler
            .run(records, &normalizer, &mut dispatcher, cancel)
            .await;
        drop(scheduler);
        match monitor.await {
            Ok(seen) => debug!(
                updates = seen.updates,
                peak_retained = seen.peak_retained,
                "Status monitor stopped"
            ),
            Err(e) => warn!(error = %e, "Status monitor failed"),
        }

        // Scheduler is done; stop pulling
        info!("Shutting down pipeline...");
        pump_cancel.cancel();
        let pump_result = pump.join().await;

        let sink_metrics = dispatcher.metrics();
        if let Err(e) = dispatcher.close().await {
            warn!(error = %e, "Error while closing sinks");
        }

        let run = outcome.context("Batch scheduler stopped with a fatal error")?;
        let pump_summary = match pump_result {
            Ok(summary) => {
                observability::record_source_records(source_tag, summary.forwarded);
                summary
            }
            Err(e) => {
                error!(error = %e, "Source failed");
                return Err(e).context("Source adapter failed");
            }
        };

        let stats = PipelineStats {
            run,
            pump: pump_summary,
            ingestion: metrics.snapshot(),
            records_dropped: normalizer.dropped_count(),
            sinks: sink_metrics,
            duration: start_time.elapsed(),
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            records_per_sec = format!("{:.2}", stats.records_per_sec()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}
