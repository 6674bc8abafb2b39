//! Batch scheduler
//!
//! 状态机：`Stopped → Initializing → Running → Stopping → Stopped`。
//!
//! 单任务 tick 循环：`select!` 监听 interval tick、记录通道与取消令牌。
//! sink 投递期间不读通道，有界通道写满后 ingestion pump 自然挂起（背压）。
//!
//! checkpoint 同时记录 replay 进度：每个文件已提交的行数，不越过仍在缓冲区的记录。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use checkpoint::CheckpointStore;
use contracts::{
    AdapterFingerprint, BatchReport, BatchSink, BatchWindow, CheckpointRecord, Clock,
    MicroBatch, RawRecord, RecordNormalizer, ReplayProgress, ResumePoint, SchedulerSnapshot,
    StreamingConfig, TimestampMs,
};
use observability::{BatchMetricsAggregator, MetricsSummary};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::buffer::{normalize_window, BatchBuffer};
use crate::error::{Result, SchedulerError};
use crate::retention::{RetainedBatch, RetentionLedger};
use crate::retry::RetryPolicy;
use crate::window::WindowClock;

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Initializing,
    Running,
    Stopping,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fixed window length
    pub batch_interval: Duration,
    /// How long committed batches stay in the retention ledger
    pub remember: Duration,
    /// Total sink attempts per batch
    pub max_sink_attempts: u32,
    /// Delay after the first failed attempt (doubles afterwards)
    pub retry_backoff: Duration,
    /// Stop after this many committed batches
    pub max_batches: Option<u64>,
}

impl SchedulerConfig {
    pub fn from_streaming(streaming: &StreamingConfig) -> Self {
        Self {
            batch_interval: streaming.batch_interval(),
            remember: streaming.remember(),
            max_sink_attempts: streaming.max_sink_attempts,
            retry_backoff: streaming.retry_backoff(),
            max_batches: None,
        }
    }

    pub fn with_max_batches(mut self, max_batches: Option<u64>) -> Self {
        self.max_batches = max_batches;
        self
    }

    /// Settings recorded in every checkpoint
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            batch_interval_ms: self.batch_interval.as_millis() as u64,
            remember_ms: self.remember.as_millis() as u64,
            max_sink_attempts: self.max_sink_attempts,
        }
    }
}

/// Why `run` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Record stream ended and the final window was committed
    StreamEnded,
    /// Cancellation token fired; the open window was committed
    Cancelled,
    /// `max_batches` reached
    MaxBatches,
}

/// Monitoring snapshot published on every state change and commit
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// Sequence number of the next window to close
    pub next_sequence: u64,
    /// Start of the currently open window
    pub window_start_ms: Option<TimestampMs>,
    pub last_committed: Option<BatchWindow>,
    pub batches_committed: u64,
    pub records_delivered: u64,
    /// Records buffered for the open window
    pub buffered: usize,
    /// Committed batches still inside the remember duration
    pub retained: Vec<RetainedBatch>,
    pub last_report: Option<BatchReport>,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self {
            state: SchedulerState::Stopped,
            next_sequence: 1,
            window_start_ms: None,
            last_committed: None,
            batches_committed: 0,
            records_delivered: 0,
            buffered: 0,
            retained: Vec::new(),
            last_report: None,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub batches_committed: u64,
    pub records_delivered: u64,
    pub last_committed: Option<BatchWindow>,
    /// Records received but not committed when the run stopped
    pub records_abandoned: usize,
    pub metrics: MetricsSummary,
}

/// Micro-batch scheduler
///
/// Owns the checkpoint store; the checkpoint is mutated only here.
pub struct BatchScheduler<S> {
    config: SchedulerConfig,
    store: S,
    fingerprint: AdapterFingerprint,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    state: SchedulerState,
    resumed_from: Option<CheckpointRecord>,
    windows: Option<WindowClock>,
    last_committed: Option<BatchWindow>,
    replay_progress: ReplayProgress,
    buffer: BatchBuffer,
    retention: RetentionLedger,
    aggregator: BatchMetricsAggregator,
    status_tx: watch::Sender<SchedulerStatus>,
}

impl<S: CheckpointStore> BatchScheduler<S> {
    /// Load the checkpoint and choose between resume and fresh start
    ///
    /// # Errors
    /// - unreadable or corrupt checkpoint
    /// - checkpoint written by a different adapter configuration
    #[instrument(
        name = "scheduler_initialize",
        skip_all,
        fields(store = %store.location(), adapter_hash = %fingerprint.hash())
    )]
    pub async fn initialize(
        config: SchedulerConfig,
        store: S,
        fingerprint: AdapterFingerprint,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let (status_tx, _) = watch::channel(SchedulerStatus::default());
        let mut scheduler = Self {
            retry: RetryPolicy::new(config.max_sink_attempts, config.retry_backoff),
            retention: RetentionLedger::new(config.remember),
            config,
            store,
            fingerprint,
            clock,
            state: SchedulerState::Stopped,
            resumed_from: None,
            windows: None,
            last_committed: None,
            replay_progress: ReplayProgress::new(),
            buffer: BatchBuffer::new(),
            aggregator: BatchMetricsAggregator::new(),
            status_tx,
        };
        scheduler.transition(SchedulerState::Initializing);

        match scheduler.store.load().await? {
            Some(checkpoint) => {
                if let Err(e) = checkpoint.verify_adapter(&scheduler.fingerprint) {
                    error!(error = %e, "checkpoint does not match the configured source");
                    scheduler.transition(SchedulerState::Stopped);
                    return Err(e.into());
                }
                scheduler.warn_on_changed_settings(&checkpoint);
                info!(
                    seq = checkpoint.sequence_number,
                    last_batch_end_time = checkpoint.last_batch_end_time,
                    replay_files = checkpoint.replay_progress.len(),
                    "resuming from checkpoint"
                );
                scheduler.replay_progress = checkpoint.replay_progress.clone();
                scheduler.resumed_from = Some(checkpoint);
            }
            None => {
                info!("no checkpoint found; starting fresh");
            }
        }

        scheduler.publish(|_| {});
        Ok(scheduler)
    }

    fn warn_on_changed_settings(&self, checkpoint: &CheckpointRecord) {
        let Some(stored) = checkpoint.scheduler else {
            return;
        };
        let current = self.config.snapshot();
        if stored.batch_interval_ms != current.batch_interval_ms {
            warn!(
                stored_ms = stored.batch_interval_ms,
                current_ms = current.batch_interval_ms,
                "batch interval changed since the checkpoint was written"
            );
        }
    }

    /// What the checkpoint proves committed
    ///
    /// Sources use it to skip records that were already committed.
    pub fn resume_point(&self) -> ResumePoint {
        self.resumed_from
            .as_ref()
            .map(ResumePoint::from_checkpoint)
            .unwrap_or_default()
    }

    /// Checkpoint loaded at initialization
    pub fn resumed_from(&self) -> Option<&CheckpointRecord> {
        self.resumed_from.as_ref()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Status updates for monitoring
    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status_tx.subscribe()
    }

    /// Drive batches until the stream ends, `cancel` fires or `max_batches`
    /// is reached
    ///
    /// # Errors
    /// Sink exhaustion and checkpoint write failures are fatal; the window
    /// being delivered is not checkpointed and is re-delivered with the same
    /// sequence number after a restart.
    #[instrument(name = "scheduler_run", skip_all, fields(sink = %sink.name()))]
    pub async fn run<K>(
        &mut self,
        rx: Receiver<RawRecord>,
        normalizer: &dyn RecordNormalizer,
        sink: &mut K,
        cancel: CancellationToken,
    ) -> Result<RunSummary>
    where
        K: BatchSink,
    {
        if self.state != SchedulerState::Initializing {
            return Err(SchedulerError::InvalidState {
                expected: SchedulerState::Initializing,
                actual: self.state,
            });
        }

        let windows = match &self.resumed_from {
            Some(cp) => WindowClock::resume(cp.sequence_number, cp.last_batch_end_time),
            None => WindowClock::fresh(self.clock.now_ms()),
        };
        self.windows = Some(windows);
        self.transition(SchedulerState::Running);

        let period = self.config.batch_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = period.as_millis() as u64,
            next_seq = windows.next_sequence(),
            window_start_ms = windows.start_ms(),
            "scheduler running"
        );

        let mut stream_open = true;
        let mut committed_this_run: u64 = 0;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("stop requested; committing open window");
                    self.transition(SchedulerState::Stopping);
                    self.drain_ready(&rx);
                    let end = self.clock.now_ms();
                    if let Err(e) = self.commit_window(end, normalizer, sink).await {
                        break Err(e);
                    }
                    break Ok(StopReason::Cancelled);
                }

                _ = ticker.tick() => {
                    self.drain_ready(&rx);
                    let end = self.clock.now_ms();
                    if let Err(e) = self.commit_window(end, normalizer, sink).await {
                        break Err(e);
                    }
                    committed_this_run += 1;

                    if self.config.max_batches.is_some_and(|max| committed_this_run >= max) {
                        info!(committed_this_run, "batch limit reached");
                        break Ok(StopReason::MaxBatches);
                    }
                    if !stream_open && self.buffer.is_empty() {
                        info!("record stream ended; final window committed");
                        break Ok(StopReason::StreamEnded);
                    }
                }

                received = rx.recv(), if stream_open => match received {
                    Ok(record) => {
                        self.buffer.push(record);
                    }
                    Err(_) => {
                        info!("record stream closed; closing final window at next tick");
                        stream_open = false;
                    }
                },
            }
        };

        if let Err(e) = sink.flush().await {
            warn!(error = %e, "sink flush failed");
        }

        let abandoned = self.buffer.len() + rx.len();
        if abandoned > 0 {
            info!(abandoned, "records left uncommitted at stop");
        }

        match outcome {
            Ok(stop_reason) => {
                self.transition(SchedulerState::Stopped);
                let summary = self.summary(stop_reason, abandoned);
                info!(
                    stop_reason = ?stop_reason,
                    batches = summary.batches_committed,
                    records = summary.records_delivered,
                    "scheduler stopped"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "scheduler stopping on fatal error");
                self.transition(SchedulerState::Stopping);
                self.transition(SchedulerState::Stopped);
                Err(e)
            }
        }
    }

    /// Move records already waiting in the channel into the buffer
    fn drain_ready(&mut self, rx: &Receiver<RawRecord>) {
        while let Ok(record) = rx.try_recv() {
            self.buffer.push(record);
        }
        observability::record_queue_depth(rx.len());
    }

    /// Close the open window at `end`, deliver it and persist the checkpoint
    async fn commit_window<K>(
        &mut self,
        end: TimestampMs,
        normalizer: &dyn RecordNormalizer,
        sink: &mut K,
    ) -> Result<()>
    where
        K: BatchSink,
    {
        let Some(mut windows) = self.windows else {
            return Err(SchedulerError::InvalidState {
                expected: SchedulerState::Running,
                actual: self.state,
            });
        };

        let window = windows.close_at(end);
        let raw = self.buffer.take_before(window.end_ms);
        let contents = normalize_window(&raw, normalizer);
        let batch = MicroBatch::new(window, contents.records);

        let mut progress = self.replay_progress.clone();
        progress.advance(&raw, self.buffer.iter());

        let interval_ms = self.config.batch_interval.as_millis() as i64;
        let overrun_ms = (window.duration_ms() - interval_ms).max(0);
        if overrun_ms * 2 > interval_ms {
            info!(
                seq = window.sequence_number,
                window_ms = window.duration_ms(),
                interval_ms,
                "window longer than the batch interval"
            );
        }

        debug!(
            seq = window.sequence_number,
            start_ms = window.start_ms,
            end_ms = window.end_ms,
            records = batch.len(),
            malformed = contents.malformed,
            duplicates = contents.duplicates,
            carried_over = self.buffer.len(),
            "window closed"
        );

        let attempts = self.deliver(&batch, sink).await?;

        let record = CheckpointRecord::committed(
            &window,
            &self.fingerprint,
            self.config.snapshot(),
            self.clock.now_ms(),
        )
        .with_replay_progress(progress);
        if let Err(e) = self.store.save(&record).await {
            error!(
                seq = window.sequence_number,
                error = %e,
                "checkpoint write failed after sink ack"
            );
            return Err(e.into());
        }

        windows.advance(&window);
        self.windows = Some(windows);
        self.last_committed = Some(window);
        self.replay_progress = record.replay_progress;

        let now = self.clock.now_ms();
        let report = BatchReport {
            window,
            records: batch.len(),
            malformed_dropped: contents.malformed,
            duplicates_dropped: contents.duplicates,
            carried_over: self.buffer.len(),
            attempts,
            commit_latency_ms: window.age_ms(now),
            overrun_ms,
        };
        self.retention.record(window, batch.len(), now);
        self.aggregator.update(&report);
        observability::record_batch_metrics(&report);

        info!(
            seq = window.sequence_number,
            records = report.records,
            attempts,
            "batch committed"
        );
        self.publish(|status| status.last_report = Some(report));
        Ok(())
    }

    /// Hand `batch` to the sink, retrying with backoff
    ///
    /// Returns the number of attempts used.
    async fn deliver<K>(&self, batch: &MicroBatch, sink: &mut K) -> Result<u32>
    where
        K: BatchSink,
    {
        let seq = batch.sequence_number();
        let mut attempt = 1;

        loop {
            match sink.on_batch(batch).await {
                Ok(()) => return Ok(attempt),
                Err(e) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        seq,
                        attempt,
                        max_attempts = self.retry.max_attempts(),
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "sink rejected batch; retrying"
                    );
                    observability::record_sink_retry(attempt);
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(SchedulerError::SinkExhausted {
                        sink: sink.name().to_string(),
                        seq,
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "scheduler state change");
            self.state = next;
        }
        self.publish(|_| {});
    }

    fn publish(&self, update: impl FnOnce(&mut SchedulerStatus)) {
        let now = self.clock.now_ms();
        self.status_tx.send_modify(|status| {
            status.state = self.state;
            match (&self.windows, &self.resumed_from) {
                (Some(w), _) => {
                    status.next_sequence = w.next_sequence();
                    status.window_start_ms = Some(w.start_ms());
                }
                (None, Some(cp)) => {
                    status.next_sequence = cp.sequence_number + 1;
                    status.window_start_ms = Some(cp.last_batch_end_time);
                }
                (None, None) => {}
            }
            status.last_committed = self.last_committed;
            status.batches_committed = self.aggregator.total_batches;
            status.records_delivered = self.aggregator.total_records;
            status.buffered = self.buffer.len();
            status.retained = self.retention.snapshot(now);
            update(status);
        });
    }

    fn summary(&self, stop_reason: StopReason, records_abandoned: usize) -> RunSummary {
        let metrics = self.aggregator.summary();
        RunSummary {
            stop_reason,
            batches_committed: metrics.total_batches,
            records_delivered: metrics.total_records,
            last_committed: self.last_committed,
            records_abandoned,
            metrics,
        }
    }
}
