//! Live feed source
//!
//! Wire protocol (newline-delimited JSON over TCP):
//!
//! 1. client connects and sends one subscribe line
//!    `{"track": [...], "credentials": {...}}`
//! 2. server streams one status object per line; empty lines are keep-alives
//!
//! Lost or silent connections are re-established with exponential backoff;
//! the scheduler never sees those failures.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    Clock, ContractError, LiveFeedConfig, RawRecord, RecordSource, ResumePoint, SourceTag,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, trace, warn};

use crate::backoff::Backoff;
use crate::config::IngestionMetrics;
use crate::error::IngestionError;

type FeedLines = Lines<BufReader<TcpStream>>;

/// Persistent connection to a keyword-filtered live feed
pub struct LiveFeedSource {
    name: String,
    config: LiveFeedConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<IngestionMetrics>,
    backoff: Backoff,
    lines: Option<FeedLines>,
    opened: bool,
}

impl LiveFeedSource {
    pub fn new(
        config: LiveFeedConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<IngestionMetrics>,
    ) -> Self {
        let backoff = Backoff::new(
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        );
        Self {
            name: format!("live:{}", config.endpoint),
            config,
            clock,
            metrics,
            backoff,
            lines: None,
            opened: false,
        }
    }

    fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.config.stall_timeout_secs)
    }

    /// Subscribe line sent right after connecting
    fn subscribe_line(&self) -> String {
        let creds = &self.config.credentials;
        let line = serde_json::json!({
            "track": self.config.normalized_track(),
            "credentials": {
                "consumer_key": creds.consumer_key,
                "consumer_secret": creds.consumer_secret,
                "access_token": creds.access_token,
                "access_token_secret": creds.access_token_secret,
            },
        });
        format!("{line}\n")
    }

    /// One connect + subscribe attempt
    async fn connect(&self) -> Result<FeedLines, IngestionError> {
        let endpoint = self.config.endpoint.as_str();

        let mut stream = timeout(self.stall_timeout(), TcpStream::connect(endpoint))
            .await
            .map_err(|_| IngestionError::connect(endpoint, "connect timed out"))?
            .map_err(|e| IngestionError::connect(endpoint, e.to_string()))?;
        stream.set_nodelay(true)?;

        stream
            .write_all(self.subscribe_line().as_bytes())
            .await
            .map_err(|e| IngestionError::connect(endpoint, format!("subscribe failed: {e}")))?;
        stream.flush().await?;

        Ok(BufReader::new(stream).lines())
    }

    /// Reconnect until it works; only cancellation of the caller ends this
    async fn reconnect(&mut self) {
        loop {
            match self.connect().await {
                Ok(lines) => {
                    self.backoff.reset();
                    self.metrics.record_reconnect();
                    metrics::counter!("firehose_source_reconnects_total", "source" => "live")
                        .increment(1);
                    info!(source = %self.name, "live feed reconnected");
                    self.lines = Some(lines);
                    return;
                }
                Err(e) => {
                    self.metrics.record_connect_failure();
                    let delay = self.backoff.next_delay();
                    warn!(
                        source = %self.name,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "live feed reconnect failed"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    fn drop_connection(&mut self, reason: &str) {
        if self.lines.take().is_some() {
            warn!(source = %self.name, reason, "live feed connection lost");
        }
    }
}

impl RecordSource for LiveFeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> SourceTag {
        SourceTag::Live
    }

    #[instrument(name = "live_open", skip(self), fields(source = %self.name))]
    async fn open(&mut self, resume: &ResumePoint) -> Result<(), ContractError> {
        if let Some(since) = resume.since {
            info!(since, "live feed cannot replay history; resume point ignored");
        }
        if !self.config.credentials.is_complete() {
            warn!("live feed credentials are incomplete");
        }

        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.connect().await {
                Ok(lines) => {
                    self.lines = Some(lines);
                    self.opened = true;
                    self.backoff.reset();
                    info!(
                        attempt,
                        track = ?self.config.normalized_track(),
                        "live feed connected"
                    );
                    return Ok(());
                }
                Err(e) => {
                    self.metrics.record_connect_failure();
                    warn!(attempt, attempts, error = %e, "live feed connect failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        sleep(self.backoff.next_delay()).await;
                    }
                }
            }
        }

        Err(ContractError::source_unavailable(
            &self.name,
            format!(
                "unreachable after {attempts} attempts: {}",
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
        ))
    }

    async fn next_record(&mut self) -> Result<Option<RawRecord>, ContractError> {
        if !self.opened {
            return Err(ContractError::source_read(&self.name, "source not opened"));
        }

        loop {
            let stall = self.stall_timeout();
            let Some(lines) = self.lines.as_mut() else {
                self.reconnect().await;
                continue;
            };

            match timeout(stall, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    if line.trim().is_empty() {
                        self.metrics.record_keepalive();
                        trace!(source = %self.name, "keep-alive");
                        continue;
                    }
                    self.metrics.record_pulled();
                    return Ok(Some(RawRecord::new(
                        Bytes::from(line),
                        self.clock.now_ms(),
                        SourceTag::Live,
                    )));
                }
                Ok(Ok(None)) => self.drop_connection("closed by peer"),
                Ok(Err(e)) => {
                    self.metrics.record_read_error();
                    self.drop_connection(&e.to_string());
                }
                Err(_) => {
                    let err = IngestionError::Stalled {
                        name: self.name.clone(),
                        secs: stall.as_secs(),
                    };
                    self.drop_connection(&err.to_string());
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        if self.lines.take().is_some() {
            debug!(source = %self.name, "live feed closed");
        }
        self.opened = false;
        Ok(())
    }
}
