//! # Observability
//!
//! 日志与指标的统一入口。
//!
//! - `tracing-subscriber`：`RUST_LOG` 优先，否则使用配置中的默认级别
//! - Prometheus exporter：可选，仅在给出端口时安装
//! - `metrics` 模块：batch / sink / source 维度的计数器与运行摘要
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig {
//!     log_format: LogFormat::Pretty,
//!     ..Default::default()
//! })?;
//! observability::record_batch_metrics(&report);
//! ```

pub mod metrics;

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_batch_metrics, record_queue_depth, record_retention, record_sink_delivery,
    record_sink_retry, record_source_records, BatchMetricsAggregator, MetricsSummary,
    RunningStats, StatsSummary,
};

/// Subscriber and exporter settings
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus listener port, `None` leaves the exporter off
    pub metrics_port: Option<u16>,
    /// Used when `RUST_LOG` is unset or unparsable
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// 一行一个 JSON 对象，带线程与源码位置
    Json,
    Pretty,
    #[default]
    Compact,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        }
    }

    fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        match self {
            Self::Json => tfmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            Self::Pretty => tfmt::layer().pretty().boxed(),
            Self::Compact => tfmt::layer().compact().with_target(false).boxed(),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [Self::Json, Self::Pretty, Self::Compact]
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown log format '{s}'"))
    }
}

/// Install the global subscriber and, if configured, the Prometheus exporter
///
/// Fails when a global subscriber is already installed.
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_log_level))
        .with_context(|| format!("invalid log level '{}'", config.default_log_level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(config.log_format.layer())
        .try_init()
        .context("tracing subscriber already installed")?;

    if let Some(port) = config.metrics_port {
        install_prometheus(port)?;
    }

    tracing::debug!(log_format = %config.log_format, metrics_port = ?config.metrics_port, "observability ready");
    Ok(())
}

/// Serve `/metrics` on `0.0.0.0:<port>`
///
/// The recorder is process-global; a second call fails.
pub fn install_prometheus(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("cannot start Prometheus exporter on port {port}"))?;

    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}
