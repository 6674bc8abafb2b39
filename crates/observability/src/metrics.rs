//! Batch 指标收集模块
//!
//! 基于 BatchReport 收集和统计调度器的运行指标。

use contracts::{BatchReport, SourceTag};
use metrics::{counter, gauge, histogram};

/// 从 BatchReport 记录指标
///
/// 每次 batch 提交 (sink ack + checkpoint 落盘) 后调用。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_batch_metrics;
///
/// let report = scheduler.commit(...).await?;
/// record_batch_metrics(&report);
/// ```
pub fn record_batch_metrics(report: &BatchReport) {
    // batch 计数器
    counter!("firehose_batches_total").increment(1);
    if report.records == 0 {
        counter!("firehose_empty_batches_total").increment(1);
    }

    // 最后提交的序号
    gauge!("firehose_last_committed_seq").set(report.window.sequence_number as f64);

    // batch 大小
    histogram!("firehose_batch_records").record(report.records as f64);
    counter!("firehose_records_delivered_total").increment(report.records as u64);

    // 窗口 (毫秒)
    histogram!("firehose_window_duration_ms").record(report.window.duration_ms() as f64);

    // 批内重复
    if report.duplicates_dropped > 0 {
        counter!("firehose_duplicates_dropped_total").increment(report.duplicates_dropped);
    }

    // 跨窗口延续的记录
    gauge!("firehose_carried_over_records").set(report.carried_over as f64);

    // 提交延迟
    histogram!("firehose_commit_latency_ms").record(report.commit_latency_ms as f64);

    // 超出 batch interval 的部分（恢复后的首个窗口）
    if report.overrun_ms > 0 {
        gauge!("firehose_window_overrun_ms").set(report.overrun_ms as f64);
    }
}

/// 记录 remember 时长内仍保留的 batch
pub fn record_retention(retained: usize, oldest_age_ms: Option<i64>) {
    gauge!("firehose_retained_batches").set(retained as f64);
    gauge!("firehose_oldest_retained_age_ms").set(oldest_age_ms.unwrap_or_default() as f64);
}

/// 记录 sink 重试
pub fn record_sink_retry(attempt: u32) {
    counter!("firehose_sink_retries_total").increment(1);
    gauge!("firehose_sink_last_retry_attempt").set(attempt as f64);
}

/// 记录单个 sink 的投递结果
pub fn record_sink_delivery(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "firehose_sink_deliveries_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录从数据源拉取的记录数
pub fn record_source_records(source: SourceTag, count: u64) {
    counter!("firehose_source_records_total", "source" => source.as_str()).increment(count);
}

/// 记录 source → scheduler 通道深度
pub fn record_queue_depth(depth: usize) {
    gauge!("firehose_ingest_queue_depth").set(depth as f64);
}

/// Batch 指标聚合器
///
/// 在内存中聚合指标，便于运行结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct BatchMetricsAggregator {
    /// 已提交 batch 数
    pub total_batches: u64,

    /// 空 batch 数
    pub empty_batches: u64,

    /// 投递记录总数
    pub total_records: u64,

    /// 被 normalizer 丢弃的记录
    pub total_malformed: u64,

    /// 批内重复丢弃数
    pub total_duplicates: u64,

    /// sink 重试总数
    pub total_retries: u64,

    /// 首个提交的序号
    pub first_seq: Option<u64>,

    /// 最后提交的序号
    pub last_seq: Option<u64>,

    /// batch 大小统计
    pub batch_size_stats: RunningStats,

    /// 提交延迟统计 (毫秒)
    pub commit_latency_stats: RunningStats,
}

impl BatchMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, report: &BatchReport) {
        let seq = report.window.sequence_number;
        self.total_batches += 1;
        if report.records == 0 {
            self.empty_batches += 1;
        }
        self.total_records += report.records as u64;
        self.total_malformed += report.malformed_dropped;
        self.total_duplicates += report.duplicates_dropped;
        self.total_retries += u64::from(report.attempts.saturating_sub(1));
        self.first_seq.get_or_insert(seq);
        self.last_seq = Some(seq);

        self.batch_size_stats.push(report.records as f64);
        self.commit_latency_stats
            .push(report.commit_latency_ms as f64);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_batches: self.total_batches,
            empty_batches: self.empty_batches,
            total_records: self.total_records,
            total_malformed: self.total_malformed,
            total_duplicates: self.total_duplicates,
            total_retries: self.total_retries,
            seq_range: self.first_seq.zip(self.last_seq),
            batch_size: StatsSummary::from(&self.batch_size_stats),
            commit_latency_ms: StatsSummary::from(&self.commit_latency_stats),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_batches: u64,
    pub empty_batches: u64,
    pub total_records: u64,
    pub total_malformed: u64,
    pub total_duplicates: u64,
    pub total_retries: u64,
    pub seq_range: Option<(u64, u64)>,
    pub batch_size: StatsSummary,
    pub commit_latency_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Batch Metrics Summary ===")?;
        writeln!(
            f,
            "Committed batches: {} ({} empty)",
            self.total_batches, self.empty_batches
        )?;
        if let Some((first, last)) = self.seq_range {
            writeln!(f, "Sequence range: {}..={}", first, last)?;
        }
        writeln!(f, "Records delivered: {}", self.total_records)?;
        writeln!(f, "Malformed records dropped: {}", self.total_malformed)?;
        writeln!(f, "Duplicates dropped: {}", self.total_duplicates)?;
        writeln!(f, "Sink retries: {}", self.total_retries)?;
        writeln!(f, "Batch size: {}", self.batch_size)?;
        writeln!(f, "Commit latency (ms): {}", self.commit_latency_ms)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::BatchWindow;

    fn report(seq: u64, records: usize, attempts: u32) -> BatchReport {
        BatchReport {
            window: BatchWindow {
                sequence_number: seq,
                start_ms: (seq as i64 - 1) * 5_000,
                end_ms: seq as i64 * 5_000,
            },
            records,
            malformed_dropped: 1,
            duplicates_dropped: 2,
            carried_over: 0,
            attempts,
            commit_latency_ms: 12,
            overrun_ms: 0,
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = BatchMetricsAggregator::new();
        aggregator.update(&report(4, 10, 1));
        aggregator.update(&report(5, 0, 3));

        assert_eq!(aggregator.total_batches, 2);
        assert_eq!(aggregator.empty_batches, 1);
        assert_eq!(aggregator.total_records, 10);
        assert_eq!(aggregator.total_malformed, 2);
        assert_eq!(aggregator.total_duplicates, 4);
        assert_eq!(aggregator.total_retries, 2);
        assert_eq!(aggregator.summary().seq_range, Some((4, 5)));
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = BatchMetricsAggregator::new();
        aggregator.update(&report(1, 3, 1));

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Committed batches: 1 (0 empty)"));
        assert!(output.contains("Sequence range: 1..=1"));
        assert!(output.contains("Records delivered: 3"));
    }

    #[test]
    fn test_record_helpers_without_recorder() {
        // 未安装 recorder 时调用应为 no-op
        record_batch_metrics(&report(1, 3, 2));
        record_sink_retry(2);
        record_sink_delivery("log", true);
        record_source_records(SourceTag::Live, 3);
        record_queue_depth(7);
    }
}
