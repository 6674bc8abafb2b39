//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置 → 调度参数的贯通
//! - replay 目录 → 调度器 → file sink 的端到端流程
//! - checkpoint 恢复与适配器不匹配场景

#[cfg(test)]
mod config_tests {
    use batch_engine::SchedulerConfig;
    use config_loader::{ConfigFormat, ConfigLoader};
    use std::time::Duration;

    const STREAM_TOML: &str = r#"
[streaming]
batch_interval_secs = 5
remember_secs = 60
max_sink_attempts = 4
retry_backoff_ms = 250

[checkpoint]
directory = "./checkpoint"

[source]
kind = "live"

[source.live]
endpoint = "127.0.0.1:7070"
track = ["Spark", "spark ", "flink"]

[[sinks]]
name = "log"
sink_type = "log"
"#;

    #[test]
    fn test_blueprint_drives_scheduler_settings() {
        let bp = ConfigLoader::load_from_str(STREAM_TOML, ConfigFormat::Toml).unwrap();
        let config = SchedulerConfig::from_streaming(&bp.streaming);

        assert_eq!(config.batch_interval, Duration::from_secs(5));
        assert_eq!(config.max_sink_attempts, 4);
        assert_eq!(config.retry_backoff, Duration::from_millis(250));
        assert_eq!(config.snapshot(), bp.streaming.snapshot());
    }

    #[test]
    fn test_fingerprint_ignores_track_order_and_case() {
        let bp = ConfigLoader::load_from_str(STREAM_TOML, ConfigFormat::Toml).unwrap();
        let reordered = STREAM_TOML.replace(r#"["Spark", "spark ", "flink"]"#, r#"["flink", "spark"]"#);
        let bp2 = ConfigLoader::load_from_str(&reordered, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.source.fingerprint().hash(), bp2.source.fingerprint().hash());

        let changed = STREAM_TOML.replace(r#"["Spark", "spark ", "flink"]"#, r#"["kafka"]"#);
        let bp3 = ConfigLoader::load_from_str(&changed, ConfigFormat::Toml).unwrap();
        assert_ne!(bp.source.fingerprint().hash(), bp3.source.fingerprint().hash());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    use batch_engine::{BatchScheduler, RunSummary, SchedulerConfig, SchedulerError, StopReason, TokioClock};
    use checkpoint::{CheckpointStore, FileCheckpointStore};
    use contracts::{
        BatchSink, CheckpointRecord, Clock, ContractError, RecordNormalizer, RecordSource,
        ReplayConfig, SinkConfig, SinkType, SourceConfig, SourceKind, TimestampMs,
    };
    use ingestion::{
        IngestionMetrics, IngestionPipeline, PumpExit, PumpSummary, SourceAdapter, StatusNormalizer,
    };
    use tokio_util::sync::CancellationToken;

    /// Stamps records as if they were pulled `by_ms` later
    #[derive(Debug)]
    struct LateClock {
        inner: Arc<dyn Clock>,
        by_ms: TimestampMs,
    }

    impl Clock for LateClock {
        fn now_ms(&self) -> TimestampMs {
            self.inner.now_ms() + self.by_ms
        }
    }

    struct Run {
        summary: RunSummary,
        dropped: u64,
        pump: PumpSummary,
    }

    fn status(id: u32, text: &str) -> String {
        format!(
            r##"{{"id_str":"{id}","text":"{text} #rust","user":{{"screen_name":"user{id}"}},"created_at":"Wed Oct 10 20:19:24 +0000 2018","lang":"en","entities":{{"hashtags":[{{"text":"rust"}}]}}}}"##
        )
    }

    /// Write a replay file and pin its mtime
    fn drop_file(dir: &Path, name: &str, lines: &[String], modified: SystemTime) {
        let path = dir.join(name);
        fs::write(&path, lines.join("\n") + "\n").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    fn replay_source(dir: &Path) -> SourceConfig {
        SourceConfig {
            kind: SourceKind::Replay,
            live: None,
            replay: Some(ReplayConfig {
                directory: dir.to_path_buf(),
                poll_interval_ms: 50,
                watch: false,
            }),
        }
    }

    fn watched_source(dir: &Path, poll_interval_ms: u64) -> SourceConfig {
        SourceConfig {
            kind: SourceKind::Replay,
            live: None,
            replay: Some(ReplayConfig {
                directory: dir.to_path_buf(),
                poll_interval_ms,
                watch: true,
            }),
        }
    }

    fn scheduler_config() -> SchedulerConfig {
        SchedulerConfig {
            batch_interval: Duration::from_secs(1),
            remember: Duration::from_secs(60),
            max_sink_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            max_batches: None,
        }
    }

    fn file_sink(out: &Path) -> Vec<SinkConfig> {
        vec![SinkConfig {
            name: "jsonl".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 4,
            params: HashMap::from([("base_path".to_string(), out.display().to_string())]),
        }]
    }

    /// One run wired the way the CLI wires it
    ///
    /// `source_lag_ms` shifts the source's stamps, so records can be made to
    /// land after the window that is open when they are pulled.
    async fn run_with(
        source_config: &SourceConfig,
        config: SchedulerConfig,
        source_lag_ms: TimestampMs,
        checkpoint_dir: &Path,
        out: &Path,
    ) -> Result<Run, SchedulerError> {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::system());
        let mut scheduler = BatchScheduler::initialize(
            config,
            FileCheckpointStore::new(checkpoint_dir),
            source_config.fingerprint(),
            Arc::clone(&clock),
        )
        .await?;

        let source_clock: Arc<dyn Clock> = Arc::new(LateClock {
            inner: Arc::clone(&clock),
            by_ms: source_lag_ms,
        });
        let metrics = Arc::new(IngestionMetrics::new());
        let mut source =
            SourceAdapter::from_config(source_config, source_clock, Arc::clone(&metrics))?;
        source.open(&scheduler.resume_point()).await?;

        let mut ingestion = IngestionPipeline::with_metrics(8, metrics);
        let rx = ingestion.take_receiver().unwrap();
        let pump_cancel = CancellationToken::new();
        let pump = ingestion.start(source, pump_cancel.clone());

        let mut sink = dispatcher::create_dispatcher(file_sink(out)).await.unwrap();
        let normalizer = StatusNormalizer::new();
        let summary = scheduler
            .run(rx, &normalizer, &mut sink, CancellationToken::new())
            .await;
        sink.close().await?;

        pump_cancel.cancel();
        let pump = pump.join().await.unwrap();
        summary.map(|summary| Run {
            summary,
            dropped: normalizer.dropped_count(),
            pump,
        })
    }

    async fn run_once(
        source_config: &SourceConfig,
        checkpoint_dir: &Path,
        out: &Path,
    ) -> Result<(RunSummary, u64), SchedulerError> {
        let run = run_with(source_config, scheduler_config(), 0, checkpoint_dir, out).await?;
        assert_eq!(run.pump.exit, PumpExit::Exhausted);
        Ok((run.summary, run.dropped))
    }

    fn manifest(out: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(out.join("manifest.jsonl"))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn delivered_ids(out: &Path) -> Vec<String> {
        let mut entries: Vec<_> = fs::read_dir(out.join("batches"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        entries
            .iter()
            .flat_map(|p| {
                fs::read_to_string(p)
                    .unwrap()
                    .lines()
                    .map(|l| {
                        let v: serde_json::Value = serde_json::from_str(l).unwrap();
                        v["id"].as_str().unwrap().to_string()
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// End-to-end: replay directory -> scheduler -> file sink -> checkpoint
    #[tokio::test]
    async fn test_e2e_replay_to_file_sink() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("incoming");
        let out = root.path().join("out");
        let cp_dir = root.path().join("cp");
        fs::create_dir_all(&input).unwrap();

        let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
        drop_file(
            &input,
            "a.json",
            &[status(1, "one"), "{not json".to_string(), status(2, "two")],
            an_hour_ago,
        );
        drop_file(
            &input,
            "b.json",
            &[status(3, "three"), r#"{"delete":{"status":{"id":9}}}"#.to_string()],
            an_hour_ago + Duration::from_secs(60),
        );
        fs::write(input.join(".hidden.json"), status(99, "ignored")).unwrap();

        let (summary, dropped) = run_once(&replay_source(&input), &cp_dir, &out).await.unwrap();

        assert_eq!(summary.stop_reason, StopReason::StreamEnded);
        assert_eq!(summary.records_delivered, 3);
        assert_eq!(dropped, 2);
        assert_eq!(delivered_ids(&out), ["1", "2", "3"]);

        let entries = manifest(&out);
        assert_eq!(entries.len() as u64, summary.batches_committed);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry["seq"], i as u64 + 1);
        }

        let cp = FileCheckpointStore::new(&cp_dir).load().await.unwrap().unwrap();
        assert_eq!(cp.sequence_number, summary.batches_committed);
        assert_eq!(Some(cp.last_batch_end_time), summary.last_committed.map(|w| w.end_ms));
        assert_eq!(cp.adapter_config_hash, replay_source(&input).fingerprint().hash());
    }

    /// Restart: sequence continues and committed lines are not replayed
    #[tokio::test]
    async fn test_restart_resumes_from_checkpoint() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("incoming");
        let out = root.path().join("out");
        let cp_dir = root.path().join("cp");
        fs::create_dir_all(&input).unwrap();
        let source = replay_source(&input);

        drop_file(
            &input,
            "first.json",
            &[status(1, "one"), status(2, "two")],
            SystemTime::now() - Duration::from_secs(3600),
        );
        let (first, _) = run_once(&source, &cp_dir, &out).await.unwrap();
        let cp = FileCheckpointStore::new(&cp_dir).load().await.unwrap().unwrap();
        assert_eq!(cp.sequence_number, first.batches_committed);

        // Moved in with an mtime older than everything already committed
        drop_file(
            &input,
            "second.json",
            &[status(3, "three")],
            SystemTime::now() - Duration::from_secs(7200),
        );
        let (second, _) = run_once(&source, &cp_dir, &out).await.unwrap();

        assert_eq!(second.records_delivered, 1);
        assert_eq!(delivered_ids(&out), ["1", "2", "3"]);

        let entries = manifest(&out);
        let resumed = &entries[first.batches_committed as usize];
        assert_eq!(resumed["seq"], cp.sequence_number + 1);
        assert_eq!(resumed["start_ms"], cp.last_batch_end_time);

        let seqs: Vec<u64> = entries.iter().map(|e| e["seq"].as_u64().unwrap()).collect();
        let expected: Vec<u64> = (1..=first.batches_committed + second.batches_committed).collect();
        assert_eq!(seqs, expected);
    }

    /// A file that lands while the first window is open, in a run stopped by
    /// the batch limit before the directory is scanned again, is delivered
    /// after the restart
    #[tokio::test]
    async fn test_restart_delivers_file_from_uncommitted_window() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("incoming");
        let out = root.path().join("out");
        let cp_dir = root.path().join("cp");
        fs::create_dir_all(&input).unwrap();
        let source = watched_source(&input, 1_500);

        let writer = {
            let input = input.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                drop_file(&input, "late.json", &[status(42, "late")], SystemTime::now());
            })
        };
        let first = run_with(
            &source,
            scheduler_config().with_max_batches(Some(1)),
            0,
            &cp_dir,
            &out,
        )
        .await
        .unwrap();
        writer.await.unwrap();

        assert_eq!(first.summary.stop_reason, StopReason::MaxBatches);
        assert_eq!(first.summary.records_delivered, 0);
        let cp = FileCheckpointStore::new(&cp_dir).load().await.unwrap().unwrap();
        assert!(cp.last_batch_end_time > 0);
        assert!(cp.replay_progress.get("late.json").is_none());

        let second = run_with(
            &source,
            scheduler_config().with_max_batches(Some(2)),
            0,
            &cp_dir,
            &out,
        )
        .await
        .unwrap();

        assert_eq!(second.summary.records_delivered, 1);
        assert_eq!(delivered_ids(&out), ["42"]);
        let cp = FileCheckpointStore::new(&cp_dir).load().await.unwrap().unwrap();
        assert_eq!(cp.sequence_number, 3);
        assert_eq!(cp.replay_progress.get("late.json").map(|p| p.lines), Some(1));
    }

    /// Records pulled but not committed when the batch limit stops a run are
    /// read again by the next run; nothing is lost or delivered twice
    #[tokio::test]
    async fn test_max_batches_then_restart_delivers_every_line() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("incoming");
        let out = root.path().join("out");
        let cp_dir = root.path().join("cp");
        fs::create_dir_all(&input).unwrap();
        let source = replay_source(&input);

        let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
        let a: Vec<String> = (1..=12).map(|i| status(i, "a")).collect();
        let b: Vec<String> = (13..=20).map(|i| status(i, "b")).collect();
        drop_file(&input, "a.json", &a, an_hour_ago);
        drop_file(&input, "b.json", &b, an_hour_ago + Duration::from_secs(1));

        // Every record is stamped past the first window, so none is committed
        let first = run_with(
            &source,
            scheduler_config().with_max_batches(Some(1)),
            10_000,
            &cp_dir,
            &out,
        )
        .await
        .unwrap();
        assert_eq!(first.summary.stop_reason, StopReason::MaxBatches);
        assert_eq!(first.summary.records_delivered, 0);
        assert!(first.summary.records_abandoned > 0);
        assert!(first.pump.forwarded > 0);
        let cp = FileCheckpointStore::new(&cp_dir).load().await.unwrap().unwrap();
        assert_eq!(cp.sequence_number, 1);
        assert!(cp.replay_progress.is_empty());

        let (second, _) = run_once(&source, &cp_dir, &out).await.unwrap();
        assert_eq!(second.stop_reason, StopReason::StreamEnded);
        assert_eq!(second.records_delivered, 20);

        let expected: Vec<String> = (1..=20).map(|i| i.to_string()).collect();
        assert_eq!(delivered_ids(&out), expected);

        let cp = FileCheckpointStore::new(&cp_dir).load().await.unwrap().unwrap();
        assert_eq!(cp.replay_progress.get("a.json").map(|p| p.lines), Some(12));
        assert_eq!(cp.replay_progress.get("b.json").map(|p| p.lines), Some(8));

        // A third run finds nothing new
        let (third, _) = run_once(&source, &cp_dir, &out).await.unwrap();
        assert_eq!(third.records_delivered, 0);
        assert_eq!(delivered_ids(&out), expected);
    }

    /// A checkpoint written for another directory refuses to resume
    #[tokio::test]
    async fn test_adapter_mismatch_fails_before_pull() {
        let root = tempfile::tempdir().unwrap();
        let cp_dir = root.path().join("cp");
        let old_dir = root.path().join("old");
        let new_dir = root.path().join("new");
        fs::create_dir_all(&new_dir).unwrap();
        drop_file(&new_dir, "a.json", &[status(1, "one")], SystemTime::now());

        let old = replay_source(&old_dir);
        let mut store = FileCheckpointStore::new(&cp_dir);
        store
            .save(&CheckpointRecord::committed(
                &contracts::BatchWindow {
                    sequence_number: 12,
                    start_ms: 0,
                    end_ms: 60_000,
                },
                &old.fingerprint(),
                scheduler_config().snapshot(),
                60_000,
            ))
            .await
            .unwrap();

        let out = root.path().join("out");
        let err = match run_once(&replay_source(&new_dir), &cp_dir, &out).await {
            Ok(_) => panic!("mismatched checkpoint accepted"),
            Err(e) => e,
        };
        match err {
            SchedulerError::Contract(ContractError::AdapterMismatch { field, .. }) => {
                assert_eq!(field, "source.replay.directory");
            }
            other => panic!("unexpected error: {other}"),
        }

        // Nothing was delivered and the checkpoint is untouched
        assert!(!out.exists());
        let cp = store.load().await.unwrap().unwrap();
        assert_eq!(cp.sequence_number, 12);
    }
}
