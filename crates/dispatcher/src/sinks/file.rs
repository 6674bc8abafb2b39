//! FileSink - writes each batch as a JSON Lines file plus a manifest entry

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use contracts::{BatchSink, ContractError, MicroBatch};
use serde::Serialize;
use tracing::{debug, error, instrument};

const MANIFEST_FILE: &str = "manifest.jsonl";
const BATCH_DIR: &str = "batches";

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { base_path }
    }
}

/// One manifest line per delivered batch
#[derive(Debug, Serialize)]
struct ManifestEntry<'a> {
    seq: u64,
    start_ms: i64,
    end_ms: i64,
    records: usize,
    file: &'a str,
    written_at: String,
}

/// Sink that writes batches to disk
///
/// Layout: `<base>/batches/<seq>.jsonl` (one record per line) and an
/// append-only `<base>/manifest.jsonl`. A re-delivered sequence number
/// replaces its batch file and appends a second manifest line.
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    manifest: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(config.base_path.join(BATCH_DIR))?;

        let manifest = OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.base_path.join(MANIFEST_FILE))?;

        Ok(Self {
            name: name.into(),
            config,
            manifest: Some(BufWriter::new(manifest)),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Path of the batch file for `seq`
    pub fn batch_path(&self, seq: u64) -> PathBuf {
        self.config
            .base_path
            .join(BATCH_DIR)
            .join(format!("{seq:010}.jsonl"))
    }

    fn write_batch_to_disk(&mut self, batch: &MicroBatch) -> std::io::Result<()> {
        let path = self.batch_path(batch.sequence_number());
        let temp_path = path.with_extension("jsonl.tmp");

        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            for record in &batch.records {
                serde_json::to_writer(&mut writer, record)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&temp_path, &path)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let entry = ManifestEntry {
            seq: batch.sequence_number(),
            start_ms: batch.window.start_ms,
            end_ms: batch.window.end_ms,
            records: batch.len(),
            file: file_name,
            written_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let manifest = self
            .manifest
            .as_mut()
            .ok_or_else(|| std::io::Error::other("sink closed"))?;
        serde_json::to_writer(&mut *manifest, &entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        manifest.write_all(b"\n")?;
        manifest.flush()?;

        Ok(())
    }

    fn persist_batch(&mut self, batch: &MicroBatch) -> Result<(), ContractError> {
        self.write_batch_to_disk(batch).map_err(|e| {
            error!(sink = %self.name, seq = batch.sequence_number(), error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }
}

impl BatchSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_on_batch",
        skip(self, batch),
        fields(sink = %self.name, seq = batch.sequence_number())
    )]
    async fn on_batch(&mut self, batch: &MicroBatch) -> Result<(), ContractError> {
        self.persist_batch(batch)?;
        debug!(records = batch.len(), "batch written");
        Ok(())
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(manifest) = self.manifest.as_mut() {
            manifest
                .flush()
                .and_then(|()| manifest.get_ref().sync_data())
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        self.manifest = None;
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use contracts::{BatchWindow, CanonicalRecord, SourceTag};
    use tempfile::tempdir;

    fn record(id: &str) -> CanonicalRecord {
        CanonicalRecord {
            id: id.to_string(),
            author: "alice".to_string(),
            text: format!("status {id}"),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            lang: Some("en".to_string()),
            hashtags: vec!["rust".to_string()],
            source: SourceTag::Replay,
            ingested_at_ms: 1_000,
        }
    }

    fn batch(seq: u64, ids: &[&str]) -> MicroBatch {
        MicroBatch::new(
            BatchWindow {
                sequence_number: seq,
                start_ms: 0,
                end_ms: 5_000,
            },
            ids.iter().map(|id| record(id)).collect(),
        )
    }

    #[tokio::test]
    async fn test_file_sink_writes_jsonl_and_manifest() {
        let dir = tempdir().unwrap();
        let config = FileSinkConfig {
            base_path: dir.path().to_path_buf(),
        };

        let mut sink = FileSink::new("test_file", config).unwrap();
        sink.on_batch(&batch(1, &["a", "b"])).await.unwrap();
        sink.on_batch(&batch(2, &[])).await.unwrap();
        sink.close().await.unwrap();

        let content = fs::read_to_string(dir.path().join("batches/0000000001.jsonl")).unwrap();
        let lines: Vec<CanonicalRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, vec![record("a"), record("b")]);

        let empty = fs::read_to_string(dir.path().join("batches/0000000002.jsonl")).unwrap();
        assert!(empty.is_empty());

        let manifest = fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        let entries: Vec<serde_json::Value> = manifest
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["seq"], 1);
        assert_eq!(entries[0]["records"], 2);
        assert_eq!(entries[1]["file"], "0000000002.jsonl");
    }

    #[tokio::test]
    async fn test_redelivery_replaces_batch_file() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::new(
            "test_file",
            FileSinkConfig {
                base_path: dir.path().to_path_buf(),
            },
        )
        .unwrap();

        sink.on_batch(&batch(1, &["a", "b"])).await.unwrap();
        sink.on_batch(&batch(1, &["a"])).await.unwrap();

        let content = fs::read_to_string(sink.batch_path(1)).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(!sink.batch_path(1).with_extension("jsonl.tmp").exists());
    }

    #[tokio::test]
    async fn test_closed_sink_rejects_batches() {
        let dir = tempdir().unwrap();
        let params = HashMap::from([(
            "base_path".to_string(),
            dir.path().display().to_string(),
        )]);
        let mut sink = FileSink::from_params("test_file", &params).unwrap();
        sink.close().await.unwrap();
        assert!(sink.on_batch(&batch(1, &["a"])).await.is_err());
    }
}
