//! CheckpointRecord - the only durable state of the ingestion core

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{AdapterFingerprint, BatchWindow, ContractError, RawRecord, TimestampMs};

/// Scheduler settings captured at checkpoint time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub batch_interval_ms: u64,
    pub remember_ms: u64,
    pub max_sink_attempts: u32,
}

/// Leading lines of one replay file that are inside committed batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProgress {
    /// Modification time of the file the lines were read from
    pub modified_ms: TimestampMs,

    /// Physical lines delivered, counted from the top
    pub lines: u64,
}

/// Replay progress keyed by file name
///
/// Files are matched by name and modification time. A file rewritten since
/// the checkpoint is replayed from the top again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplayProgress(BTreeMap<String, FileProgress>);

impl ReplayProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, file: &str) -> Option<&FileProgress> {
        self.0.get(file)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileProgress)> {
        self.0.iter()
    }

    /// Lines of `file` to skip when it is replayed again
    pub fn lines_done(&self, file: &str, modified_ms: TimestampMs) -> u64 {
        match self.0.get(file) {
            Some(p) if p.modified_ms == modified_ms => p.lines,
            _ => 0,
        }
    }

    /// Move past the replay records of a committed window
    ///
    /// `pending` are the records still buffered for later windows. A file
    /// never advances past one of them, so they are read again after a
    /// restart.
    pub fn advance<'a>(
        &mut self,
        committed: impl IntoIterator<Item = &'a RawRecord>,
        pending: impl IntoIterator<Item = &'a RawRecord>,
    ) {
        for pos in committed.into_iter().filter_map(RawRecord::position) {
            let entry = self.0.entry(pos.file.clone()).or_insert(FileProgress {
                modified_ms: pos.modified_ms,
                lines: 0,
            });
            if entry.modified_ms != pos.modified_ms {
                *entry = FileProgress {
                    modified_ms: pos.modified_ms,
                    lines: 0,
                };
            }
            entry.lines = entry.lines.max(pos.line);
        }

        for pos in pending.into_iter().filter_map(RawRecord::position) {
            if let Some(entry) = self.0.get_mut(&pos.file) {
                if entry.modified_ms == pos.modified_ms && pos.line <= entry.lines {
                    entry.lines = pos.line.saturating_sub(1);
                }
            }
        }
    }
}

/// Durable progress marker
///
/// Written only after the sink acknowledged the batch `sequence_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Last committed batch sequence number
    pub sequence_number: u64,

    /// End of the last committed window (epoch ms)
    pub last_batch_end_time: TimestampMs,

    /// Hash over the adapter identity fields
    pub adapter_config_hash: String,

    /// Adapter identity fields the hash was computed from
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub adapter_fields: BTreeMap<String, String>,

    /// Scheduler configuration at write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerSnapshot>,

    /// Replay lines inside committed batches; empty for the live feed
    #[serde(default, skip_serializing_if = "ReplayProgress::is_empty")]
    pub replay_progress: ReplayProgress,

    /// Wall time of the write (epoch ms)
    #[serde(default)]
    pub written_at_ms: TimestampMs,
}

impl CheckpointRecord {
    /// Build the checkpoint that commits `window`
    pub fn committed(
        window: &BatchWindow,
        fingerprint: &AdapterFingerprint,
        scheduler: SchedulerSnapshot,
        written_at_ms: TimestampMs,
    ) -> Self {
        Self {
            sequence_number: window.sequence_number,
            last_batch_end_time: window.end_ms,
            adapter_config_hash: fingerprint.hash().to_string(),
            adapter_fields: fingerprint.fields().clone(),
            scheduler: Some(scheduler),
            replay_progress: ReplayProgress::new(),
            written_at_ms,
        }
    }

    pub fn with_replay_progress(mut self, progress: ReplayProgress) -> Self {
        self.replay_progress = progress;
        self
    }

    /// Refuse to resume with an adapter that differs from the one that wrote the checkpoint
    ///
    /// The error names the first mismatched field when the checkpoint carries
    /// per-field values, otherwise it names the hash itself.
    pub fn verify_adapter(&self, current: &AdapterFingerprint) -> Result<(), ContractError> {
        if self.adapter_config_hash == current.hash() {
            return Ok(());
        }

        let (field, stored, current) = current
            .mismatched_field(&self.adapter_fields)
            .unwrap_or_else(|| {
                (
                    "adapter_config_hash".to_string(),
                    self.adapter_config_hash.clone(),
                    current.hash().to_string(),
                )
            });

        Err(ContractError::AdapterMismatch {
            field,
            stored,
            current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReplayPosition, SourceTag};

    fn fingerprint(track: &str) -> AdapterFingerprint {
        AdapterFingerprint::from_fields([
            ("source.kind", "live".to_string()),
            ("source.live.track", track.to_string()),
        ])
    }

    fn snapshot() -> SchedulerSnapshot {
        SchedulerSnapshot {
            batch_interval_ms: 5_000,
            remember_ms: 60_000,
            max_sink_attempts: 3,
        }
    }

    #[test]
    fn committed_copies_window_bounds() {
        let window = BatchWindow {
            sequence_number: 7,
            start_ms: 30_000,
            end_ms: 35_000,
        };
        let fp = fingerprint("spark");
        let record = CheckpointRecord::committed(&window, &fp, snapshot(), 36_000);
        assert_eq!(record.sequence_number, 7);
        assert_eq!(record.last_batch_end_time, 35_000);
        assert_eq!(record.adapter_config_hash, fp.hash());
        assert!(record.verify_adapter(&fp).is_ok());
    }

    #[test]
    fn mismatch_names_changed_field() {
        let window = BatchWindow {
            sequence_number: 1,
            start_ms: 0,
            end_ms: 5_000,
        };
        let record = CheckpointRecord::committed(&window, &fingerprint("spark"), snapshot(), 0);
        let err = record.verify_adapter(&fingerprint("flink")).unwrap_err();
        match err {
            ContractError::AdapterMismatch {
                field,
                stored,
                current,
            } => {
                assert_eq!(field, "source.live.track");
                assert_eq!(stored, "spark");
                assert_eq!(current, "flink");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn mismatch_without_fields_names_hash() {
        let record = CheckpointRecord {
            sequence_number: 3,
            last_batch_end_time: 15_000,
            adapter_config_hash: "abc".to_string(),
            adapter_fields: BTreeMap::new(),
            scheduler: None,
            replay_progress: ReplayProgress::new(),
            written_at_ms: 0,
        };
        let err = record.verify_adapter(&fingerprint("spark")).unwrap_err();
        assert!(err.to_string().contains("adapter_config_hash"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn deserializes_minimal_layout() {
        let json = r#"{"sequence_number":4,"last_batch_end_time":20000,"adapter_config_hash":"abc"}"#;
        let record: CheckpointRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.sequence_number, 4);
        assert!(record.adapter_fields.is_empty());
        assert!(record.scheduler.is_none());
        assert!(record.replay_progress.is_empty());
    }

    const NONE: &[RawRecord] = &[];

    fn line(file: &str, modified_ms: TimestampMs, line: u64) -> RawRecord {
        RawRecord::new("{}", 0, SourceTag::Replay).with_position(ReplayPosition {
            file: file.to_string(),
            modified_ms,
            line,
        })
    }

    #[test]
    fn progress_tracks_highest_committed_line_per_file() {
        let mut progress = ReplayProgress::new();
        let committed = [line("a.json", 10, 1), line("a.json", 10, 3), line("b.json", 20, 2)];
        progress.advance(&committed, NONE);

        assert_eq!(progress.lines_done("a.json", 10), 3);
        assert_eq!(progress.lines_done("b.json", 20), 2);
        assert_eq!(progress.lines_done("c.json", 30), 0);
        // rewritten file starts over
        assert_eq!(progress.lines_done("a.json", 11), 0);
    }

    #[test]
    fn progress_stops_before_pending_lines() {
        let mut progress = ReplayProgress::new();
        let committed = [line("a.json", 10, 4), line("a.json", 10, 6)];
        let pending = [line("a.json", 10, 5), line("b.json", 20, 1)];
        progress.advance(&committed, &pending);

        assert_eq!(progress.lines_done("a.json", 10), 4);
        assert!(progress.get("b.json").is_none());
    }

    #[test]
    fn progress_ignores_live_records() {
        let mut progress = ReplayProgress::new();
        progress.advance(&[RawRecord::new("{}", 0, SourceTag::Live)], NONE);
        assert!(progress.is_empty());
    }

    #[test]
    fn replay_progress_round_trips_through_checkpoint() {
        let window = BatchWindow {
            sequence_number: 2,
            start_ms: 0,
            end_ms: 5_000,
        };
        let mut progress = ReplayProgress::new();
        progress.advance(&[line("late.json", 200, 1)], NONE);
        let record = CheckpointRecord::committed(&window, &fingerprint("spark"), snapshot(), 0)
            .with_replay_progress(progress);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""replay_progress":{"late.json":{"modified_ms":200,"lines":1}}"#));
        let back: CheckpointRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.replay_progress.lines_done("late.json", 200), 1);
        assert!(back.verify_adapter(&fingerprint("spark")).is_ok());
    }
}
