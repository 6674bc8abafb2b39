//! Replay directory source
//!
//! Each file dropped into the watched directory is one group of records, one
//! per non-empty line. Files are consumed oldest-first by modification time
//! (ties broken by name), independent of directory listing order.
//!
//! Every record carries its file, the file's modification time and its line
//! number. On resume the checkpointed per-file progress decides what to skip:
//! committed lines are passed over, everything else is read again.

use std::collections::{HashSet, VecDeque};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use bytes::Bytes;
use contracts::{
    Clock, ContractError, RawRecord, RecordSource, ReplayConfig, ReplayPosition, ReplayProgress,
    ResumePoint, SourceTag, TimestampMs,
};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::config::IngestionMetrics;

/// Suffixes of files still being written by an uploader
const IN_PROGRESS_SUFFIXES: &[&str] = &[".tmp", "._COPYING_"];

/// A file found by a directory scan
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ReplayFile {
    modified_ms: TimestampMs,
    name: String,
    path: PathBuf,
}

struct OpenFile {
    name: String,
    modified_ms: TimestampMs,
    lines: Lines<BufReader<File>>,
    /// Physical lines read so far
    line: u64,
    /// Leading lines already committed before the restart
    skip: u64,
}

/// File-based backup feed
pub struct ReplayFileSource {
    name: String,
    config: ReplayConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<IngestionMetrics>,
    progress: ReplayProgress,
    seen: HashSet<PathBuf>,
    pending: VecDeque<ReplayFile>,
    current: Option<OpenFile>,
    opened: bool,
}

impl ReplayFileSource {
    pub fn new(
        config: ReplayConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<IngestionMetrics>,
    ) -> Self {
        Self {
            name: format!("replay:{}", config.directory.display()),
            config,
            clock,
            metrics,
            progress: ReplayProgress::new(),
            seen: HashSet::new(),
            pending: VecDeque::new(),
            current: None,
            opened: false,
        }
    }

    /// Files queued but not yet opened
    pub fn pending_files(&self) -> usize {
        self.pending.len()
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    /// List new, complete files in the watched directory and queue them in
    /// modification-time order
    async fn scan(&mut self) -> std::io::Result<usize> {
        let mut found = Vec::new();
        let mut entries = fs::read_dir(&self.config.directory).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if self.seen.contains(&path) || !is_candidate(&path) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    // 文件可能在扫描期间被移走
                    debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };

            let modified_ms = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as TimestampMs)
                .unwrap_or_default();

            self.seen.insert(path.clone());
            found.push(ReplayFile {
                modified_ms,
                name: file_name(&path),
                path,
            });
        }

        found.sort();
        let count = found.len();
        if count > 0 {
            debug!(source = %self.name, files = count, "queued replay files");
        }
        self.pending.extend(found);
        Ok(count)
    }

    async fn open_next(&mut self) -> bool {
        while let Some(file) = self.pending.pop_front() {
            match File::open(&file.path).await {
                Ok(handle) => {
                    let skip = self.progress.lines_done(&file.name, file.modified_ms);
                    debug!(
                        file = %file.name,
                        modified_ms = file.modified_ms,
                        committed_lines = skip,
                        "replaying file"
                    );
                    self.current = Some(OpenFile {
                        name: file.name,
                        modified_ms: file.modified_ms,
                        lines: BufReader::new(handle).lines(),
                        line: 0,
                        skip,
                    });
                    return true;
                }
                Err(e) => {
                    self.metrics.record_read_error();
                    warn!(file = %file.name, error = %e, "failed to open replay file");
                }
            }
        }
        false
    }
}

impl RecordSource for ReplayFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tag(&self) -> SourceTag {
        SourceTag::Replay
    }

    #[instrument(name = "replay_open", skip(self, resume), fields(source = %self.name))]
    async fn open(&mut self, resume: &ResumePoint) -> Result<(), ContractError> {
        let dir = &self.config.directory;
        let metadata = fs::metadata(dir).await.map_err(|e| {
            ContractError::source_unavailable(&self.name, format!("{}: {e}", dir.display()))
        })?;
        if !metadata.is_dir() {
            return Err(ContractError::source_unavailable(
                &self.name,
                format!("{} is not a directory", dir.display()),
            ));
        }

        self.progress = resume.replay.clone();
        self.opened = true;

        let queued = self
            .scan()
            .await
            .map_err(|e| ContractError::source_unavailable(&self.name, e.to_string()))?;

        info!(
            since = ?resume.since,
            files_with_progress = self.progress.len(),
            queued,
            watch = self.config.watch,
            "replay source opened"
        );
        Ok(())
    }

    async fn next_record(&mut self) -> Result<Option<RawRecord>, ContractError> {
        if !self.opened {
            return Err(ContractError::source_read(&self.name, "source not opened"));
        }

        loop {
            if let Some(current) = self.current.as_mut() {
                match current.lines.next_line().await {
                    Ok(Some(line)) => {
                        current.line += 1;
                        if current.line <= current.skip {
                            self.metrics.record_lines_skipped(1);
                            continue;
                        }
                        if line.trim().is_empty() {
                            continue;
                        }
                        self.metrics.record_pulled();
                        let position = ReplayPosition {
                            file: current.name.clone(),
                            modified_ms: current.modified_ms,
                            line: current.line,
                        };
                        let record =
                            RawRecord::new(Bytes::from(line), self.clock.now_ms(), SourceTag::Replay)
                                .with_position(position);
                        return Ok(Some(record));
                    }
                    Ok(None) => {
                        self.metrics.record_file_completed();
                        debug!(file = %current.name, "replay file done");
                        self.current = None;
                    }
                    Err(e) => {
                        self.metrics.record_read_error();
                        warn!(file = %current.name, error = %e, "replay file read failed; skipping rest");
                        self.current = None;
                    }
                }
                continue;
            }

            if self.open_next().await {
                continue;
            }

            if !self.config.watch {
                return Ok(None);
            }

            sleep(self.poll_interval()).await;
            if let Err(e) = self.scan().await {
                self.metrics.record_read_error();
                warn!(source = %self.name, error = %e, "replay directory scan failed");
            }
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.current = None;
        self.pending.clear();
        self.opened = false;
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(OsStr::to_str)
        .unwrap_or_default()
        .to_string()
}

/// Hidden and in-progress files are never replayed
fn is_candidate(path: &Path) -> bool {
    let name = file_name(path);
    !name.is_empty()
        && !name.starts_with('.')
        && !IN_PROGRESS_SUFFIXES.iter().any(|s| name.ends_with(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SystemClock;
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, content: &str, modified_secs: u64) {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(modified_secs))
            .unwrap();
    }

    fn source(dir: &Path, watch: bool) -> (ReplayFileSource, Arc<IngestionMetrics>) {
        let metrics = Arc::new(IngestionMetrics::new());
        let config = ReplayConfig {
            directory: dir.to_path_buf(),
            poll_interval_ms: 20,
            watch,
        };
        (
            ReplayFileSource::new(config, Arc::new(SystemClock), metrics.clone()),
            metrics,
        )
    }

    async fn drain(source: &mut ReplayFileSource) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(record) = source.next_record().await.unwrap() {
            out.push(String::from_utf8(record.payload().to_vec()).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_files_replayed_by_modification_time() {
        let dir = tempdir().unwrap();
        // Names sort opposite to modification time
        write_file(dir.path(), "a.json", "t3-1\nt3-2\n", 3_000);
        write_file(dir.path(), "b.json", "t1-1\n", 1_000);
        write_file(dir.path(), "c.json", "t2-1\n\n", 2_000);

        let (mut source, metrics) = source(dir.path(), false);
        source.open(&ResumePoint::fresh()).await.unwrap();

        assert_eq!(drain(&mut source).await, vec!["t1-1", "t2-1", "t3-1", "t3-2"]);
        assert_eq!(metrics.snapshot().files_completed, 3);
        assert_eq!(metrics.snapshot().records_pulled, 4);
    }

    #[tokio::test]
    async fn test_equal_mtime_ordered_by_name() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "b.json", "second\n", 1_000);
        write_file(dir.path(), "a.json", "first\n", 1_000);

        let (mut source, _) = source(dir.path(), false);
        source.open(&ResumePoint::fresh()).await.unwrap();
        assert_eq!(drain(&mut source).await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_records_carry_origin_and_tag() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "batch-1.json", "{}\n", 1_000);

        let (mut source, _) = source(dir.path(), false);
        source.open(&ResumePoint::fresh()).await.unwrap();
        let record = source.next_record().await.unwrap().unwrap();
        assert_eq!(record.origin(), Some("batch-1.json"));
        assert_eq!(record.source(), SourceTag::Replay);
    }

    #[tokio::test]
    async fn test_hidden_and_in_progress_files_ignored() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), ".hidden", "no\n", 1_000);
        write_file(dir.path(), "upload.json.tmp", "no\n", 1_000);
        write_file(dir.path(), "upload.json._COPYING_", "no\n", 1_000);
        write_file(dir.path(), "done.json", "yes\n", 1_000);

        let (mut source, _) = source(dir.path(), false);
        source.open(&ResumePoint::fresh()).await.unwrap();
        assert_eq!(drain(&mut source).await, vec!["yes"]);
    }

    fn resume_after(committed: &[(&str, TimestampMs, u64)]) -> ResumePoint {
        let records: Vec<_> = committed
            .iter()
            .map(|(file, modified_ms, line)| {
                RawRecord::new("{}", 0, SourceTag::Replay).with_position(ReplayPosition {
                    file: file.to_string(),
                    modified_ms: *modified_ms,
                    line: *line,
                })
            })
            .collect();
        let mut replay = ReplayProgress::new();
        replay.advance(&records, &[] as &[RawRecord]);
        ResumePoint {
            since: Some(i64::MAX),
            replay,
        }
    }

    #[tokio::test]
    async fn test_resume_skips_committed_lines_only() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "old.json", "o1\no2\n\no3\n", 1_000);
        write_file(dir.path(), "mid.json", "m1\nm2\n", 2_000);
        write_file(dir.path(), "new.json", "n1\n", 3_000);

        // `since` lies after every modification time; progress alone decides
        let resume = resume_after(&[("old.json", 1_000_000, 4), ("mid.json", 2_000_000, 1)]);
        let (mut source, metrics) = source(dir.path(), false);
        source.open(&resume).await.unwrap();

        assert_eq!(drain(&mut source).await, vec!["m2", "n1"]);
        assert_eq!(metrics.snapshot().lines_skipped, 5);
        assert_eq!(metrics.snapshot().files_completed, 3);
    }

    #[tokio::test]
    async fn test_rewritten_file_replayed_from_top() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.json", "x1\nx2\n", 5_000);

        let resume = resume_after(&[("a.json", 4_000_000, 2)]);
        let (mut source, _) = source(dir.path(), false);
        source.open(&resume).await.unwrap();
        assert_eq!(drain(&mut source).await, vec!["x1", "x2"]);
    }

    #[tokio::test]
    async fn test_positions_count_blank_lines() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.json", "first\n\nthird\n", 7_000);

        let (mut source, _) = source(dir.path(), false);
        source.open(&ResumePoint::fresh()).await.unwrap();
        let first = source.next_record().await.unwrap().unwrap();
        let third = source.next_record().await.unwrap().unwrap();

        assert_eq!(
            third.position(),
            Some(&ReplayPosition {
                file: "a.json".to_string(),
                modified_ms: 7_000_000,
                line: 3,
            })
        );
        assert_eq!(first.position().map(|p| p.line), Some(1));
    }

    #[tokio::test]
    async fn test_watch_picks_up_new_files() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "first.json", "one\n", 1_000);

        let (mut source, _) = source(dir.path(), true);
        source.open(&ResumePoint::fresh()).await.unwrap();

        let first = source.next_record().await.unwrap().unwrap();
        assert_eq!(first.payload().as_ref(), b"one");

        write_file(dir.path(), "second.json", "two\n", 2_000);
        let second = tokio::time::timeout(Duration::from_secs(5), source.next_record())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.payload().as_ref(), b"two");
        assert_eq!(source.pending_files(), 0);
    }

    #[tokio::test]
    async fn test_missing_directory_is_fatal() {
        let dir = tempdir().unwrap();
        let (mut source, _) = source(&dir.path().join("missing"), true);
        let err = source.open(&ResumePoint::fresh()).await.unwrap_err();
        assert!(matches!(err, ContractError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_file_path_is_not_a_directory() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "plain.json", "x\n", 1_000);
        let (mut source, _) = source(&dir.path().join("plain.json"), false);
        assert!(source.open(&ResumePoint::fresh()).await.is_err());
    }
}
