//! File-backed checkpoint store
//!
//! Layout: `<dir>/checkpoint.json` (pretty JSON). Writes go through
//! `<dir>/checkpoint.json.tmp`, are `sync_all`ed, renamed over the target and
//! followed by a directory fsync, so a crash leaves either the old or the new
//! record on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use contracts::CheckpointRecord;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::{CheckpointError, CheckpointStore, Result};

/// Checkpoint file name inside the checkpoint directory
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

const TEMP_SUFFIX: &str = ".tmp";

/// Durable checkpoint store on the local filesystem
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    path: PathBuf,
    temp_path: PathBuf,
}

impl FileCheckpointStore {
    /// Store rooted at `dir`; the directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(CHECKPOINT_FILE);
        let temp_path = dir.join(format!("{CHECKPOINT_FILE}{TEMP_SUFFIX}"));
        Self {
            dir,
            path,
            temp_path,
        }
    }

    /// Full path of `checkpoint.json`
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_temp(&self, data: &[u8]) -> Result<()> {
        let mut file = fs::File::create(&self.temp_path)
            .await
            .map_err(|e| CheckpointError::io(&self.temp_path, e))?;
        file.write_all(data)
            .await
            .map_err(|e| CheckpointError::io(&self.temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| CheckpointError::io(&self.temp_path, e))?;
        Ok(())
    }

    /// Make the rename itself durable
    #[cfg(unix)]
    async fn sync_dir(&self) -> Result<()> {
        let dir = fs::File::open(&self.dir)
            .await
            .map_err(|e| CheckpointError::io(&self.dir, e))?;
        dir.sync_all()
            .await
            .map_err(|e| CheckpointError::io(&self.dir, e))
    }

    #[cfg(not(unix))]
    async fn sync_dir(&self) -> Result<()> {
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    #[instrument(name = "checkpoint_load", skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Option<CheckpointRecord>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no checkpoint on disk");
                return Ok(None);
            }
            Err(e) => return Err(CheckpointError::io(&self.path, e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(CheckpointError::corrupt(&self.path, "file is empty"));
        }

        let record: CheckpointRecord = serde_json::from_slice(&bytes)
            .map_err(|e| CheckpointError::corrupt(&self.path, e.to_string()))?;

        debug!(
            seq = record.sequence_number,
            last_batch_end_time = record.last_batch_end_time,
            "checkpoint loaded"
        );
        Ok(Some(record))
    }

    #[instrument(
        name = "checkpoint_save",
        skip(self, record),
        fields(seq = record.sequence_number)
    )]
    async fn save(&mut self, record: &CheckpointRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointError::io(&self.dir, e))?;

        let data = serde_json::to_vec_pretty(record)?;
        self.write_temp(&data).await?;

        fs::rename(&self.temp_path, &self.path)
            .await
            .map_err(|e| CheckpointError::io(&self.path, e))?;
        self.sync_dir().await?;

        debug!(
            last_batch_end_time = record.last_batch_end_time,
            "checkpoint persisted"
        );
        Ok(())
    }

    async fn clear(&mut self) -> Result<bool> {
        // 残留的临时文件一并清理
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            if e.kind() != ErrorKind::NotFound {
                return Err(CheckpointError::io(&self.temp_path, e));
            }
        }

        match fs::remove_file(&self.path).await {
            Ok(()) => {
                self.sync_dir().await?;
                info!(path = %self.path.display(), "checkpoint cleared");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CheckpointError::io(&self.path, e)),
        }
    }
}
