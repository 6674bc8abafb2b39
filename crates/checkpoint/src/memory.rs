//! In-memory checkpoint store
//!
//! Clones share state, so a test can keep a handle while the scheduler owns
//! the store.

use std::sync::{Arc, Mutex, MutexGuard};

use contracts::CheckpointRecord;

use crate::{CheckpointError, CheckpointStore, Result};

#[derive(Debug, Default)]
struct MemoryState {
    record: Option<CheckpointRecord>,
    history: Vec<CheckpointRecord>,
    failing_saves: u32,
    rejected_saves: u64,
}

/// Checkpoint store backed by process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `record`, as if written by a previous run
    pub fn with_record(record: CheckpointRecord) -> Self {
        let store = Self::default();
        store.lock().record = Some(record);
        store
    }

    /// Reject the next `count` saves
    pub fn fail_next_saves(&self, count: u32) {
        self.lock().failing_saves = count;
    }

    /// Currently stored record
    pub fn current(&self) -> Option<CheckpointRecord> {
        self.lock().record.clone()
    }

    /// Every successfully saved record, oldest first
    pub fn history(&self) -> Vec<CheckpointRecord> {
        self.lock().history.clone()
    }

    pub fn rejected_saves(&self) -> u64 {
        self.lock().rejected_saves
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    async fn load(&self) -> Result<Option<CheckpointRecord>> {
        Ok(self.current())
    }

    async fn save(&mut self, record: &CheckpointRecord) -> Result<()> {
        let mut state = self.lock();
        if state.failing_saves > 0 {
            state.failing_saves -= 1;
            state.rejected_saves += 1;
            return Err(CheckpointError::WriteRejected(format!(
                "injected failure for seq {}",
                record.sequence_number
            )));
        }
        state.record = Some(record.clone());
        state.history.push(record.clone());
        Ok(())
    }

    async fn clear(&mut self) -> Result<bool> {
        Ok(self.lock().record.take().is_some())
    }
}
