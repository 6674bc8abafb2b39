//! CheckpointStore trait

use contracts::CheckpointRecord;

use crate::Result;

/// Persistent home of the scheduler's `CheckpointRecord`
///
/// `save` must not return before the record is durable.
#[trait_variant::make(CheckpointStore: Send)]
pub trait LocalCheckpointStore {
    /// Human-readable location (used in logs)
    fn location(&self) -> String;

    /// Last saved checkpoint, `None` on a fresh start
    ///
    /// # Errors
    /// Unreadable or undecodable checkpoints are errors, never `None`.
    async fn load(&self) -> Result<Option<CheckpointRecord>>;

    /// Replace the stored checkpoint
    async fn save(&mut self, record: &CheckpointRecord) -> Result<()>;

    /// Remove the stored checkpoint; returns whether one existed
    async fn clear(&mut self) -> Result<bool>;
}
