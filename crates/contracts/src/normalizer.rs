//! RecordNormalizer trait - raw → canonical mapping

use crate::{CanonicalRecord, RawRecord};

/// Maps a raw record to zero or one canonical record
///
/// Implementations must be deterministic and must not fail: malformed input
/// yields `None` and is counted.
pub trait RecordNormalizer: Send + Sync {
    fn normalize(&self, raw: &RawRecord) -> Option<CanonicalRecord>;

    /// Number of raw records dropped so far
    fn dropped_count(&self) -> u64;
}
