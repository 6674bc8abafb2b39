//! Batch buffer
//!
//! Raw records waiting for their window, in arrival order.

use std::collections::{HashSet, VecDeque};

use contracts::{CanonicalRecord, RawRecord, RecordNormalizer, TimestampMs};

/// Arrival-ordered holding area between the channel and the sink
#[derive(Debug, Default)]
pub struct BatchBuffer {
    pending: VecDeque<RawRecord>,
}

/// Records of one closed window, normalized and deduplicated
#[derive(Debug, Default)]
pub struct WindowContents {
    pub records: Vec<CanonicalRecord>,
    pub malformed: u64,
    pub duplicates: u64,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: RawRecord) {
        self.pending.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawRecord> {
        self.pending.iter()
    }

    /// Remove every record stamped before `end_ms`
    ///
    /// Records stamped at or after `end_ms` stay buffered, in arrival order,
    /// for the next window.
    pub fn take_before(&mut self, end_ms: TimestampMs) -> Vec<RawRecord> {
        let mut taken = Vec::new();
        let mut carried = VecDeque::new();

        for record in self.pending.drain(..) {
            if record.ingested_at_ms() < end_ms {
                taken.push(record);
            } else {
                carried.push_back(record);
            }
        }

        self.pending = carried;
        taken
    }
}

/// Normalize in arrival order, keeping the first record of each id
pub fn normalize_window(raw: &[RawRecord], normalizer: &dyn RecordNormalizer) -> WindowContents {
    let mut contents = WindowContents::default();
    let mut seen = HashSet::with_capacity(raw.len());

    for record in raw {
        match normalizer.normalize(record) {
            Some(canonical) => {
                if seen.insert(canonical.id.clone()) {
                    contents.records.push(canonical);
                } else {
                    contents.duplicates += 1;
                }
            }
            None => contents.malformed += 1,
        }
    }

    contents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{raw, IdNormalizer};

    fn payloads(records: &[RawRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| String::from_utf8_lossy(r.payload()).into_owned())
            .collect()
    }

    #[test]
    fn test_take_before_carries_late_records() {
        let mut buffer = BatchBuffer::new();
        buffer.push(raw("a", 1_000));
        buffer.push(raw("b", 5_000));
        buffer.push(raw("c", 3_000));
        buffer.push(raw("d", 6_000));

        let taken = buffer.take_before(5_000);
        assert_eq!(payloads(&taken), vec!["a", "c"]);
        assert_eq!(buffer.len(), 2);

        let rest = buffer.take_before(10_000);
        assert_eq!(payloads(&rest), vec!["b", "d"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_normalize_window_dedups_and_counts() {
        let normalizer = IdNormalizer::default();
        let input = vec![
            raw("1|first", 0),
            raw("bad", 0),
            raw("2", 0),
            raw("1|second", 0),
        ];

        let contents = normalize_window(&input, &normalizer);
        let texts: Vec<_> = contents.records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["1|first", "2"]);
        assert_eq!(contents.duplicates, 1);
        assert_eq!(contents.malformed, 1);
        assert_eq!(normalizer.dropped_count(), 1);
    }
}
