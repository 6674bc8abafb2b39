//! RawRecord / CanonicalRecord - Ingestion output and Normalizer output

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Epoch milliseconds
pub type TimestampMs = i64;

/// Provenance of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Live push feed
    Live,
    /// File-based replay feed
    Replay,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Replay => "replay",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a replay record was read from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplayPosition {
    /// File name inside the replay directory
    pub file: String,

    /// Modification time of the file when it was opened
    pub modified_ms: TimestampMs,

    /// 1-based physical line number, blank lines included
    pub line: u64,
}

/// Raw record pulled from a source adapter
///
/// Immutable once produced: fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    payload: Bytes,
    ingested_at_ms: TimestampMs,
    source: SourceTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<ReplayPosition>,
}

impl RawRecord {
    /// Create a new raw record
    pub fn new(payload: impl Into<Bytes>, ingested_at_ms: TimestampMs, source: SourceTag) -> Self {
        Self {
            payload: payload.into(),
            ingested_at_ms,
            source,
            position: None,
        }
    }

    /// Attach the replay file and line the record was read from
    pub fn with_position(mut self, position: ReplayPosition) -> Self {
        self.position = Some(position);
        self
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn ingested_at_ms(&self) -> TimestampMs {
        self.ingested_at_ms
    }

    pub fn source(&self) -> SourceTag {
        self.source
    }

    pub fn position(&self) -> Option<&ReplayPosition> {
        self.position.as_ref()
    }

    /// Replay file name, if the record came from one
    pub fn origin(&self) -> Option<&str> {
        self.position.as_ref().map(|p| p.file.as_str())
    }
}

/// Normalized record handed to the downstream sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Status id, unique within a batch
    pub id: String,

    /// Author handle
    pub author: String,

    /// Full text
    pub text: String,

    /// Creation time reported by the feed
    pub created_at: DateTime<Utc>,

    /// Language code, if the feed reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    /// Hashtags without the leading '#'
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<String>,

    /// Provenance
    pub source: SourceTag,

    /// Ingestion time of the raw record this was parsed from
    pub ingested_at_ms: TimestampMs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_record_accessors() {
        let raw = RawRecord::new("hello", 1_000, SourceTag::Replay).with_position(ReplayPosition {
            file: "a.txt".to_string(),
            modified_ms: 500,
            line: 3,
        });
        assert_eq!(raw.payload().as_ref(), b"hello");
        assert_eq!(raw.ingested_at_ms(), 1_000);
        assert_eq!(raw.source(), SourceTag::Replay);
        assert_eq!(raw.origin(), Some("a.txt"));
        assert_eq!(raw.position().map(|p| p.line), Some(3));
        assert_eq!(RawRecord::new("x", 0, SourceTag::Live).origin(), None);
    }

    #[test]
    fn source_tag_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SourceTag::Live).unwrap(), "\"live\"");
        assert_eq!(SourceTag::Replay.to_string(), "replay");
    }
}
