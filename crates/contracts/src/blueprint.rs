//! StreamBlueprint - Config Loader output
//!
//! Describes the complete ingestion setup: batching, checkpointing, the
//! selected source adapter and the downstream sink routing.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{AdapterFingerprint, SchedulerSnapshot, SourceTag};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete ingestion blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Batching and retry settings
    pub streaming: StreamingConfig,

    /// Checkpoint location
    pub checkpoint: CheckpointConfig,

    /// Source selection and per-source settings
    pub source: SourceConfig,

    /// Downstream sink routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Micro-batch scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StreamingConfig {
    /// When false the context is configured but never started
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Batch interval in seconds
    #[validate(range(min = 1, max = 86400))]
    pub batch_interval_secs: u64,

    /// How long committed batches stay queryable for late joins (seconds)
    #[serde(default = "default_remember_secs")]
    pub remember_secs: u64,

    /// Total delivery attempts per batch before the scheduler gives up
    #[serde(default = "default_max_sink_attempts")]
    #[validate(range(min = 1, max = 100))]
    pub max_sink_attempts: u32,

    /// Base delay between delivery attempts (doubles per attempt)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Capacity of the source → scheduler channel
    #[serde(default = "default_channel_capacity")]
    #[validate(range(min = 1))]
    pub channel_capacity: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_remember_secs() -> u64 {
    60
}

fn default_max_sink_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_channel_capacity() -> usize {
    1024
}

impl StreamingConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval_secs)
    }

    pub fn remember(&self) -> Duration {
        Duration::from_secs(self.remember_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Settings recorded alongside every checkpoint
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            batch_interval_ms: self.batch_interval_secs * 1000,
            remember_ms: self.remember_secs * 1000,
            max_sink_attempts: self.max_sink_attempts,
        }
    }
}

/// Checkpoint location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory holding `checkpoint.json`
    pub directory: PathBuf,
}

/// Static source selection switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Live keyword-filtered feed
    Live,
    /// File replay from a watched directory
    Replay,
}

impl SourceKind {
    pub fn tag(&self) -> SourceTag {
        match self {
            Self::Live => SourceTag::Live,
            Self::Replay => SourceTag::Replay,
        }
    }
}

/// Source configuration
///
/// Both sections may be present; `kind` decides which one is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,

    #[serde(default)]
    pub live: Option<LiveFeedConfig>,

    #[serde(default)]
    pub replay: Option<ReplayConfig>,
}

impl SourceConfig {
    /// Identity of the selected adapter, used to guard checkpoint resume
    pub fn fingerprint(&self) -> AdapterFingerprint {
        let mut fields = vec![("source.kind", self.kind.tag().to_string())];

        match self.kind {
            SourceKind::Live => {
                if let Some(live) = &self.live {
                    fields.push(("source.live.endpoint", live.endpoint.trim().to_string()));
                    fields.push(("source.live.track", live.normalized_track().join(",")));
                }
            }
            SourceKind::Replay => {
                if let Some(replay) = &self.replay {
                    fields.push((
                        "source.replay.directory",
                        replay.directory.display().to_string(),
                    ));
                }
            }
        }

        AdapterFingerprint::from_fields(fields)
    }
}

/// Live feed settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LiveFeedConfig {
    /// `host:port` of the feed endpoint
    #[validate(length(min = 1))]
    pub endpoint: String,

    /// Keyword filter
    #[validate(length(min = 1))]
    pub track: Vec<String>,

    /// Access credentials sent in the subscribe handshake
    #[serde(default)]
    pub credentials: Credentials,

    /// Connect attempts before `open` fails
    #[serde(default = "default_connect_attempts")]
    #[validate(range(min = 1))]
    pub connect_attempts: u32,

    /// First reconnect delay
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Reconnect delay ceiling
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Silence (no data, no keep-alive) after which the connection is recycled
    #[serde(default = "default_stall_timeout_secs")]
    #[validate(range(min = 1))]
    pub stall_timeout_secs: u64,
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_stall_timeout_secs() -> u64 {
    90
}

impl LiveFeedConfig {
    /// Track keywords trimmed, lower-cased, sorted and deduplicated
    pub fn normalized_track(&self) -> Vec<String> {
        let mut track: Vec<String> = self
            .track
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        track.sort();
        track.dedup();
        track
    }
}

/// Feed credentials
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub consumer_key: String,
    #[serde(default)]
    pub consumer_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub access_token_secret: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.consumer_key.is_empty()
            && !self.consumer_secret.is_empty()
            && !self.access_token.is_empty()
            && !self.access_token_secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &"<redacted>")
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

/// Replay feed settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReplayConfig {
    /// Watched directory of newline-delimited record files
    pub directory: PathBuf,

    /// Directory rescan period
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 10))]
    pub poll_interval_ms: u64,

    /// Keep watching for new files; when false the feed ends after one scan
    #[serde(default = "default_watch")]
    pub watch: bool,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_watch() -> bool {
    true
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Worker queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    16
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log summary
    Log,
    /// JSONL files, one per batch
    File,
    /// UDP datagrams
    Network,
}

impl SinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::File => "file",
            Self::Network => "network",
        }
    }
}

impl std::fmt::Display for SinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
