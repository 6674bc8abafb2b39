//! Status payload normalizer
//!
//! Accepts one JSON status object per payload. Anything else is dropped and
//! counted; normalization never fails.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use contracts::{CanonicalRecord, RawRecord, RecordNormalizer};
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

/// `created_at` layout used by the v1.1 status format
const STATUS_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Why a payload was dropped
#[derive(Debug, Error, PartialEq, Eq)]
enum DropReason {
    #[error("payload is not valid JSON")]
    NotJson,

    #[error("payload is not a JSON object")]
    NotObject,

    #[error("stream notice ({0})")]
    Notice(&'static str),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("unparseable created_at '{0}'")]
    BadTimestamp(String),
}

/// Maps status JSON payloads to `CanonicalRecord`
#[derive(Debug, Default)]
pub struct StatusNormalizer {
    dropped: AtomicU64,
}

impl StatusNormalizer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordNormalizer for StatusNormalizer {
    fn normalize(&self, raw: &RawRecord) -> Option<CanonicalRecord> {
        match parse_status(raw) {
            Ok(record) => Some(record),
            Err(reason) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("firehose_records_dropped_total", "source" => raw.source().as_str())
                    .increment(1);
                trace!(source = %raw.source(), reason = %reason, "raw record dropped");
                None
            }
        }
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn parse_status(raw: &RawRecord) -> Result<CanonicalRecord, DropReason> {
    let value: Value = serde_json::from_slice(raw.payload()).map_err(|_| DropReason::NotJson)?;
    let status = value.as_object().ok_or(DropReason::NotObject)?;

    for notice in ["delete", "limit", "scrub_geo", "status_withheld", "warning"] {
        if status.contains_key(notice) {
            return Err(DropReason::Notice(notice));
        }
    }

    let id = extract_id(&value).ok_or(DropReason::MissingField("id"))?;
    let (text, entities) = extract_text(&value).ok_or(DropReason::MissingField("text"))?;
    let author = non_empty_str(&value["user"]["screen_name"])
        .or_else(|| non_empty_str(&value["user"]["name"]))
        .ok_or(DropReason::MissingField("user"))?;
    let created_at = extract_created_at(&value)?;

    Ok(CanonicalRecord {
        id,
        author: author.to_string(),
        text: text.to_string(),
        created_at,
        lang: non_empty_str(&value["lang"]).map(str::to_string),
        hashtags: extract_hashtags(entities),
        source: raw.source(),
        ingested_at_ms: raw.ingested_at_ms(),
    })
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.trim().is_empty())
}

fn extract_id(value: &Value) -> Option<String> {
    if let Some(id) = non_empty_str(&value["id_str"]) {
        return Some(id.to_string());
    }
    match &value["id"] {
        Value::Number(n) => n
            .as_u64()
            .map(|v| v.to_string())
            .or_else(|| n.as_i64().map(|v| v.to_string())),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Full text wins over the truncated one; hashtags follow the text they came from
fn extract_text(value: &Value) -> Option<(&str, &Value)> {
    if let Some(text) = non_empty_str(&value["full_text"]) {
        return Some((text, &value["entities"]));
    }
    let extended = &value["extended_tweet"];
    if let Some(text) = non_empty_str(&extended["full_text"]) {
        let entities = if extended["entities"].is_object() {
            &extended["entities"]
        } else {
            &value["entities"]
        };
        return Some((text, entities));
    }
    non_empty_str(&value["text"]).map(|text| (text, &value["entities"]))
}

fn extract_created_at(value: &Value) -> Result<DateTime<Utc>, DropReason> {
    if let Some(raw) = value["created_at"].as_str() {
        return parse_created_at(raw).ok_or_else(|| DropReason::BadTimestamp(raw.to_string()));
    }

    let millis = match &value["timestamp_ms"] {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };
    millis
        .and_then(DateTime::from_timestamp_millis)
        .ok_or(DropReason::MissingField("created_at"))
}

fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, STATUS_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn extract_hashtags(entities: &Value) -> Vec<String> {
    entities["hashtags"]
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| non_empty_str(&tag["text"]))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
