//! Adapter fingerprint guarding checkpoint resume

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Identity of a configured source adapter
///
/// Only fields that change *which* records the adapter produces belong here;
/// credentials and tuning knobs (backoff, poll interval) do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterFingerprint {
    hash: String,
    fields: BTreeMap<String, String>,
}

impl AdapterFingerprint {
    /// Build a fingerprint from `(field, value)` pairs
    pub fn from_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, String)>,
        K: Into<String>,
    {
        let fields: BTreeMap<String, String> =
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect();

        let mut hasher = Sha256::new();
        for (key, value) in &fields {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        let hash = format!("{:x}", hasher.finalize());

        Self { hash, fields }
    }

    /// Hex-encoded SHA-256 over the sorted fields
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// First field whose stored value differs from the current one
    ///
    /// Returns `(field, stored, current)`; `None` when `stored` is empty.
    pub fn mismatched_field(
        &self,
        stored: &BTreeMap<String, String>,
    ) -> Option<(String, String, String)> {
        if stored.is_empty() {
            return None;
        }

        let absent = || "<absent>".to_string();
        self.fields
            .keys()
            .chain(stored.keys())
            .find(|key| self.fields.get(*key) != stored.get(*key))
            .map(|key| {
                (
                    key.clone(),
                    stored.get(key).cloned().unwrap_or_else(absent),
                    self.fields.get(key).cloned().unwrap_or_else(absent),
                )
            })
    }
}
