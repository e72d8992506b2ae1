//! Response entries and the unordered pair key used by the similarity cache.

use chrono::{DateTime, Utc};
use loopguard_core::ValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One generated response, as observed by the detector.
///
/// Immutable once constructed; the detector owns its entries exclusively.
/// Deserialized entries go through the same checks as [`ResponseEntry::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawEntry")]
pub struct ResponseEntry {
    id: Uuid,
    content: String,
    timestamp: DateTime<Utc>,
    confidence: f64,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl ResponseEntry {
    /// Build an entry stamped with the current time.
    pub fn new(
        content: impl Into<String>,
        confidence: f64,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, ValidationError> {
        let content = content.into();
        check_entry(&content, confidence)?;
        Ok(Self {
            id: Uuid::new_v4(),
            content,
            timestamp: Utc::now(),
            confidence,
            metadata,
        })
    }

    /// Override the observation time (replayed transcripts, tests).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.metadata
    }

    /// Age in seconds relative to `now` (negative for future timestamps).
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.timestamp).num_milliseconds() as f64 / 1000.0
    }
}

fn check_entry(content: &str, confidence: f64) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ValidationError::ConfidenceOutOfRange(confidence));
    }
    Ok(())
}

/// Wire shape of a [`ResponseEntry`] before validation.
#[derive(Deserialize)]
struct RawEntry {
    id: Uuid,
    content: String,
    timestamp: DateTime<Utc>,
    confidence: f64,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl TryFrom<RawEntry> for ResponseEntry {
    type Error = ValidationError;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        check_entry(&raw.content, raw.confidence)?;
        Ok(Self {
            id: raw.id,
            content: raw.content,
            timestamp: raw.timestamp,
            confidence: raw.confidence,
            metadata: raw.metadata,
        })
    }
}

/// Canonical key for an unordered pair of entries: `(a, b)` and `(b, a)`
/// map to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey(Uuid, Uuid);

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }
}
