//! postgate-storage: durable registry of scheduled publications.
//!
//! The whole registry is one JSON document mapping job id to
//! [`ScheduledPost`]. Writes replace the file atomically.

pub mod store;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use postgate_types::ChatId;

pub use store::{PruneReport, Schedule, ScheduleStore};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A publication waiting for its timer.
///
/// The record is self-contained: firing never depends on the token still
/// being registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPost {
    /// Approval token the folder was presented with.
    pub token: String,
    /// Absolute path of the post folder.
    pub folder: PathBuf,
    /// Target channel.
    pub channel: ChatId,
    /// When to publish. Always UTC.
    #[serde(with = "utc_instant")]
    pub run_at: DateTime<Utc>,
}

/// RFC 3339 (de)serialization that reads naive timestamps as UTC and
/// normalizes offset timestamps to UTC.
pub mod utc_instant {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid instant: {raw:?}")))
    }

    /// Parse an ISO-8601 instant, with or without an offset.
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}
