//! postgate-cron: delayed publication of approved posts.
//!
//! Jobs live in two places: an armed [`Timer`] and the durable
//! [`ScheduleStore`](postgate_storage::ScheduleStore). The
//! [`PublicationScheduler`] keeps them in step and rebuilds the timers from
//! the store after a restart.

pub mod scheduler;
pub mod timer;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;

use postgate_storage::StorageError;

pub use scheduler::{FireOutcome, PublicationScheduler, RestoreReport, SchedulerSettings};
pub use timer::{FiredJob, Timer, TokioTimer};

/// Format accepted for typed publication times, in the configured zone.
pub const LOCAL_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid date {0:?}, expected YYYY-MM-DD HH:MM")]
    BadFormat(String),
    #[error("{0} does not exist in the configured time zone")]
    Nonexistent(String),
    #[error("time {} is in the past", .0.format("%Y-%m-%d %H:%M UTC"))]
    InPast(DateTime<Utc>),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Parse `YYYY-MM-DD HH:MM` as wall time in `tz` and convert to UTC.
///
/// Ambiguous times (clock set back) resolve to the earlier instant. Times
/// skipped by a forward shift are rejected.
pub fn parse_local_datetime(text: &str, tz: Tz) -> Result<DateTime<Utc>, ScheduleError> {
    let text = text.trim();
    let naive = NaiveDateTime::parse_from_str(text, LOCAL_INPUT_FORMAT)
        .map_err(|_| ScheduleError::BadFormat(text.to_string()))?;
    naive
        .and_local_timezone(tz)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| ScheduleError::Nonexistent(text.to_string()))
}

/// `2025-01-01 12:00 (Europe/Moscow), UTC: 2025-01-01 09:00`
pub fn format_run_at(run_at: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "{} ({}), UTC: {}",
        run_at.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
        tz.name(),
        run_at.format("%Y-%m-%d %H:%M"),
    )
}
