//! JSON-file-backed schedule storage.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::{Result, ScheduledPost};

/// Job id → scheduled publication.
pub type Schedule = BTreeMap<String, ScheduledPost>;

/// Outcome of [`ScheduleStore::prune_missing_folders`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: usize,
    pub retained: usize,
}

/// Persistent storage for scheduled publications.
///
/// Every read-modify-write goes through one gate, so concurrent `add`/`pop`
/// calls inside the process never lose updates.
pub struct ScheduleStore {
    path: PathBuf,
    gate: Mutex<()>,
}

impl ScheduleStore {
    /// Create a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every entry. A missing or corrupt file reads as empty, and
    /// individual invalid entries are skipped.
    pub fn load_all(&self) -> Schedule {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Schedule::new(),
            Err(e) => {
                warn!(path = %self.path.display(), "Failed to read schedule file: {e}");
                return Schedule::new();
            }
        };

        let entries: serde_json::Map<String, serde_json::Value> =
            match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %self.path.display(), "Corrupt schedule file, ignoring: {e}");
                    return Schedule::new();
                }
            };

        let mut out = Schedule::new();
        for (job_id, payload) in entries {
            match serde_json::from_value::<ScheduledPost>(payload) {
                Ok(post) => {
                    out.insert(job_id, post);
                }
                Err(e) => warn!(job_id, "Skipping invalid schedule entry: {e}"),
            }
        }
        out
    }

    /// Replace the whole file with `schedule`.
    pub fn save_all(&self, schedule: &Schedule) -> Result<()> {
        let _guard = self.lock();
        self.write(schedule)
    }

    /// Insert or replace one entry.
    pub fn add(&self, job_id: &str, post: ScheduledPost) -> Result<()> {
        let _guard = self.lock();
        let mut schedule = self.load_all();
        schedule.insert(job_id.to_string(), post);
        self.write(&schedule)
    }

    /// Remove one entry, returning it. Unknown ids leave the file untouched.
    pub fn pop(&self, job_id: &str) -> Result<Option<ScheduledPost>> {
        let _guard = self.lock();
        let mut schedule = self.load_all();
        let removed = schedule.remove(job_id);
        if removed.is_some() {
            self.write(&schedule)?;
        }
        Ok(removed)
    }

    pub fn get(&self, job_id: &str) -> Option<ScheduledPost> {
        self.load_all().remove(job_id)
    }

    /// Remove every entry targeting `folder`, returning the removed pairs.
    pub fn remove_folder(&self, folder: &Path) -> Result<Vec<(String, ScheduledPost)>> {
        let _guard = self.lock();
        let schedule = self.load_all();
        let (removed, kept): (Vec<_>, Vec<_>) = schedule
            .into_iter()
            .partition(|(_, post)| post.folder == folder);
        if !removed.is_empty() {
            self.write(&kept.into_iter().collect())?;
        }
        Ok(removed)
    }

    /// Drop entries whose folder no longer exists.
    pub fn prune_missing_folders(&self) -> Result<PruneReport> {
        let _guard = self.lock();
        let mut schedule = self.load_all();
        let before = schedule.len();
        schedule.retain(|_, post| post.folder.exists());
        let report = PruneReport {
            removed: before - schedule.len(),
            retained: schedule.len(),
        };
        self.write(&schedule)?;
        Ok(report)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write to `<path>.tmp`, then rename over the target. Caller holds the gate.
    fn write(&self, schedule: &Schedule) -> Result<()> {
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let text = serde_json::to_string_pretty(schedule)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), entries = schedule.len(), "Schedule saved");
        Ok(())
    }
}
