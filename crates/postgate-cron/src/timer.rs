//! One-shot timers for scheduled publications.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use postgate_storage::ScheduledPost;

/// A timer that went off, carrying the record it was armed with.
#[derive(Debug, Clone)]
pub struct FiredJob {
    pub job_id: String,
    pub post: ScheduledPost,
}

/// Arms and cancels one-shot jobs.
///
/// A job fires at most once. After `cancel` returned `true` the job never
/// fires; `false` means it is unknown or has already fired.
pub trait Timer: Send + Sync {
    /// Arm a job firing at `at` and return its id.
    fn arm(&self, at: DateTime<Utc>, post: ScheduledPost) -> String;

    fn cancel(&self, job_id: &str) -> bool;
}

type JobTable = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Timer backed by one sleeping tokio task per job.
///
/// Fired jobs are delivered on the channel returned by [`TokioTimer::new`].
pub struct TokioTimer {
    jobs: JobTable,
    fired: mpsc::UnboundedSender<FiredJob>,
}

impl TokioTimer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FiredJob>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let timer = Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            fired,
        };
        (timer, rx)
    }

    /// Number of armed jobs that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Timer for TokioTimer {
    fn arm(&self, at: DateTime<Utc>, post: ScheduledPost) -> String {
        let job_id = uuid::Uuid::new_v4().simple().to_string();
        let cancel = CancellationToken::new();
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.clone(), cancel.clone());

        // Past instants fire right away.
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let jobs = self.jobs.clone();
        let fired = self.fired.clone();
        let id = job_id.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(job_id = %id, "Timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    let armed = jobs
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&id)
                        .is_some();
                    if armed && fired.send(FiredJob { job_id: id.clone(), post }).is_err() {
                        warn!(job_id = %id, "Scheduler loop gone, dropping fired job");
                    }
                }
            }
        });

        job_id
    }

    fn cancel(&self, job_id: &str) -> bool {
        let removed = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);
        match removed {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}
