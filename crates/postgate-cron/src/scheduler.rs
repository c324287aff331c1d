//! Publication scheduler: create, fire, cancel and restore jobs.

use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use postgate_posts::folder;
use postgate_posts::{ChannelPublisher, Messenger, PublishOutcome, ScanEngine};
use postgate_storage::{PruneReport, Schedule, ScheduleStore, ScheduledPost, StorageError};
use postgate_types::{ChatId, OutgoingText};

use crate::timer::{FiredJob, Timer};
use crate::{ScheduleError, format_run_at, parse_local_datetime};

/// Fixed values the scheduler needs from configuration.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Channel new jobs publish to.
    pub channel: ChatId,
    /// Chat that receives reports about fired jobs.
    pub admin_chat: ChatId,
    pub timezone: Tz,
}

/// What happened when a job fired.
#[derive(Debug)]
pub enum FireOutcome {
    Published,
    /// Published, but the folder is still on disk.
    NotDeleted,
    /// The folder was gone; nothing was sent.
    FolderMissing,
    /// Publishing failed and the folder was left in place.
    Failed,
}

/// Counters from startup reconciliation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    /// Future entries armed again under new ids.
    pub rearmed: usize,
    /// Overdue entries handed back to the approval flow.
    pub represented: usize,
    /// Entries whose folder no longer exists.
    pub discarded: usize,
}

/// Keeps the timer and the schedule store in step.
pub struct PublicationScheduler {
    settings: SchedulerSettings,
    store: Arc<ScheduleStore>,
    timer: Arc<dyn Timer>,
    publisher: Arc<ChannelPublisher>,
    scanner: Arc<ScanEngine>,
    messenger: Arc<dyn Messenger>,
    /// Held across arm + store insert, fire removal and restore.
    gate: Mutex<()>,
}

impl PublicationScheduler {
    pub fn new(
        settings: SchedulerSettings,
        store: Arc<ScheduleStore>,
        timer: Arc<dyn Timer>,
        publisher: Arc<ChannelPublisher>,
        scanner: Arc<ScanEngine>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            settings,
            store,
            timer,
            publisher,
            scanner,
            messenger,
            gate: Mutex::new(()),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.settings.timezone
    }

    /// Run a store operation on the blocking pool.
    async fn with_store<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&ScheduleStore) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StorageError::Io(io::Error::other(e)))?
    }

    /// Human-readable publication time in the configured zone.
    pub fn describe(&self, run_at: DateTime<Utc>) -> String {
        format_run_at(run_at, self.settings.timezone)
    }

    // ──────────────────── Create ────────────────────

    /// Schedule `folder` to publish `secs` seconds from now.
    pub async fn schedule_in(
        &self,
        token: &str,
        folder: &Path,
        secs: u64,
    ) -> Result<(String, DateTime<Utc>), ScheduleError> {
        let run_at = i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .ok_or_else(|| ScheduleError::BadFormat(format!("+{secs}s")))?;
        let job_id = self.schedule(token, folder, run_at).await?;
        Ok((job_id, run_at))
    }

    /// Schedule `folder` at a typed local time. Past times are rejected.
    pub async fn schedule_at_local(
        &self,
        token: &str,
        folder: &Path,
        text: &str,
    ) -> Result<(String, DateTime<Utc>), ScheduleError> {
        let run_at = parse_local_datetime(text, self.settings.timezone)?;
        if run_at <= Utc::now() {
            return Err(ScheduleError::InPast(run_at));
        }
        let job_id = self.schedule(token, folder, run_at).await?;
        Ok((job_id, run_at))
    }

    /// Arm a job and persist it. Existing jobs for `folder` are cancelled
    /// first, so a folder has at most one pending job.
    pub async fn schedule(
        &self,
        token: &str,
        folder: &Path,
        run_at: DateTime<Utc>,
    ) -> Result<String, ScheduleError> {
        let _gate = self.gate.lock().await;
        self.drop_folder_jobs(folder).await?;

        if let Err(e) = folder::write_lock(folder, token) {
            warn!(folder = %folder.display(), "Failed to write lock marker: {e}");
        }

        let post = ScheduledPost {
            token: token.to_string(),
            folder: folder.to_path_buf(),
            channel: self.settings.channel.clone(),
            run_at,
        };
        let job_id = self.timer.arm(run_at, post.clone());
        let id = job_id.clone();
        if let Err(e) = self.with_store(move |store| store.add(&id, post)).await {
            self.timer.cancel(&job_id);
            return Err(e.into());
        }

        info!(
            job_id = %job_id,
            folder = %folder.display(),
            run_at = %run_at.to_rfc3339(),
            "Publication scheduled"
        );
        Ok(job_id)
    }

    // ──────────────────── Cancel / Query ────────────────────

    /// Cancel a job. Unknown ids return `None` and leave the store alone.
    pub async fn cancel(&self, job_id: &str) -> Result<Option<ScheduledPost>, ScheduleError> {
        let _gate = self.gate.lock().await;
        let stopped = self.timer.cancel(job_id);
        let id = job_id.to_string();
        let removed = self.with_store(move |store| store.pop(&id)).await?;
        if removed.is_some() {
            info!(job_id, timer_stopped = stopped, "Scheduled job cancelled");
        }
        Ok(removed)
    }

    /// Cancel every job for `folder`, e.g. after it was published by hand.
    pub async fn cancel_folder(&self, folder: &Path) -> Result<usize, ScheduleError> {
        let _gate = self.gate.lock().await;
        self.drop_folder_jobs(folder).await
    }

    /// Caller holds the gate.
    async fn drop_folder_jobs(&self, folder: &Path) -> Result<usize, ScheduleError> {
        let path = folder.to_path_buf();
        let removed = self
            .with_store(move |store| store.remove_folder(&path))
            .await?;
        for (job_id, _) in &removed {
            self.timer.cancel(job_id);
            info!(job_id = %job_id, folder = %folder.display(), "Dropped scheduled job");
        }
        Ok(removed.len())
    }

    pub async fn get(&self, job_id: &str) -> Option<ScheduledPost> {
        let id = job_id.to_string();
        self.with_store(move |store| Ok(store.get(&id)))
            .await
            .unwrap_or_else(|e| {
                warn!(job_id, "Failed to read schedule: {e}");
                None
            })
    }

    /// All pending jobs, soonest first.
    pub async fn jobs(&self) -> Vec<(String, ScheduledPost)> {
        let schedule = self
            .with_store(|store| Ok(store.load_all()))
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to read schedule: {e}");
                Schedule::new()
            });
        let mut jobs: Vec<_> = schedule.into_iter().collect();
        jobs.sort_by(|a, b| a.1.run_at.cmp(&b.1.run_at).then_with(|| a.0.cmp(&b.0)));
        jobs
    }

    /// Drop jobs whose folder no longer exists.
    pub async fn prune(&self) -> Result<PruneReport, ScheduleError> {
        let _gate = self.gate.lock().await;
        Ok(self
            .with_store(|store| store.prune_missing_folders())
            .await?)
    }

    // ──────────────────── Fire ────────────────────

    /// Publish a fired job and drop its store entry, whatever the result.
    pub async fn fire(&self, job: FiredJob) -> FireOutcome {
        let FiredJob { job_id, post } = job;

        if !post.folder.exists() {
            info!(job_id = %job_id, folder = %post.folder.display(), "Folder gone, dropping job");
            self.remove_entry(&job_id).await;
            self.scanner.tokens().remove(&post.token);
            return FireOutcome::FolderMissing;
        }

        info!(job_id = %job_id, folder = %post.folder.display(), "Publishing scheduled post");
        let result = self.publisher.publish_folder(&post.folder, &post.channel).await;
        self.remove_entry(&job_id).await;
        // Failed publishes keep their token.
        if result.is_ok() {
            self.scanner.tokens().remove(&post.token);
        }

        let name = folder::folder_name(&post.folder);
        match result {
            Ok(PublishOutcome::Published) => FireOutcome::Published,
            Ok(PublishOutcome::NotDeleted(e)) => {
                self.notify(format!("⚠️ Published \"{name}\", but the folder was not deleted: {e}"))
                    .await;
                FireOutcome::NotDeleted
            }
            Err(e) => {
                error!(job_id = %job_id, folder = %post.folder.display(), "Scheduled publish failed: {e}");
                self.notify(format!("❌ Scheduled publication of \"{name}\" failed: {e}"))
                    .await;
                FireOutcome::Failed
            }
        }
    }

    async fn remove_entry(&self, job_id: &str) {
        let _gate = self.gate.lock().await;
        let id = job_id.to_string();
        if let Err(e) = self.with_store(move |store| store.pop(&id)).await {
            warn!(job_id, "Failed to remove fired job from store: {e}");
        }
    }

    async fn notify(&self, text: String) {
        if let Err(e) = self
            .messenger
            .send_text(&self.settings.admin_chat, OutgoingText::plain(text))
            .await
        {
            warn!("Failed to notify admin: {e:#}");
        }
    }

    // ──────────────────── Restore ────────────────────

    /// Rebuild timers from the store after a restart.
    ///
    /// Future entries are armed again and re-keyed. Overdue entries are never
    /// published automatically; their folders go back through approval.
    pub async fn restore(&self) -> Result<RestoreReport, ScheduleError> {
        let mut report = RestoreReport::default();
        let mut overdue = Vec::new();

        {
            let _gate = self.gate.lock().await;
            let now = Utc::now();
            let mut kept = Schedule::new();

            let schedule = self.with_store(|store| Ok(store.load_all())).await?;
            for (old_id, post) in schedule {
                if !post.folder.exists() {
                    info!(job_id = %old_id, folder = %post.folder.display(), "Discarding job for missing folder");
                    report.discarded += 1;
                } else if post.run_at <= now {
                    info!(job_id = %old_id, folder = %post.folder.display(), "Job overdue, returning to approval");
                    overdue.push(post);
                } else {
                    let job_id = self.timer.arm(post.run_at, post.clone());
                    kept.insert(job_id, post);
                    report.rearmed += 1;
                }
            }

            self.with_store(move |store| store.save_all(&kept)).await?;
        }

        for post in overdue {
            match self.scanner.present(&post.folder).await {
                Ok(_) => report.represented += 1,
                Err(e) => warn!(folder = %post.folder.display(), "Failed to re-present overdue post: {e:#}"),
            }
        }

        info!(
            rearmed = report.rearmed,
            represented = report.represented,
            discarded = report.discarded,
            "Schedule restored"
        );
        Ok(report)
    }

    // ──────────────────── Loop ────────────────────

    /// Consume fired jobs until the channel closes or `cancel` triggers.
    /// Each job is published in its own task.
    pub async fn run(
        self: Arc<Self>,
        mut fired: mpsc::UnboundedReceiver<FiredJob>,
        cancel: CancellationToken,
    ) {
        info!("Publication scheduler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                job = fired.recv() => match job {
                    Some(job) => {
                        let this = self.clone();
                        tokio::spawn(async move {
                            this.fire(job).await;
                        });
                    }
                    None => break,
                },
            }
        }
        info!("Publication scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postgate_posts::testing::RecordingMessenger;
    use postgate_posts::{ImageFilter, TokenRegistry};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TOKEN: &str = "0123456789ab";

    #[derive(Default)]
    struct ManualTimer {
        armed: std::sync::Mutex<Vec<(String, DateTime<Utc>, ScheduledPost)>>,
        cancelled: std::sync::Mutex<Vec<String>>,
        next: AtomicUsize,
    }

    impl ManualTimer {
        fn armed(&self) -> Vec<(String, DateTime<Utc>, ScheduledPost)> {
            self.armed.lock().unwrap().clone()
        }

        fn cancelled(&self) -> Vec<String> {
            self.cancelled.lock().unwrap().clone()
        }
    }

    impl Timer for ManualTimer {
        fn arm(&self, at: DateTime<Utc>, post: ScheduledPost) -> String {
            let id = format!("job{}", self.next.fetch_add(1, Ordering::SeqCst));
            self.armed.lock().unwrap().push((id.clone(), at, post));
            id
        }

        fn cancel(&self, job_id: &str) -> bool {
            self.cancelled.lock().unwrap().push(job_id.to_string());
            self.armed
                .lock()
                .unwrap()
                .iter()
                .any(|(id, _, _)| id == job_id)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        store: Arc<ScheduleStore>,
        timer: Arc<ManualTimer>,
        tokens: Arc<TokenRegistry>,
        messenger: Arc<RecordingMessenger>,
        scheduler: PublicationScheduler,
    }

    fn fixture() -> Fixture {
        fixture_with(|publisher| publisher)
    }

    fn fixture_with(configure: impl FnOnce(ChannelPublisher) -> ChannelPublisher) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("posts");
        fs::create_dir(&root).unwrap();
        let store = Arc::new(ScheduleStore::new(root.join(".scheduled_posts.json")));
        let timer = Arc::new(ManualTimer::default());
        let tokens = Arc::new(TokenRegistry::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let scanner = Arc::new(ScanEngine::new(
            root.clone(),
            ChatId::Id(1),
            ImageFilter::default(),
            tokens.clone(),
            messenger.clone(),
        ));
        let publisher = Arc::new(configure(ChannelPublisher::new(
            messenger.clone(),
            ImageFilter::default(),
        )));
        let scheduler = PublicationScheduler::new(
            SchedulerSettings {
                channel: ChatId::Handle("@chan".into()),
                admin_chat: ChatId::Id(1),
                timezone: chrono_tz::Europe::Moscow,
            },
            store.clone(),
            timer.clone(),
            publisher,
            scanner,
            messenger.clone(),
        );
        Fixture {
            _dir: dir,
            root,
            store,
            timer,
            tokens,
            messenger,
            scheduler,
        }
    }

    fn make_post(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("meta.json"), "{}").unwrap();
        fs::write(dir.join("a.jpg"), b"img").unwrap();
        dir
    }

    fn record(folder: &Path, run_at: DateTime<Utc>) -> ScheduledPost {
        ScheduledPost {
            token: TOKEN.into(),
            folder: folder.to_path_buf(),
            channel: ChatId::Handle("@chan".into()),
            run_at,
        }
    }

    #[tokio::test]
    async fn test_schedule_persists_and_arms() {
        let f = fixture();
        let folder = make_post(&f.root, "post");

        let (job_id, run_at) = f.scheduler.schedule_in(TOKEN, &folder, 900).await.unwrap();

        let stored = f.store.get(&job_id).unwrap();
        assert_eq!(stored.folder, folder);
        assert_eq!(stored.run_at, run_at);
        assert_eq!(stored.channel, ChatId::Handle("@chan".into()));
        assert_eq!(f.timer.armed()[0].0, job_id);
        assert_eq!(fs::read_to_string(folder.join(".lock")).unwrap(), TOKEN);
    }

    #[tokio::test]
    async fn test_reschedule_replaces_job() {
        let f = fixture();
        let folder = make_post(&f.root, "post");

        let (first, _) = f.scheduler.schedule_in(TOKEN, &folder, 900).await.unwrap();
        let (second, _) = f.scheduler.schedule_in(TOKEN, &folder, 3600).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(f.timer.cancelled(), vec![first.clone()]);
        let jobs = f.scheduler.jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0, second);
    }

    #[tokio::test]
    async fn test_schedule_at_local_rejects_past() {
        let f = fixture();
        let folder = make_post(&f.root, "post");

        let err = f
            .scheduler
            .schedule_at_local(TOKEN, &folder, "2001-01-01 10:00")
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InPast(_)));
        let err = f
            .scheduler
            .schedule_at_local(TOKEN, &folder, "tomorrow")
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::BadFormat(_)));
        assert!(f.timer.armed().is_empty());
        assert!(!f.store.path().exists());
    }

    #[tokio::test]
    async fn test_schedule_at_local_converts_zone() {
        let f = fixture();
        let folder = make_post(&f.root, "post");

        let (job_id, run_at) = f
            .scheduler
            .schedule_at_local(TOKEN, &folder, "2099-06-01 15:00")
            .await
            .unwrap();
        assert_eq!(run_at.to_rfc3339(), "2099-06-01T12:00:00+00:00");
        assert_eq!(f.store.get(&job_id).unwrap().run_at, run_at);
    }

    #[tokio::test]
    async fn test_cancel_unknown_is_noop() {
        let f = fixture();
        let folder = make_post(&f.root, "post");
        let (job_id, _) = f.scheduler.schedule_in(TOKEN, &folder, 60).await.unwrap();
        let before = fs::read_to_string(f.store.path()).unwrap();

        assert!(f.scheduler.cancel("missing").await.unwrap().is_none());
        assert_eq!(fs::read_to_string(f.store.path()).unwrap(), before);
        assert!(f.store.get(&job_id).is_some());
    }

    #[tokio::test]
    async fn test_cancel_removes_entry() {
        let f = fixture();
        let folder = make_post(&f.root, "post");
        let (job_id, _) = f.scheduler.schedule_in(TOKEN, &folder, 60).await.unwrap();

        let removed = f.scheduler.cancel(&job_id).await.unwrap().unwrap();
        assert_eq!(removed.folder, folder);
        assert!(f.store.get(&job_id).is_none());
        assert!(f.timer.cancelled().contains(&job_id));
    }

    #[tokio::test]
    async fn test_cancel_folder_drops_all_jobs() {
        let f = fixture();
        let a = make_post(&f.root, "a");
        let b = make_post(&f.root, "b");
        let (job_a, _) = f.scheduler.schedule_in(TOKEN, &a, 60).await.unwrap();
        f.scheduler.schedule_in(TOKEN, &b, 60).await.unwrap();

        assert_eq!(f.scheduler.cancel_folder(&a).await.unwrap(), 1);
        assert_eq!(f.scheduler.cancel_folder(&a).await.unwrap(), 0);
        assert!(f.store.get(&job_a).is_none());
        assert_eq!(f.scheduler.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fire_publishes_and_removes_entry() {
        let f = fixture();
        let folder = make_post(&f.root, "post");
        f.tokens.register(TOKEN, &folder);
        let (job_id, run_at) = f.scheduler.schedule_in(TOKEN, &folder, 60).await.unwrap();

        let outcome = f
            .scheduler
            .fire(FiredJob {
                job_id: job_id.clone(),
                post: record(&folder, run_at),
            })
            .await;

        assert!(matches!(outcome, FireOutcome::Published));
        assert!(f.tokens.lookup(TOKEN).is_none());
        assert!(!folder.exists());
        assert!(f.store.get(&job_id).is_none());
        let albums = f.messenger.media_calls();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].0, ChatId::Handle("@chan".into()));
    }

    #[tokio::test]
    async fn test_fire_missing_folder_drops_silently() {
        let f = fixture();
        let folder = make_post(&f.root, "post");
        let (job_id, run_at) = f.scheduler.schedule_in(TOKEN, &folder, 60).await.unwrap();
        fs::remove_dir_all(&folder).unwrap();

        let outcome = f
            .scheduler
            .fire(FiredJob {
                job_id: job_id.clone(),
                post: record(&folder, run_at),
            })
            .await;

        assert!(matches!(outcome, FireOutcome::FolderMissing));
        assert!(f.store.get(&job_id).is_none());
        assert!(f.messenger.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fire_failure_keeps_folder_and_drops_entry() {
        let f = fixture();
        let folder = make_post(&f.root, "post");
        f.tokens.register(TOKEN, &folder);
        let (job_id, run_at) = f.scheduler.schedule_in(TOKEN, &folder, 60).await.unwrap();
        f.messenger.fail_sends(true);

        let outcome = f
            .scheduler
            .fire(FiredJob {
                job_id: job_id.clone(),
                post: record(&folder, run_at),
            })
            .await;

        assert!(matches!(outcome, FireOutcome::Failed));
        assert!(folder.exists());
        assert!(f.store.get(&job_id).is_none());
        assert_eq!(f.tokens.lookup(TOKEN), Some(folder));
    }

    #[tokio::test]
    async fn test_fire_reports_undeleted_folder() {
        let f = fixture_with(|p| {
            p.with_remove_dir(|_| Err(io::Error::from(io::ErrorKind::PermissionDenied)))
        });
        let folder = make_post(&f.root, "post");
        f.tokens.register(TOKEN, &folder);
        let (job_id, run_at) = f.scheduler.schedule_in(TOKEN, &folder, 60).await.unwrap();

        let outcome = f
            .scheduler
            .fire(FiredJob {
                job_id: job_id.clone(),
                post: record(&folder, run_at),
            })
            .await;

        assert!(matches!(outcome, FireOutcome::NotDeleted));
        assert!(folder.exists());
        assert!(f.store.get(&job_id).is_none());
        assert_eq!(f.messenger.media_calls().len(), 1);
        assert!(f.tokens.lookup(TOKEN).is_none());
        let texts = f.messenger.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("\"post\", but the folder was not deleted"));
    }

    #[tokio::test]
    async fn test_schedule_store_failure_disarms_timer() {
        let f = fixture();
        let folder = make_post(&f.root, "post");
        let scanner = Arc::new(ScanEngine::new(
            f.root.clone(),
            ChatId::Id(1),
            ImageFilter::default(),
            f.tokens.clone(),
            f.messenger.clone(),
        ));
        let scheduler = PublicationScheduler::new(
            SchedulerSettings {
                channel: ChatId::Handle("@chan".into()),
                admin_chat: ChatId::Id(1),
                timezone: chrono_tz::UTC,
            },
            Arc::new(ScheduleStore::new(f.root.join("missing/schedule.json"))),
            f.timer.clone(),
            Arc::new(ChannelPublisher::new(f.messenger.clone(), ImageFilter::default())),
            scanner,
            f.messenger.clone(),
        );

        let err = scheduler.schedule_in(TOKEN, &folder, 60).await.unwrap_err();

        assert!(matches!(err, ScheduleError::Storage(_)));
        let armed = f.timer.armed();
        assert_eq!(armed.len(), 1);
        assert_eq!(f.timer.cancelled(), vec![armed[0].0.clone()]);
        assert!(scheduler.jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_restore_past_entry_returns_to_approval() {
        let f = fixture();
        let folder = make_post(&f.root, "post");
        f.store
            .add("old", record(&folder, Utc::now() - Duration::hours(1)))
            .unwrap();

        let report = f.scheduler.restore().await.unwrap();

        assert_eq!(report.represented, 1);
        assert!(f.store.load_all().is_empty());
        assert!(f.timer.armed().is_empty());
        let token = f.tokens.token_for(&folder).unwrap();
        assert_ne!(token, TOKEN);
        assert_eq!(fs::read_to_string(folder.join(".lock")).unwrap(), token);
        assert!(folder.exists());
        let approve = format!("approve:{token}");
        let cards = f.messenger.sent_texts();
        assert_eq!(cards.len(), 1);
        assert!(
            cards[0]
                .keyboard
                .as_ref()
                .is_some_and(|k| k.callbacks().any(|c| c == approve))
        );
    }

    #[tokio::test]
    async fn test_restore_future_entry_is_rekeyed() {
        let f = fixture();
        let folder = make_post(&f.root, "post");
        let run_at = Utc::now() + Duration::hours(2);
        f.store.add("old", record(&folder, run_at)).unwrap();

        let report = f.scheduler.restore().await.unwrap();

        assert_eq!(report.rearmed, 1);
        let schedule = f.store.load_all();
        assert_eq!(schedule.len(), 1);
        let (job_id, post) = schedule.into_iter().next().unwrap();
        assert_ne!(job_id, "old");
        assert_eq!(post.folder, folder);
        assert_eq!(post.run_at, run_at);
        assert_eq!(f.timer.armed()[0].0, job_id);
        assert!(f.messenger.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restore_discards_missing_folder() {
        let f = fixture();
        let gone = f.root.join("gone");
        f.store
            .add("old", record(&gone, Utc::now() + Duration::hours(1)))
            .unwrap();

        let report = f.scheduler.restore().await.unwrap();
        assert_eq!(report.discarded, 1);
        assert!(f.store.load_all().is_empty());
        assert!(f.timer.armed().is_empty());
    }

    #[tokio::test]
    async fn test_run_loop_fires_through_tokio_timer() {
        let f = fixture();
        let folder = make_post(&f.root, "post");
        let (timer, rx) = crate::TokioTimer::new();
        let scanner = Arc::new(ScanEngine::new(
            f.root.clone(),
            ChatId::Id(1),
            ImageFilter::default(),
            f.tokens.clone(),
            f.messenger.clone(),
        ));
        let scheduler = Arc::new(PublicationScheduler::new(
            SchedulerSettings {
                channel: ChatId::Handle("@chan".into()),
                admin_chat: ChatId::Id(1),
                timezone: chrono_tz::UTC,
            },
            f.store.clone(),
            Arc::new(timer),
            Arc::new(ChannelPublisher::new(f.messenger.clone(), ImageFilter::default())),
            scanner,
            f.messenger.clone(),
        ));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduler.clone().run(rx, cancel.clone()));

        scheduler.schedule(TOKEN, &folder, Utc::now()).await.unwrap();
        for _ in 0..500 {
            if !folder.exists() && f.store.load_all().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert!(!folder.exists());
        assert!(f.store.load_all().is_empty());
        cancel.cancel();
        handle.await.unwrap();
    }
}
