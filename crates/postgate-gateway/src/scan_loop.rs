//! Periodic scan loops, each addressable by a short task id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use postgate_posts::ScanEngine;

/// Delay before the first sweep of a loop started at boot.
pub const BOOT_SCAN_DELAY: Duration = Duration::from_secs(3);

const TASK_ID_LEN: usize = 8;

/// Running scan loops keyed by task id.
pub struct ScanLoops {
    scanner: Arc<ScanEngine>,
    interval: Duration,
    loops: Mutex<HashMap<String, CancellationToken>>,
}

impl ScanLoops {
    pub fn new(scanner: Arc<ScanEngine>, interval: Duration) -> Self {
        Self {
            scanner,
            interval: interval.max(Duration::from_secs(1)),
            loops: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start a loop whose first sweep runs after `first_delay`. Returns its task id.
    pub fn start(&self, first_delay: Duration) -> String {
        let mut task_id = uuid::Uuid::new_v4().simple().to_string();
        task_id.truncate(TASK_ID_LEN);

        let cancel = CancellationToken::new();
        self.loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.clone(), cancel.clone());

        let scanner = self.scanner.clone();
        let interval = self.interval;
        let id = task_id.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + first_delay, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(task_id = %id, interval_secs = interval.as_secs(), "Periodic scan started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = scanner.scan().await {
                            warn!(task_id = %id, "Periodic scan failed: {e:#}");
                        }
                    }
                }
            }
            info!(task_id = %id, "Periodic scan stopped");
        });

        task_id
    }

    /// Stop a loop. Returns `false` for unknown ids.
    pub fn stop(&self, task_id: &str) -> bool {
        let removed = self
            .loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id);
        match removed {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let loops: Vec<_> = self
            .loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (_, cancel) in loops {
            cancel.cancel();
        }
    }

    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postgate_posts::testing::RecordingMessenger;
    use postgate_posts::{ImageFilter, TokenRegistry};
    use postgate_types::ChatId;
    use std::fs;

    fn loops(root: &std::path::Path, messenger: Arc<RecordingMessenger>) -> ScanLoops {
        let scanner = Arc::new(ScanEngine::new(
            root.to_path_buf(),
            ChatId::Id(1),
            ImageFilter::default(),
            Arc::new(TokenRegistry::new()),
            messenger,
        ));
        ScanLoops::new(scanner, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_loop_scans_after_delay() {
        let root = tempfile::tempdir().unwrap();
        let post = root.path().join("post");
        fs::create_dir(&post).unwrap();
        fs::write(post.join("meta.json"), "{}").unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let loops = loops(root.path(), messenger.clone());

        let task_id = loops.start(Duration::from_millis(10));
        assert_eq!(task_id.len(), TASK_ID_LEN);

        for _ in 0..300 {
            if post.join(".lock").exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(post.join(".lock").exists());
        assert!(!messenger.texts().is_empty());
        assert!(loops.stop(&task_id));
    }

    #[tokio::test]
    async fn test_stop_unknown_and_twice() {
        let root = tempfile::tempdir().unwrap();
        let loops = loops(root.path(), Arc::new(RecordingMessenger::new()));

        let a = loops.start(Duration::from_secs(600));
        let b = loops.start(Duration::from_secs(600));
        assert_ne!(a, b);
        assert_eq!(loops.task_ids().len(), 2);

        assert!(!loops.stop("nope"));
        assert!(loops.stop(&a));
        assert!(!loops.stop(&a));
        loops.stop_all();
        assert!(loops.task_ids().is_empty());
    }
}
