//! Directory sweep that presents new post folders for approval.
//!
//! Deduplication relies on the advisory `.lock` marker plus the token
//! registry. Two overlapping sweeps can both see a folder before either
//! writes its marker; the folder is then presented twice.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use postgate_types::{ChatId, OutgoingText};

use crate::folder::{self, ImageFilter, PostFolder};
use crate::messenger::Messenger;
use crate::preview::{self, MEDIA_GROUP_LIMIT, caption_trim};
use crate::publisher::{EMPTY_POST_PLACEHOLDER, send_album};
use crate::tokens::TokenRegistry;

/// Counters from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub presented: usize,
    /// Folders skipped because they were already presented.
    pub already_presented: usize,
    pub failed: usize,
}

/// Discovers post folders under the posts root and presents them to the admin.
pub struct ScanEngine {
    root: PathBuf,
    admin_chat: ChatId,
    images: ImageFilter,
    tokens: Arc<TokenRegistry>,
    messenger: Arc<dyn Messenger>,
}

impl ScanEngine {
    pub fn new(
        root: PathBuf,
        admin_chat: ChatId,
        images: ImageFilter,
        tokens: Arc<TokenRegistry>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            root,
            admin_chat,
            images,
            tokens,
            messenger,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registry the engine issues tokens into.
    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// Run one sweep. Only a failure to list the root is an error.
    pub async fn scan(&self) -> anyhow::Result<ScanReport> {
        let root = self.root.clone();
        let listing = tokio::task::spawn_blocking(move || list_post_folders(&root)).await??;

        let mut report = ScanReport::default();
        for entry in listing {
            if entry.locked || self.tokens.token_for(&entry.path).is_some() {
                report.already_presented += 1;
                continue;
            }
            match self.present(&entry.path).await {
                Ok(_) => report.presented += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(folder = %entry.path.display(), "Failed to present folder: {e:#}");
                }
            }
        }

        if report.presented > 0 || report.failed > 0 {
            info!(
                presented = report.presented,
                skipped = report.already_presented,
                failed = report.failed,
                "Scan finished"
            );
        } else {
            debug!(skipped = report.already_presented, "Scan found nothing new");
        }
        Ok(report)
    }

    /// Present one folder for approval and mark it. Returns the fresh token.
    ///
    /// A marker that cannot be written is logged; the folder may then be
    /// presented again by a later sweep.
    pub async fn present(&self, path: &Path) -> anyhow::Result<String> {
        let post = self.load(path).await?;
        let token = self.tokens.issue(&post.path);

        if let Err(e) = self.send_preview(&post, &token).await {
            self.tokens.remove(&token);
            return Err(e);
        }

        if let Err(e) = folder::write_lock(&post.path, &token) {
            warn!(folder = %post.path.display(), "Failed to write lock marker: {e}");
        }
        debug!(folder = %post.path.display(), token, "Folder presented");
        Ok(token)
    }

    /// Load a folder off the async runtime.
    pub async fn load(&self, path: &Path) -> anyhow::Result<PostFolder> {
        let path = path.to_path_buf();
        let filter = self.images.clone();
        let post = tokio::task::spawn_blocking(move || PostFolder::load(&path, &filter)).await??;
        Ok(post)
    }

    /// Send the image preview of `post` to the admin, followed by `card`.
    pub async fn send_card(
        &self,
        post: &PostFolder,
        card: OutgoingText,
    ) -> anyhow::Result<()> {
        self.send_media_preview(post).await?;
        self.messenger.send_text(&self.admin_chat, card).await?;
        Ok(())
    }

    async fn send_preview(&self, post: &PostFolder, token: &str) -> anyhow::Result<()> {
        let card = OutgoingText::html(preview::render_card(post))
            .with_keyboard(preview::approval_keyboard(token));
        self.send_card(post, card).await
    }

    async fn send_media_preview(&self, post: &PostFolder) -> anyhow::Result<()> {
        let caption = caption_trim(&post.caption());
        let sent = send_album(
            self.messenger.as_ref(),
            &self.admin_chat,
            &post.images,
            &caption,
            MEDIA_GROUP_LIMIT,
        )
        .await?;
        if sent == 0 {
            let text = if caption.is_empty() {
                EMPTY_POST_PLACEHOLDER.to_string()
            } else {
                caption
            };
            self.messenger
                .send_text(&self.admin_chat, OutgoingText::plain(text))
                .await?;
        }
        Ok(())
    }
}

struct Listed {
    path: PathBuf,
    locked: bool,
}

/// Post folders directly under `root`, sorted case-insensitively by name.
fn list_post_folders(root: &Path) -> io::Result<Vec<Listed>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort_by_cached_key(|p| folder::folder_name(p).to_lowercase());

    Ok(entries
        .into_iter()
        .filter(|p| folder::is_post_folder(p))
        .map(|path| Listed {
            locked: folder::is_locked(&path),
            path,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::{LOCK_FILE, META_FILE};
    use crate::testing::RecordingMessenger;
    use std::fs;

    const ADMIN: i64 = 42;

    fn engine(root: &Path, messenger: Arc<RecordingMessenger>) -> (ScanEngine, Arc<TokenRegistry>) {
        let tokens = Arc::new(TokenRegistry::new());
        let engine = ScanEngine::new(
            root.to_path_buf(),
            ChatId::Id(ADMIN),
            ImageFilter::default(),
            tokens.clone(),
            messenger,
        );
        (engine, tokens)
    }

    fn make_post(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(META_FILE), r#"{"title": "t"}"#).unwrap();
        fs::write(dir.join("photo.jpg"), b"img").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_scan_presents_and_locks() {
        let root = tempfile::tempdir().unwrap();
        let dir = make_post(root.path(), "post");
        let messenger = Arc::new(RecordingMessenger::new());
        let (engine, tokens) = engine(root.path(), messenger.clone());

        let report = engine.scan().await.unwrap();
        assert_eq!(report.presented, 1);

        let token = fs::read_to_string(dir.join(LOCK_FILE)).unwrap();
        assert_eq!(tokens.lookup(&token), Some(dir.clone()));
        assert_eq!(messenger.media_calls().len(), 1);

        let cards = messenger.sent_texts();
        assert_eq!(cards.len(), 1);
        let keyboard = cards[0].keyboard.clone().unwrap();
        assert!(keyboard.callbacks().any(|c| c == format!("approve:{token}")));
        assert!(cards[0].html);
    }

    #[tokio::test]
    async fn test_folder_without_meta_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("no-meta");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("photo.jpg"), b"img").unwrap();
        fs::write(root.path().join("loose.jpg"), b"img").unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let (engine, tokens) = engine(root.path(), messenger.clone());

        let report = engine.scan().await.unwrap();
        assert_eq!(report, ScanReport::default());
        assert!(!dir.join(LOCK_FILE).exists());
        assert!(messenger.calls().is_empty());
        assert!(tokens.is_empty());
    }

    #[tokio::test]
    async fn test_rescan_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        make_post(root.path(), "post");
        let messenger = Arc::new(RecordingMessenger::new());
        let (engine, tokens) = engine(root.path(), messenger.clone());

        engine.scan().await.unwrap();
        let calls = messenger.calls().len();
        let report = engine.scan().await.unwrap();
        assert_eq!(report.presented, 0);
        assert_eq!(report.already_presented, 1);
        assert_eq!(messenger.calls().len(), calls);
        assert_eq!(tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_locked_folder_skipped_after_restart() {
        let root = tempfile::tempdir().unwrap();
        let dir = make_post(root.path(), "post");
        fs::write(dir.join(LOCK_FILE), "0123456789ab").unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let (engine, tokens) = engine(root.path(), messenger.clone());

        let report = engine.scan().await.unwrap();
        assert_eq!(report.already_presented, 1);
        assert!(tokens.is_empty());
        assert!(messenger.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scan_order_is_case_insensitive() {
        let root = tempfile::tempdir().unwrap();
        for name in ["beta", "Alpha", "gamma"] {
            make_post(root.path(), name);
        }
        let messenger = Arc::new(RecordingMessenger::new());
        let (engine, _) = engine(root.path(), messenger.clone());

        engine.scan().await.unwrap();
        let titles: Vec<_> = messenger
            .sent_texts()
            .iter()
            .map(|m| m.text.lines().next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            titles,
            vec!["📦 <b>Alpha</b>", "📦 <b>beta</b>", "📦 <b>gamma</b>"]
        );
    }

    #[tokio::test]
    async fn test_failed_presentation_leaves_folder_unmarked() {
        let root = tempfile::tempdir().unwrap();
        let dir = make_post(root.path(), "post");
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.fail_sends(true);
        let (engine, tokens) = engine(root.path(), messenger.clone());

        let report = engine.scan().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(!dir.join(LOCK_FILE).exists());
        assert!(tokens.is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_error() {
        let root = tempfile::tempdir().unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let (engine, _) = engine(&root.path().join("gone"), messenger);
        assert!(engine.scan().await.is_err());
    }
}
