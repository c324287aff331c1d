//! Publishing a folder to the channel, then deleting it.
//!
//! Publishing is two steps and not atomic: a failed send leaves the folder
//! in place, and a failed delete after a successful send is only reported.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use postgate_types::{ChatId, OutgoingText};

use crate::folder::{ImageFilter, PostFolder, folder_name};
use crate::messenger::{MediaItem, Messenger};
use crate::preview::{MEDIA_GROUP_LIMIT, caption_trim};

/// Text sent instead of an empty caption when there are no images.
pub const EMPTY_POST_PLACEHOLDER: &str = "(no images)";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("cannot read post folder {}: {source}", path.display())]
    Folder { path: PathBuf, source: io::Error },
    #[error("send failed: {0:#}")]
    Send(anyhow::Error),
}

/// Result of a publish whose send step succeeded.
#[derive(Debug)]
pub enum PublishOutcome {
    /// Sent and the folder was removed.
    Published,
    /// Sent, but the folder could not be removed.
    NotDeleted(io::Error),
}

/// Send `images` as albums of at most `group_limit`, captioning only the
/// first image of the first album. Unreadable images are skipped.
///
/// Returns the number of albums sent.
pub async fn send_album(
    messenger: &dyn Messenger,
    chat: &ChatId,
    images: &[PathBuf],
    caption: &str,
    group_limit: usize,
) -> anyhow::Result<usize> {
    let mut caption = (!caption.is_empty()).then(|| caption.to_string());
    let mut sent = 0;

    for chunk in images.chunks(group_limit.max(1)) {
        let mut media = Vec::with_capacity(chunk.len());
        for path in chunk {
            match tokio::fs::read(path).await {
                Ok(data) => media.push(MediaItem {
                    file_name: folder_name(path),
                    data,
                    caption: caption.take(),
                }),
                Err(e) => warn!(image = %path.display(), "Cannot open image: {e}"),
            }
        }
        if media.is_empty() {
            continue;
        }
        messenger.send_media_group(chat, media).await?;
        sent += 1;
        // Only the first album may carry the caption.
        caption = None;
    }

    Ok(sent)
}

/// Removes a published folder from disk.
pub type RemoveDir = fn(&Path) -> io::Result<()>;

/// Publishes post folders to a channel.
pub struct ChannelPublisher {
    messenger: Arc<dyn Messenger>,
    images: ImageFilter,
    group_limit: usize,
    remove_dir: RemoveDir,
}

impl ChannelPublisher {
    pub fn new(messenger: Arc<dyn Messenger>, images: ImageFilter) -> Self {
        Self {
            messenger,
            images,
            group_limit: MEDIA_GROUP_LIMIT,
            remove_dir: |path| std::fs::remove_dir_all(path),
        }
    }

    pub fn with_group_limit(mut self, group_limit: usize) -> Self {
        self.group_limit = group_limit;
        self
    }

    /// Replace how published folders are deleted.
    pub fn with_remove_dir(mut self, remove_dir: RemoveDir) -> Self {
        self.remove_dir = remove_dir;
        self
    }

    /// Publish with the caption taken from the folder itself.
    pub async fn publish_folder(
        &self,
        folder: &Path,
        channel: &ChatId,
    ) -> Result<PublishOutcome, PublishError> {
        let post = self.load(folder).await?;
        self.send_and_delete(&post.path, &post.images, channel, &post.caption())
            .await
    }

    /// Publish `folder` with an explicit caption.
    pub async fn publish(
        &self,
        folder: &Path,
        channel: &ChatId,
        caption: &str,
    ) -> Result<PublishOutcome, PublishError> {
        let post = self.load(folder).await?;
        self.send_and_delete(&post.path, &post.images, channel, caption)
            .await
    }

    async fn load(&self, folder: &Path) -> Result<PostFolder, PublishError> {
        let path = folder.to_path_buf();
        let filter = self.images.clone();
        let loaded = tokio::task::spawn_blocking(move || PostFolder::load(&path, &filter))
            .await
            .map_err(|e| io::Error::other(e.to_string()))
            .and_then(|r| r);
        loaded.map_err(|source| PublishError::Folder {
            path: folder.to_path_buf(),
            source,
        })
    }

    async fn send_and_delete(
        &self,
        folder: &Path,
        images: &[PathBuf],
        channel: &ChatId,
        caption: &str,
    ) -> Result<PublishOutcome, PublishError> {
        let caption = caption_trim(caption);

        let albums = if images.is_empty() {
            0
        } else {
            send_album(
                self.messenger.as_ref(),
                channel,
                images,
                &caption,
                self.group_limit,
            )
            .await
            .map_err(PublishError::Send)?
        };

        if albums == 0 {
            if !images.is_empty() {
                warn!(folder = %folder.display(), "No readable images, publishing caption only");
            }
            let text = if caption.is_empty() {
                EMPTY_POST_PLACEHOLDER.to_string()
            } else {
                caption
            };
            self.messenger
                .send_text(channel, OutgoingText::plain(text))
                .await
                .map_err(PublishError::Send)?;
        }

        info!(folder = %folder.display(), %channel, albums, "Post published");

        let remove_dir = self.remove_dir;
        let path = folder.to_path_buf();
        let removed = tokio::task::spawn_blocking(move || remove_dir(&path))
            .await
            .map_err(|e| io::Error::other(e.to_string()))
            .and_then(|r| r);
        match removed {
            Ok(()) => Ok(PublishOutcome::Published),
            Err(e) => {
                warn!(folder = %folder.display(), "Published but failed to delete folder: {e}");
                Ok(PublishOutcome::NotDeleted(e))
            }
        }
    }
}
