//! The chat transport as seen by the publishing core.

use postgate_types::{ChatId, InlineKeyboard, MessageRef, OutgoingText};

/// One image of a media group.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub file_name: String,
    pub data: Vec<u8>,
    /// Plain-text caption; set on the first item of an album only.
    pub caption: Option<String>,
}

/// Sends and edits chat messages.
///
/// Implementations are shared across tasks, so every method takes `&self`.
#[async_trait::async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text message, returning a reference usable for later edits.
    async fn send_text(&self, chat: &ChatId, message: OutgoingText) -> anyhow::Result<MessageRef>;

    /// Send images as one album.
    async fn send_media_group(&self, chat: &ChatId, media: Vec<MediaItem>) -> anyhow::Result<()>;

    /// Replace the text (and keyboard) of a sent message.
    async fn edit_text(&self, target: &MessageRef, message: OutgoingText) -> anyhow::Result<()>;

    /// Replace or remove only the keyboard of a sent message.
    async fn edit_keyboard(
        &self,
        target: &MessageRef,
        keyboard: Option<InlineKeyboard>,
    ) -> anyhow::Result<()>;

    /// Acknowledge a button press, optionally with a short toast.
    async fn answer_action(&self, action_id: &str, text: Option<&str>) -> anyhow::Result<()>;
}
