//! In-memory [`Messenger`] for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use anyhow::bail;

use postgate_types::{ChatId, InlineKeyboard, MessageRef, OutgoingText};

use crate::messenger::{MediaItem, Messenger};

/// One recorded transport call.
#[derive(Debug, Clone)]
pub enum Call {
    Text {
        chat: ChatId,
        message: OutgoingText,
    },
    Media {
        chat: ChatId,
        items: Vec<MediaItem>,
    },
    Edit {
        target: MessageRef,
        message: OutgoingText,
    },
    EditKeyboard {
        target: MessageRef,
        keyboard: Option<InlineKeyboard>,
    },
    Answer {
        action_id: String,
        text: Option<String>,
    },
}

/// Records every call; sends can be switched to fail.
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    calls: Mutex<Vec<Call>>,
    fail_sends: AtomicBool,
    next_id: AtomicI64,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `send_text` and `send_media_group` return errors.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Albums sent, as `(chat, [(file name, caption)])`.
    pub fn media_calls(&self) -> Vec<(ChatId, Vec<(String, Option<String>)>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Media { chat, items } => Some((
                    chat,
                    items
                        .into_iter()
                        .map(|item| (item.file_name, item.caption))
                        .collect(),
                )),
                _ => None,
            })
            .collect()
    }

    pub fn sent_texts(&self) -> Vec<OutgoingText> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Text { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Bodies of sent text messages.
    pub fn texts(&self) -> Vec<String> {
        self.sent_texts().into_iter().map(|m| m.text).collect()
    }

    pub fn edits(&self) -> Vec<OutgoingText> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Edit { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Toast texts of acknowledged actions.
    pub fn answers(&self) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Answer { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, chat: &ChatId, message: OutgoingText) -> anyhow::Result<MessageRef> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("send_text failed");
        }
        self.record(Call::Text {
            chat: chat.clone(),
            message,
        });
        Ok(MessageRef {
            chat: chat.clone(),
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    async fn send_media_group(&self, chat: &ChatId, media: Vec<MediaItem>) -> anyhow::Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("send_media_group failed");
        }
        self.record(Call::Media {
            chat: chat.clone(),
            items: media,
        });
        Ok(())
    }

    async fn edit_text(&self, target: &MessageRef, message: OutgoingText) -> anyhow::Result<()> {
        self.record(Call::Edit {
            target: target.clone(),
            message,
        });
        Ok(())
    }

    async fn edit_keyboard(
        &self,
        target: &MessageRef,
        keyboard: Option<InlineKeyboard>,
    ) -> anyhow::Result<()> {
        self.record(Call::EditKeyboard {
            target: target.clone(),
            keyboard,
        });
        Ok(())
    }

    async fn answer_action(&self, action_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        self.record(Call::Answer {
            action_id: action_id.to_string(),
            text: text.map(String::from),
        });
        Ok(())
    }
}
