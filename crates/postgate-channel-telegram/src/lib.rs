//! Telegram Bot transport for postgate.
//!
//! Uses the Bot API with long-polling (no webhook required). Text is sent
//! with `parse_mode=HTML` when the outgoing message asks for it.

pub mod api;
pub mod polling;
pub mod types;

use std::sync::Arc;

use anyhow::bail;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use postgate_gateway::channel::{ChannelPlugin, ChannelStatus};
use postgate_posts::{MediaItem, Messenger};
use postgate_types::{ChatId, InboundEvent, InlineKeyboard, MessageRef, OutgoingText};

use api::TelegramApi;
use types::{
    AnswerCallbackQueryParams, BotCommand, EditMessageReplyMarkupParams, EditMessageTextParams,
    SendMessageParams, SetMyCommandsParams,
};

fn parse_mode(message: &OutgoingText) -> Option<String> {
    message.html.then(|| "HTML".to_string())
}

/// [`Messenger`] over the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramMessenger {
    api: Arc<TelegramApi>,
}

impl TelegramMessenger {
    pub fn new(api: Arc<TelegramApi>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat: &ChatId, message: OutgoingText) -> anyhow::Result<MessageRef> {
        let sent = self
            .api
            .send_message(&SendMessageParams {
                chat_id: chat.clone(),
                parse_mode: parse_mode(&message),
                text: message.text,
                reply_markup: message.keyboard,
            })
            .await?;
        Ok(MessageRef {
            chat: ChatId::Id(sent.chat.id),
            message_id: sent.message_id,
        })
    }

    async fn send_media_group(&self, chat: &ChatId, media: Vec<MediaItem>) -> anyhow::Result<()> {
        self.api.send_media_group(chat, media).await?;
        Ok(())
    }

    async fn edit_text(&self, target: &MessageRef, message: OutgoingText) -> anyhow::Result<()> {
        self.api
            .edit_message_text(&EditMessageTextParams {
                chat_id: target.chat.clone(),
                message_id: target.message_id,
                parse_mode: parse_mode(&message),
                text: message.text,
                reply_markup: message.keyboard,
            })
            .await
    }

    async fn edit_keyboard(
        &self,
        target: &MessageRef,
        keyboard: Option<InlineKeyboard>,
    ) -> anyhow::Result<()> {
        self.api
            .edit_message_reply_markup(&EditMessageReplyMarkupParams {
                chat_id: target.chat.clone(),
                message_id: target.message_id,
                reply_markup: keyboard,
            })
            .await
    }

    async fn answer_action(&self, action_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        self.api
            .answer_callback_query(&AnswerCallbackQueryParams {
                callback_query_id: action_id.to_string(),
                text: text.map(String::from),
            })
            .await
    }
}

/// Telegram channel plugin implementing `ChannelPlugin`.
pub struct TelegramChannel {
    api: Arc<TelegramApi>,
    state: Mutex<TelegramState>,
}

struct TelegramState {
    status: ChannelStatus,
    cancel: Option<CancellationToken>,
    poll_handle: Option<JoinHandle<()>>,
}

impl TelegramChannel {
    pub fn new(bot_token: &str) -> anyhow::Result<Self> {
        Ok(Self {
            api: Arc::new(TelegramApi::new(bot_token)?),
            state: Mutex::new(TelegramState {
                status: ChannelStatus::Stopped,
                cancel: None,
                poll_handle: None,
            }),
        })
    }
}

#[async_trait::async_trait]
impl ChannelPlugin for TelegramChannel {
    fn channel_type(&self) -> &str {
        "telegram"
    }

    async fn start(&self, sender: mpsc::Sender<InboundEvent>) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.status == ChannelStatus::Running {
            bail!("Telegram channel is already running");
        }

        state.status = ChannelStatus::Starting;

        // Verify bot token
        match self.api.get_me().await {
            Ok(bot) => {
                info!(
                    bot_username = bot.username.as_deref().unwrap_or("unknown"),
                    "Telegram bot authenticated"
                );
            }
            Err(e) => {
                state.status = ChannelStatus::Error(format!("Auth failed: {e}"));
                bail!("Failed to authenticate Telegram bot: {e:#}");
            }
        }

        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();
        let api = self.api.clone();

        let handle = tokio::spawn(async move {
            polling::run_polling_loop(&api, sender, cancel_child).await;
        });

        state.cancel = Some(cancel);
        state.poll_handle = Some(handle);
        state.status = ChannelStatus::Running;

        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;

        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }

        if let Some(handle) = state.poll_handle.take() {
            let _ = handle.await;
        }

        state.status = ChannelStatus::Stopped;
        Ok(())
    }

    fn messenger(&self) -> Arc<dyn Messenger> {
        Arc::new(TelegramMessenger::new(self.api.clone()))
    }

    fn status(&self) -> ChannelStatus {
        match self.state.try_lock() {
            Ok(state) => state.status.clone(),
            Err(_) => ChannelStatus::Starting,
        }
    }

    async fn register_commands(&self, commands: &[(&str, &str)]) -> anyhow::Result<()> {
        let commands = commands
            .iter()
            .map(|(command, description)| BotCommand {
                command: command.to_string(),
                description: description.to_string(),
            })
            .collect();
        self.api
            .set_my_commands(&SetMyCommandsParams { commands })
            .await
    }
}
