//! Telegram Bot API types (the subset the bot uses).

use serde::{Deserialize, Serialize};

use postgate_types::{ChatId, InlineKeyboard};

/// Generic Telegram API response wrapper.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Turn a failed response into an error naming `method`.
    pub fn into_result(self, method: &str) -> anyhow::Result<Option<T>> {
        if !self.ok {
            anyhow::bail!(
                "{method} failed: {}",
                self.description.unwrap_or_else(|| "unknown error".into())
            );
        }
        Ok(self.result)
    }
}

/// Bot identity returned by `getMe`.
#[derive(Debug, Deserialize)]
pub struct BotInfo {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// A Telegram Update object.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// A Telegram message.
#[derive(Debug, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
}

/// A message entity (bold, command, mention, etc.).
#[derive(Debug, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub offset: i64,
    pub length: i64,
}

/// A Telegram user.
#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// A Telegram chat.
#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub chat_type: String,
}

/// An inline button press.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// Absent when the message is too old for the bot to see.
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Parameters for `getUpdates`.
#[derive(Debug, Serialize)]
pub struct GetUpdatesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_updates: Option<Vec<String>>,
}

/// Parameters for `sendMessage`.
#[derive(Debug, Serialize)]
pub struct SendMessageParams {
    pub chat_id: ChatId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboard>,
}

/// Parameters for `editMessageText`.
#[derive(Debug, Serialize)]
pub struct EditMessageTextParams {
    pub chat_id: ChatId,
    pub message_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboard>,
}

/// Parameters for `editMessageReplyMarkup`. No markup removes the keyboard.
#[derive(Debug, Serialize)]
pub struct EditMessageReplyMarkupParams {
    pub chat_id: ChatId,
    pub message_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboard>,
}

/// Parameters for `answerCallbackQuery`.
#[derive(Debug, Serialize)]
pub struct AnswerCallbackQueryParams {
    pub callback_query_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One entry of the `media` array of `sendMediaGroup`.
#[derive(Debug, Serialize)]
pub struct InputMediaPhoto {
    #[serde(rename = "type")]
    pub media_type: &'static str,
    /// `attach://<part name>` of an uploaded multipart field.
    pub media: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl InputMediaPhoto {
    pub fn attached(part: &str, caption: Option<String>) -> Self {
        Self {
            media_type: "photo",
            media: format!("attach://{part}"),
            caption,
        }
    }
}

/// A bot command for `setMyCommands`.
#[derive(Debug, Serialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

/// Parameters for `setMyCommands`.
#[derive(Debug, Serialize)]
pub struct SetMyCommandsParams {
    pub commands: Vec<BotCommand>,
}
