//! Telegram Bot API HTTP client.

use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;

use postgate_posts::MediaItem;
use postgate_types::ChatId;

use crate::types::{
    AnswerCallbackQueryParams, ApiResponse, BotInfo, EditMessageReplyMarkupParams,
    EditMessageTextParams, GetUpdatesParams, InputMediaPhoto, SendMessageParams,
    SetMyCommandsParams, TgMessage, Update,
};

const API_BASE: &str = "https://api.telegram.org";

/// HTTP client for the Telegram Bot API.
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    /// Create a new API client with the given bot token.
    pub fn new(bot_token: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("{API_BASE}/bot{bot_token}"),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    /// POST `params` as JSON to `method` and unwrap the response envelope.
    async fn call<P, R>(&self, method: &str, params: &P) -> anyhow::Result<Option<R>>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp: ApiResponse<R> = self
            .client
            .post(self.url(method))
            .json(params)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?
            .json()
            .await
            .with_context(|| format!("{method} response parse failed"))?;
        resp.into_result(method)
    }

    /// Verify the bot token by calling `getMe`.
    pub async fn get_me(&self) -> anyhow::Result<BotInfo> {
        let resp: ApiResponse<BotInfo> = self
            .client
            .get(self.url("getMe"))
            .send()
            .await
            .context("getMe request failed")?
            .json()
            .await
            .context("getMe response parse failed")?;
        resp.into_result("getMe")?
            .context("getMe returned no result")
    }

    /// Long-poll for updates.
    pub async fn get_updates(&self, params: &GetUpdatesParams) -> anyhow::Result<Vec<Update>> {
        Ok(self
            .call::<_, Vec<Update>>("getUpdates", params)
            .await?
            .unwrap_or_default())
    }

    /// Send a text message.
    pub async fn send_message(&self, params: &SendMessageParams) -> anyhow::Result<TgMessage> {
        self.call("sendMessage", params)
            .await?
            .context("sendMessage returned no result")
    }

    /// Upload images as one album.
    pub async fn send_media_group(
        &self,
        chat_id: &ChatId,
        media: Vec<MediaItem>,
    ) -> anyhow::Result<Vec<TgMessage>> {
        let mut entries = Vec::with_capacity(media.len());
        let mut form = Form::new().text("chat_id", chat_id.to_string());

        for (i, item) in media.into_iter().enumerate() {
            let part_name = format!("file{i}");
            entries.push(InputMediaPhoto::attached(&part_name, item.caption));
            form = form.part(part_name, Part::bytes(item.data).file_name(item.file_name));
        }
        let entries = serde_json::to_string(&entries).context("media encode failed")?;
        form = form.text("media", entries);

        let resp: ApiResponse<Vec<TgMessage>> = self
            .client
            .post(self.url("sendMediaGroup"))
            .multipart(form)
            .send()
            .await
            .context("sendMediaGroup request failed")?
            .json()
            .await
            .context("sendMediaGroup response parse failed")?;
        Ok(resp.into_result("sendMediaGroup")?.unwrap_or_default())
    }

    /// Edit an existing message's text.
    pub async fn edit_message_text(&self, params: &EditMessageTextParams) -> anyhow::Result<()> {
        // Result is the edited message, or `true` for inline messages.
        self.call::<_, serde_json::Value>("editMessageText", params)
            .await?;
        Ok(())
    }

    pub async fn edit_message_reply_markup(
        &self,
        params: &EditMessageReplyMarkupParams,
    ) -> anyhow::Result<()> {
        self.call::<_, serde_json::Value>("editMessageReplyMarkup", params)
            .await?;
        Ok(())
    }

    /// Acknowledge a callback query so the client stops its spinner.
    pub async fn answer_callback_query(
        &self,
        params: &AnswerCallbackQueryParams,
    ) -> anyhow::Result<()> {
        self.call::<_, bool>("answerCallbackQuery", params).await?;
        Ok(())
    }

    /// Register bot commands in the menu.
    pub async fn set_my_commands(&self, params: &SetMyCommandsParams) -> anyhow::Result<()> {
        self.call::<_, bool>("setMyCommands", params).await?;
        Ok(())
    }
}
