//! Telegram long-polling loop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use postgate_types::{ChatId, InboundEvent, MessageRef};

use crate::api::TelegramApi;
use crate::types::{GetUpdatesParams, TgMessage, Update};

/// Convert one update into an event. Updates the bot does not act on
/// (stickers, edits, buttons without data) yield `None`.
pub fn update_to_event(update: Update) -> Option<InboundEvent> {
    if let Some(query) = update.callback_query {
        let data = query.data?;
        return Some(InboundEvent::Action {
            sender_id: query.from.id,
            action_id: query.id,
            data,
            message: query.message.map(|m| MessageRef {
                chat: ChatId::Id(m.chat.id),
                message_id: m.message_id,
            }),
        });
    }

    let msg = update.message?;
    let sender_id = msg.from.as_ref().map_or(msg.chat.id, |u| u.id);
    let chat_id = msg.chat.id;
    let is_command = is_command(&msg);
    let text = msg.text?;

    if is_command && let Some((command, args)) = InboundEvent::parse_command(&text) {
        return Some(InboundEvent::Command {
            sender_id,
            chat_id,
            command,
            args,
        });
    }
    Some(InboundEvent::Text {
        sender_id,
        chat_id,
        text,
    })
}

/// Bot command entity at offset 0.
fn is_command(msg: &TgMessage) -> bool {
    msg.entities
        .iter()
        .any(|e| e.entity_type == "bot_command" && e.offset == 0)
}

/// Run the long-polling loop, forwarding updates as [`InboundEvent`]s.
///
/// Exits when `cancel` is cancelled or the `sender` is closed.
pub async fn run_polling_loop(
    api: &TelegramApi,
    sender: mpsc::Sender<InboundEvent>,
    cancel: CancellationToken,
) {
    let mut offset: Option<i64> = None;
    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(30);

    info!("Telegram polling loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let params = GetUpdatesParams {
            offset,
            timeout: Some(30),
            allowed_updates: Some(vec!["message".into(), "callback_query".into()]),
        };

        let updates = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.get_updates(&params) => result,
        };

        match updates {
            Ok(updates) => {
                backoff = Duration::from_secs(1);

                for update in updates {
                    let update_id = update.update_id;
                    offset = Some(update_id + 1);

                    let Some(event) = update_to_event(update) else {
                        continue;
                    };

                    debug!(update_id, "Forwarding Telegram update");
                    if sender.send(event).await.is_err() {
                        info!("Inbound channel closed, stopping polling");
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(backoff_secs = backoff.as_secs(), "getUpdates error: {e:#}");

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {},
                }

                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }

    info!("Telegram polling loop stopped");
}
