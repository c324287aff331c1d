use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ──────────────────── Chat Types ────────────────────

/// A chat or channel address: a numeric id (`-100123…`) or an `@handle`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Handle(String),
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Id(id) => write!(f, "{id}"),
            ChatId::Handle(handle) => f.write_str(handle),
        }
    }
}

impl FromStr for ChatId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<i64>() {
            Ok(id) => ChatId::Id(id),
            Err(_) => ChatId::Handle(s.to_string()),
        })
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        ChatId::Id(id)
    }
}

/// Reference to a message already delivered to a chat, used for edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat: ChatId,
    pub message_id: i64,
}

// ──────────────────── Outgoing Types ────────────────────

/// A single inline button carrying an `action:key[:extra]` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of inline buttons attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    #[serde(rename = "inline_keyboard")]
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Iterate over every callback payload, row by row.
    pub fn callbacks(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.callback_data.as_str())
    }
}

/// Text message to send or to replace an existing message with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingText {
    pub text: String,
    /// Render `text` as HTML (`<b>`, `<code>`); plain text otherwise.
    pub html: bool,
    pub keyboard: Option<InlineKeyboard>,
}

impl OutgoingText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: false,
            keyboard: None,
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: true,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

// ──────────────────── Inbound Types ────────────────────

/// Event delivered by the chat transport to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A `/command arg…` message.
    Command {
        sender_id: i64,
        chat_id: i64,
        command: String,
        args: Vec<String>,
    },
    /// A plain text message (used for date input).
    Text {
        sender_id: i64,
        chat_id: i64,
        text: String,
    },
    /// An inline button press.
    Action {
        sender_id: i64,
        /// Transport id used to acknowledge the press.
        action_id: String,
        data: String,
        /// The message carrying the pressed button, when still accessible.
        message: Option<MessageRef>,
    },
}

impl InboundEvent {
    pub fn sender_id(&self) -> i64 {
        match self {
            InboundEvent::Command { sender_id, .. }
            | InboundEvent::Text { sender_id, .. }
            | InboundEvent::Action { sender_id, .. } => *sender_id,
        }
    }

    /// Split a `/command@bot arg1 arg2` string into command name and args.
    pub fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?.strip_prefix('/')?;
        let command = head.split('@').next().unwrap_or("");
        if command.is_empty() {
            return None;
        }
        Some((command.to_string(), parts.map(String::from).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_untagged_serde() {
        let id: ChatId = serde_json::from_str("-1001234").unwrap();
        assert_eq!(id, ChatId::Id(-1001234));
        let handle: ChatId = serde_json::from_str("\"@my_channel\"").unwrap();
        assert_eq!(handle, ChatId::Handle("@my_channel".into()));
        assert_eq!(serde_json::to_string(&ChatId::Id(42)).unwrap(), "42");
    }

    #[test]
    fn test_chat_id_from_str() {
        assert_eq!("-100".parse::<ChatId>().unwrap(), ChatId::Id(-100));
        assert_eq!(
            " @chan ".parse::<ChatId>().unwrap(),
            ChatId::Handle("@chan".into())
        );
        assert_eq!(ChatId::Handle("@chan".into()).to_string(), "@chan");
    }

    #[test]
    fn test_keyboard_wire_shape() {
        let kb = InlineKeyboard::new(vec![vec![InlineButton::new("Go", "approve:abc")]]);
        let json = serde_json::to_value(&kb).unwrap();
        assert_eq!(json["inline_keyboard"][0][0]["callback_data"], "approve:abc");
        assert_eq!(kb.callbacks().collect::<Vec<_>>(), vec!["approve:abc"]);
    }

    #[test]
    fn test_parse_command() {
        let (cmd, args) = InboundEvent::parse_command("/view_job@postbot abc123").unwrap();
        assert_eq!(cmd, "view_job");
        assert_eq!(args, vec!["abc123".to_string()]);
        assert!(InboundEvent::parse_command("hello").is_none());
        assert!(InboundEvent::parse_command("/").is_none());
    }
}
