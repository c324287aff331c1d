//! Rendering of preview cards, captions and inline keyboards.

use serde_json::Value;

use postgate_types::{InlineButton, InlineKeyboard};

use crate::action::Action;
use crate::folder::{DESCRIPTION_FILE, PostFolder};

/// Longest caption the channel accepts, in characters.
pub const MAX_CAPTION: usize = 1024;
/// Most images a single media group may carry.
pub const MEDIA_GROUP_LIMIT: usize = 10;
/// Description characters shown on a preview card.
pub const DESCRIPTION_PREVIEW: usize = 500;

/// Trim and cut `text` to [`MAX_CAPTION`] characters, ending in `…` when cut.
pub fn caption_trim(text: &str) -> String {
    truncate_chars(text.trim(), MAX_CAPTION)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Human-readable form of a metadata value; lists are comma-joined.
pub fn meta_value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(meta_value_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// HTML card: folder name, metadata pairs, and a shortened description.
pub fn render_card(post: &PostFolder) -> String {
    let mut lines = vec![format!("📦 <b>{}</b>", html_escape(&post.name))];
    for (key, value) in &post.meta {
        lines.push(format!(
            "<b>{}:</b> {}",
            html_escape(key),
            html_escape(&meta_value_text(value))
        ));
    }
    if let Some(desc) = &post.description {
        let short = if desc.chars().count() > DESCRIPTION_PREVIEW {
            let mut s: String = desc.chars().take(DESCRIPTION_PREVIEW).collect();
            s.push('…');
            s
        } else {
            desc.clone()
        };
        lines.push(String::new());
        lines.push(format!("<b>{DESCRIPTION_FILE}</b>:"));
        lines.push(html_escape(&short));
    }
    lines.join("\n")
}

fn button(text: &str, action: Action) -> InlineButton {
    InlineButton::new(text, action.encode())
}

/// Buttons under a freshly presented folder.
pub fn approval_keyboard(token: &str) -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![button("✅ Approve", Action::Approve(token.into()))],
        vec![button("⏭️ Skip", Action::Skip(token.into()))],
    ])
}

/// Publish-now and scheduling choices.
pub fn schedule_keyboard(token: &str) -> InlineKeyboard {
    let delay = |label: &str, secs: u64| {
        button(
            label,
            Action::ScheduleIn {
                token: token.into(),
                secs,
            },
        )
    };
    InlineKeyboard::new(vec![
        vec![button("🟢 Publish now", Action::PublishNow(token.into()))],
        vec![
            delay("⏱ +15 min", 900),
            delay("⏱ +1 h", 3600),
            delay("⏱ +3 h", 10800),
        ],
        vec![button(
            "📅 Enter date/time",
            Action::ScheduleInput(token.into()),
        )],
        vec![button("✖️ Cancel", Action::Cancel(token.into()))],
    ])
}

/// Buttons under a scheduled item opened for viewing.
pub fn scheduled_item_keyboard(token: &str, job_id: &str) -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![button("🟢 Publish now", Action::PublishNow(token.into()))],
        vec![button("⏱ Reschedule", Action::Schedule(token.into()))],
        vec![button("❌ Cancel job", Action::CancelJob(job_id.into()))],
    ])
}
