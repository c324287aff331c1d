//! Inline button payloads, encoded as `action:key[:extra]`.

use crate::tokens::is_token;

/// An interactive action bound to a token or a job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Show the publish/schedule choices for a presented folder.
    Approve(String),
    /// Dismiss a presented folder until the next scan.
    Skip(String),
    PublishNow(String),
    /// Same as `Approve`, offered on an already scheduled item.
    Schedule(String),
    ScheduleIn { token: String, secs: u64 },
    /// Wait for a typed `YYYY-MM-DD HH:MM`.
    ScheduleInput(String),
    /// Close the schedule choices without doing anything.
    Cancel(String),
    CancelJob(String),
    ViewJob(String),
}

impl Action {
    pub fn encode(&self) -> String {
        match self {
            Action::Approve(t) => format!("approve:{t}"),
            Action::Skip(t) => format!("skip:{t}"),
            Action::PublishNow(t) => format!("publish_now:{t}"),
            Action::Schedule(t) => format!("schedule:{t}"),
            Action::ScheduleIn { token, secs } => format!("schedule_in:{token}:{secs}"),
            Action::ScheduleInput(t) => format!("schedule_input:{t}"),
            Action::Cancel(t) => format!("cancel:{t}"),
            Action::CancelJob(id) => format!("cancel_job:{id}"),
            Action::ViewJob(id) => format!("view_job:{id}"),
        }
    }

    /// Decode a payload. Anything malformed yields `None`.
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, ':');
        let action = parts.next()?;
        let key = parts.next()?;
        let extra = parts.next();

        let token = || is_token(key).then(|| key.to_string());
        let job_id = || is_job_id(key).then(|| key.to_string());

        match (action, extra) {
            ("approve", None) => token().map(Action::Approve),
            ("skip", None) => token().map(Action::Skip),
            ("publish_now", None) => token().map(Action::PublishNow),
            ("schedule", None) => token().map(Action::Schedule),
            ("schedule_input", None) => token().map(Action::ScheduleInput),
            ("cancel", None) => token().map(Action::Cancel),
            ("schedule_in", Some(secs)) => Some(Action::ScheduleIn {
                token: token()?,
                secs: parse_digits(secs)?,
            }),
            ("cancel_job", None) => job_id().map(Action::CancelJob),
            ("view_job", None) => job_id().map(Action::ViewJob),
            _ => None,
        }
    }

    /// The approval token, for token-keyed actions.
    pub fn token(&self) -> Option<&str> {
        match self {
            Action::Approve(t)
            | Action::Skip(t)
            | Action::PublishNow(t)
            | Action::Schedule(t)
            | Action::ScheduleInput(t)
            | Action::Cancel(t)
            | Action::ScheduleIn { token: t, .. } => Some(t),
            Action::CancelJob(_) | Action::ViewJob(_) => None,
        }
    }
}

fn is_job_id(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
