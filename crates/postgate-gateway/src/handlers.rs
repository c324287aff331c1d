//! Command, text and button handlers.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use postgate_cron::ScheduleError;
use postgate_posts::folder::{self, folder_name};
use postgate_posts::preview::{self, html_escape};
use postgate_posts::{Action, PublishError, PublishOutcome};
use postgate_types::{ChatId, InlineButton, InlineKeyboard, MessageRef, OutgoingText};

use crate::scan_loop::BOOT_SCAN_DELAY;
use crate::{Gateway, PendingInput};

/// Longest job list `/view_jobs` prints.
const JOB_LIST_LIMIT: usize = 50;

const STALE_BUTTON: &str = "Button is stale — run /scan again";
const FOLDER_UNAVAILABLE: &str = "Folder unavailable";

/// Commands shown in the client menu.
pub const COMMANDS: &[(&str, &str)] = &[
    ("start", "Greeting and current settings"),
    ("help", "How the bot works"),
    ("scan", "Scan the posts folder now"),
    ("start_scan", "Start a periodic scan"),
    ("stop_scan", "Stop a periodic scan by task id"),
    ("view_jobs", "List scheduled publications"),
    ("view_job", "Open one scheduled publication"),
    ("cancel", "Abandon date input"),
    ("prune", "Drop scheduled jobs whose folder is gone"),
];

// ──────────────────── Commands ────────────────────

/// Route a `/command` to its handler.
pub async fn handle_command(
    gw: &Gateway,
    sender_id: i64,
    chat: ChatId,
    command: &str,
    args: &[String],
) -> anyhow::Result<()> {
    match command {
        "start" => handle_start(gw, &chat).await,
        "help" => handle_help(gw, &chat).await,
        "scan" => handle_scan(gw, &chat).await,
        "start_scan" => handle_start_scan(gw, &chat).await,
        "stop_scan" => handle_stop_scan(gw, &chat, args).await,
        "view_jobs" => handle_view_jobs(gw, &chat).await,
        "view_job" => handle_view_job(gw, &chat, args).await,
        "cancel" => handle_cancel_input(gw, sender_id, &chat).await,
        "prune" => handle_prune(gw, &chat).await,
        _ => {
            gw.say(&chat, OutgoingText::plain("Unknown command. See /help."))
                .await
        }
    }
}

async fn handle_start(gw: &Gateway, chat: &ChatId) -> anyhow::Result<()> {
    let text = format!(
        "👋 Hi! I watch a folder and send posts for approval.\n\n\
         • /scan — check the folder now\n\
         • Folder: <code>{}</code>\n\
         • Scan interval: {} s\n\
         • Time zone: <code>{}</code>",
        html_escape(&gw.posts_root.display().to_string()),
        gw.scan_loops.interval().as_secs(),
        gw.scheduler.timezone().name(),
    );
    gw.say(chat, OutgoingText::html(text)).await
}

/// Body of `/help`.
pub fn help_text(tz_name: &str) -> String {
    format!(
        "<b>Help</b>\n\n\
         This bot publishes posts from a local folder to the channel after preview and approval.\n\n\
         <b>Post layout</b>\n\
         • One folder per post, holding the image files\n\
         • <code>meta.json</code> — required (metadata, JSON object)\n\
         • <code>description.txt</code> — optional (caption)\n\n\
         <b>Commands</b>\n\
         • <code>/start</code> — greeting\n\
         • <code>/scan</code> — scan the folder once\n\
         • <code>/start_scan</code> — start a periodic scan (replies with a task_id)\n\
         • <code>/stop_scan &lt;task_id&gt;</code> — stop a periodic scan\n\
         • <code>/view_jobs</code> — list scheduled publications\n\
         • <code>/view_job &lt;job_id&gt;</code> — preview one scheduled publication\n\
         • <code>/cancel</code> — abandon date input\n\
         • <code>/prune</code> — drop jobs whose folder is gone\n\
         • <code>/help</code> — this help\n\n\
         <b>Approval and scheduling</b>\n\
         After the preview press “✅ Approve”, then publish now or pick a time.\n\
         Typed times use <code>YYYY-MM-DD HH:MM</code> in local time (TZ: <code>{tz_name}</code>).\n\n\
         <b>Note</b>\n\
         • The bot must be a channel admin allowed to post."
    )
}

async fn handle_help(gw: &Gateway, chat: &ChatId) -> anyhow::Result<()> {
    let text = help_text(gw.scheduler.timezone().name());
    gw.say(chat, OutgoingText::html(text)).await
}

async fn handle_scan(gw: &Gateway, chat: &ChatId) -> anyhow::Result<()> {
    let report = gw.scanner.scan().await?;
    if report.failed > 0 {
        let text = format!(
            "⚠️ {} folder(s) could not be presented, see logs.",
            report.failed
        );
        gw.say(chat, OutgoingText::plain(text)).await
    } else if report.presented == 0 {
        gw.say(chat, OutgoingText::plain("Nothing new to review."))
            .await
    } else {
        Ok(())
    }
}

async fn handle_start_scan(gw: &Gateway, chat: &ChatId) -> anyhow::Result<()> {
    let task_id = gw.scan_loops.start(BOOT_SCAN_DELAY);
    let text = format!(
        "▶️ Periodic scan started every {} s.\ntask_id: <code>{task_id}</code>",
        gw.scan_loops.interval().as_secs()
    );
    gw.say(chat, OutgoingText::html(text)).await
}

async fn handle_stop_scan(gw: &Gateway, chat: &ChatId, args: &[String]) -> anyhow::Result<()> {
    let text = match args.first() {
        None => "Usage: /stop_scan <task_id>",
        Some(id) if gw.scan_loops.stop(id.trim()) => "⏹ Periodic scan stopped.",
        Some(_) => "Scan task not found.",
    };
    gw.say(chat, OutgoingText::plain(text)).await
}

async fn handle_view_jobs(gw: &Gateway, chat: &ChatId) -> anyhow::Result<()> {
    let jobs = gw.scheduler.jobs().await;
    if jobs.is_empty() {
        return gw
            .say(chat, OutgoingText::plain("No scheduled publications."))
            .await;
    }

    let mut lines = Vec::new();
    let mut rows = Vec::new();
    for (job_id, post) in jobs.iter().take(JOB_LIST_LIMIT) {
        let name = folder_name(&post.folder);
        let status = if post.folder.exists() {
            ""
        } else {
            " (folder missing)"
        };
        lines.push(format!(
            "• <code>{job_id}</code> — {}{status}\n  🕒 {}",
            html_escape(&name),
            gw.scheduler.describe(post.run_at)
        ));
        rows.push(vec![InlineButton::new(
            format!("👁 {name}"),
            Action::ViewJob(job_id.clone()).encode(),
        )]);
    }
    if jobs.len() > JOB_LIST_LIMIT {
        lines.push(format!("… and {} more", jobs.len() - JOB_LIST_LIMIT));
    }

    let message = OutgoingText::html(lines.join("\n")).with_keyboard(InlineKeyboard::new(rows));
    gw.say(chat, message).await
}

async fn handle_view_job(gw: &Gateway, chat: &ChatId, args: &[String]) -> anyhow::Result<()> {
    let Some(job_id) = args.first() else {
        return gw
            .say(chat, OutgoingText::plain("Specify a job id: /view_job <job_id>"))
            .await;
    };
    if let Err(text) = show_job(gw, job_id.trim()).await? {
        gw.say(chat, OutgoingText::plain(text)).await?;
    }
    Ok(())
}

/// Preview a scheduled job with its planned time and item buttons.
///
/// The inner `Err` is a user-facing reason the job cannot be shown.
async fn show_job(gw: &Gateway, job_id: &str) -> anyhow::Result<Result<(), &'static str>> {
    let Some(post) = gw.scheduler.get(job_id).await else {
        return Ok(Err("Job not found."));
    };
    if !gw.folder_available(&post.folder) {
        return Ok(Err("Post folder is unavailable."));
    }

    // Buttons below carry the stored token; make sure it resolves again.
    gw.tokens.register(&post.token, &post.folder);

    let loaded = gw.scanner.load(&post.folder).await?;
    let card = format!(
        "{}\n\n<b>🕒 Planned publication:</b> {}",
        preview::render_card(&loaded),
        gw.scheduler.describe(post.run_at)
    );
    let message = OutgoingText::html(card)
        .with_keyboard(preview::scheduled_item_keyboard(&post.token, job_id));
    gw.scanner.send_card(&loaded, message).await?;
    Ok(Ok(()))
}

async fn handle_cancel_input(gw: &Gateway, sender_id: i64, chat: &ChatId) -> anyhow::Result<()> {
    let text = if gw.take_pending(sender_id).is_some() {
        "Date input cancelled."
    } else {
        "Nothing to cancel."
    };
    gw.say(chat, OutgoingText::plain(text)).await
}

async fn handle_prune(gw: &Gateway, chat: &ChatId) -> anyhow::Result<()> {
    let report = gw.scheduler.prune().await?;
    info!(removed = report.removed, retained = report.retained, "Schedule pruned");
    let text = format!(
        "🧹 Removed {} job(s) with missing folders, {} kept.",
        report.removed, report.retained
    );
    gw.say(chat, OutgoingText::plain(text)).await
}

// ──────────────────── Text ────────────────────

/// Plain text is only meaningful as the answer to a date prompt.
pub async fn handle_text(gw: &Gateway, sender_id: i64, chat: ChatId, text: &str) -> anyhow::Result<()> {
    let Some(pending) = gw.take_pending(sender_id) else {
        debug!(sender_id, "Ignoring text without a pending prompt");
        return Ok(());
    };

    if !gw.folder_available(&pending.folder) {
        return gw.say(&chat, OutgoingText::plain("Folder unavailable.")).await;
    }

    match gw
        .scheduler
        .schedule_at_local(&pending.token, &pending.folder, text)
        .await
    {
        Ok((_, run_at)) => {
            let text = scheduled_text(gw, &pending.folder, run_at);
            gw.say(&chat, OutgoingText::plain(text)).await
        }
        Err(e @ ScheduleError::Storage(_)) => {
            let text = format!("❌ Could not schedule: {e}");
            gw.say(&chat, OutgoingText::plain(text)).await
        }
        Err(e) => {
            let text = format!("{e}. Example: 2025-09-04 18:30. Try again or /cancel");
            gw.set_pending(sender_id, pending);
            gw.say(&chat, OutgoingText::plain(text)).await
        }
    }
}

fn scheduled_text(gw: &Gateway, folder: &Path, run_at: chrono::DateTime<chrono::Utc>) -> String {
    format!(
        "🕒 Scheduled for {}\nPost: {}",
        gw.scheduler.describe(run_at),
        folder_name(folder)
    )
}

// ──────────────────── Buttons ────────────────────

/// Handle an inline button press.
pub async fn handle_action(
    gw: &Gateway,
    sender_id: i64,
    action_id: &str,
    data: &str,
    message: Option<MessageRef>,
) -> anyhow::Result<()> {
    let Some(action) = Action::parse(data) else {
        return gw.answer(action_id, Some("Unknown action")).await;
    };
    let message = message.as_ref();

    match action {
        Action::Cancel(_) => {
            gw.answer(action_id, Some("Cancelled")).await?;
            gw.reply(message, OutgoingText::plain("❌ Cancelled")).await
        }
        Action::CancelJob(job_id) => {
            gw.answer(action_id, Some("Cancelling…")).await?;
            let text = match gw.scheduler.cancel(&job_id).await? {
                Some(post) => {
                    // Folder returns to the approval pool on the next scan.
                    gw.tokens.remove(&post.token);
                    if let Err(e) = folder::clear_lock(&post.folder) {
                        warn!(folder = %post.folder.display(), "Failed to remove lock marker: {e}");
                    }
                    "❌ Job cancelled"
                }
                None => "Job not found.",
            };
            gw.reply(message, OutgoingText::plain(text)).await
        }
        Action::ViewJob(job_id) => {
            gw.answer(action_id, None).await?;
            if let Err(text) = show_job(gw, &job_id).await? {
                gw.reply(message, OutgoingText::plain(text)).await?;
            }
            Ok(())
        }
        action => {
            // Remaining actions all carry a token.
            let token = action.token().unwrap_or_default().to_string();
            let Some(folder) = resolve_token(gw, action_id, &token).await? else {
                return Ok(());
            };
            handle_token_action(gw, sender_id, action_id, message, action, token, folder).await
        }
    }
}

/// Look up the folder behind `token`, answering the press when it is gone.
async fn resolve_token(gw: &Gateway, action_id: &str, token: &str) -> anyhow::Result<Option<PathBuf>> {
    let Some(folder) = gw.tokens.lookup(token) else {
        gw.answer(action_id, Some(STALE_BUTTON)).await?;
        return Ok(None);
    };
    if !gw.folder_available(&folder) {
        gw.tokens.remove(token);
        gw.answer(action_id, Some(FOLDER_UNAVAILABLE)).await?;
        return Ok(None);
    }
    Ok(Some(folder))
}

async fn handle_token_action(
    gw: &Gateway,
    sender_id: i64,
    action_id: &str,
    message: Option<&MessageRef>,
    action: Action,
    token: String,
    folder: PathBuf,
) -> anyhow::Result<()> {
    let name = folder_name(&folder);

    match action {
        Action::Skip(_) => {
            gw.answer(action_id, None).await?;
            if let Err(e) = folder::clear_lock(&folder) {
                warn!(folder = %folder.display(), "Failed to remove lock marker: {e}");
            }
            gw.tokens.remove(&token);
            gw.reply(message, OutgoingText::plain(format!("⏭️ Skipped: {name}")))
                .await
        }
        Action::Approve(_) | Action::Schedule(_) => {
            gw.answer(action_id, None).await?;
            let keyboard = preview::schedule_keyboard(&token);
            match message {
                Some(target) => gw.messenger.edit_keyboard(target, Some(keyboard)).await,
                None => {
                    let text = OutgoingText::plain(format!("Publish {name}:")).with_keyboard(keyboard);
                    gw.say(&gw.admin_chat, text).await
                }
            }
        }
        Action::PublishNow(_) => {
            gw.answer(action_id, Some("Publishing…")).await?;
            let text = publish_now(gw, &folder, &token).await;
            gw.reply(message, OutgoingText::plain(text)).await
        }
        Action::ScheduleIn { secs, .. } => {
            gw.answer(action_id, Some("Scheduling…")).await?;
            let text = match gw.scheduler.schedule_in(&token, &folder, secs).await {
                Ok((_, run_at)) => scheduled_text(gw, &folder, run_at),
                Err(e) => format!("❌ Could not schedule: {e}"),
            };
            gw.reply(message, OutgoingText::plain(text)).await
        }
        Action::ScheduleInput(_) => {
            gw.answer(action_id, None).await?;
            gw.set_pending(sender_id, PendingInput { token, folder });
            let text = format!(
                "Enter the publication date and time as YYYY-MM-DD HH:MM ({}).\n\
                 Example: 2025-09-04 18:30\n\
                 Or /cancel",
                gw.scheduler.timezone().name()
            );
            gw.say(&gw.admin_chat, OutgoingText::plain(text)).await
        }
        Action::Cancel(_) | Action::CancelJob(_) | Action::ViewJob(_) => Ok(()),
    }
}

/// Publish immediately and describe the result for the admin.
async fn publish_now(gw: &Gateway, folder: &Path, token: &str) -> String {
    let name = folder_name(folder);
    match gw.publisher.publish_folder(folder, &gw.channel).await {
        Ok(outcome) => {
            gw.tokens.remove(token);
            if let Err(e) = gw.scheduler.cancel_folder(folder).await {
                warn!(folder = %folder.display(), "Failed to drop scheduled jobs: {e}");
            }
            match outcome {
                PublishOutcome::Published => format!("✅ Published and deleted: {name}"),
                PublishOutcome::NotDeleted(e) => format!("✅ Published, but not deleted: {e}"),
            }
        }
        Err(PublishError::Folder { .. }) => format!("{FOLDER_UNAVAILABLE}: {name}"),
        Err(e) => {
            warn!(folder = %folder.display(), "Publish failed: {e}");
            format!("❌ Publish failed: {e}")
        }
    }
}
