//! postgate-gateway: the admin-facing bot.
//!
//! Provides:
//! - Channel plugin interface for chat transports
//! - Admin gate and per-event dispatch
//! - Command, text and button handlers for the approval flow
//! - Periodic scan loops
//! - `start_gateway`, which wires every component from configuration

pub mod channel;
pub mod handlers;
pub mod scan_loop;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use postgate_config::PostGateConfig;
use postgate_cron::{PublicationScheduler, SchedulerSettings, TokioTimer};
use postgate_posts::folder::is_under_root;
use postgate_posts::{ChannelPublisher, ImageFilter, Messenger, ScanEngine, TokenRegistry};
use postgate_storage::ScheduleStore;
use postgate_types::{ChatId, InboundEvent, MessageRef, OutgoingText};

use channel::ChannelPlugin;
use scan_loop::{BOOT_SCAN_DELAY, ScanLoops};

/// A folder waiting for a typed publication time.
#[derive(Debug, Clone)]
pub struct PendingInput {
    pub token: String,
    pub folder: PathBuf,
}

/// Everything the gateway talks to.
pub struct GatewayDeps {
    pub admin_id: i64,
    pub channel: ChatId,
    pub posts_root: PathBuf,
    pub tokens: Arc<TokenRegistry>,
    pub scanner: Arc<ScanEngine>,
    pub publisher: Arc<ChannelPublisher>,
    pub scheduler: Arc<PublicationScheduler>,
    pub messenger: Arc<dyn Messenger>,
    pub scan_loops: ScanLoops,
}

/// Shared gateway state.
pub struct Gateway {
    pub(crate) admin_id: i64,
    pub(crate) admin_chat: ChatId,
    pub(crate) channel: ChatId,
    pub(crate) posts_root: PathBuf,
    pub(crate) tokens: Arc<TokenRegistry>,
    pub(crate) scanner: Arc<ScanEngine>,
    pub(crate) publisher: Arc<ChannelPublisher>,
    pub(crate) scheduler: Arc<PublicationScheduler>,
    pub(crate) messenger: Arc<dyn Messenger>,
    pub(crate) scan_loops: ScanLoops,
    /// Pending date prompts keyed by sender id.
    pending: Mutex<HashMap<i64, PendingInput>>,
}

impl Gateway {
    pub fn new(deps: GatewayDeps) -> Self {
        Self {
            admin_id: deps.admin_id,
            admin_chat: ChatId::Id(deps.admin_id),
            channel: deps.channel,
            posts_root: deps.posts_root,
            tokens: deps.tokens,
            scanner: deps.scanner,
            publisher: deps.publisher,
            scheduler: deps.scheduler,
            messenger: deps.messenger,
            scan_loops: deps.scan_loops,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn scan_loops(&self) -> &ScanLoops {
        &self.scan_loops
    }

    /// Handle one inbound event. Errors are logged, never propagated.
    pub async fn handle_event(&self, event: InboundEvent) {
        if event.sender_id() != self.admin_id {
            self.refuse(&event).await;
            return;
        }

        let result = match event {
            InboundEvent::Command {
                sender_id,
                chat_id,
                command,
                args,
            } => {
                info!(command = %command, "Handling command");
                handlers::handle_command(self, sender_id, ChatId::Id(chat_id), &command, &args)
                    .await
            }
            InboundEvent::Text {
                sender_id,
                chat_id,
                text,
            } => handlers::handle_text(self, sender_id, ChatId::Id(chat_id), &text).await,
            InboundEvent::Action {
                sender_id,
                action_id,
                data,
                message,
            } => {
                info!(data = %data, "Handling button");
                handlers::handle_action(self, sender_id, &action_id, &data, message).await
            }
        };

        if let Err(e) = result {
            warn!("Event handler failed: {e:#}");
        }
    }

    async fn refuse(&self, event: &InboundEvent) {
        warn!(sender_id = event.sender_id(), "Rejected event from non-admin");
        let result = match event {
            InboundEvent::Action { action_id, .. } => {
                self.answer(action_id, Some("Administrator only")).await
            }
            InboundEvent::Command { chat_id, .. } | InboundEvent::Text { chat_id, .. } => {
                self.say(
                    &ChatId::Id(*chat_id),
                    OutgoingText::plain("This bot is private. Access is limited to the administrator."),
                )
                .await
            }
        };
        if let Err(e) = result {
            warn!("Failed to send refusal: {e:#}");
        }
    }

    /// Consume events until the channel closes or `cancel` triggers.
    /// Each event is handled in its own task.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<InboundEvent>, cancel: CancellationToken) {
        info!("Gateway event loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        let gw = self.clone();
                        tokio::spawn(async move { gw.handle_event(event).await });
                    }
                    None => break,
                },
            }
        }
        info!("Gateway event loop stopped");
    }

    // ──────────────────── Helpers ────────────────────

    pub(crate) async fn say(&self, chat: &ChatId, message: OutgoingText) -> anyhow::Result<()> {
        self.messenger.send_text(chat, message).await?;
        Ok(())
    }

    /// Edit the message that carried the pressed button, or send a new one.
    pub(crate) async fn reply(
        &self,
        target: Option<&MessageRef>,
        message: OutgoingText,
    ) -> anyhow::Result<()> {
        match target {
            Some(target) => self.messenger.edit_text(target, message).await,
            None => self.say(&self.admin_chat, message).await,
        }
    }

    pub(crate) async fn answer(&self, action_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        self.messenger.answer_action(action_id, text).await
    }

    /// Folder exists and lives under the posts root.
    pub(crate) fn folder_available(&self, folder: &Path) -> bool {
        folder.exists() && is_under_root(folder, &self.posts_root)
    }

    pub(crate) fn take_pending(&self, sender_id: i64) -> Option<PendingInput> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&sender_id)
    }

    pub(crate) fn set_pending(&self, sender_id: i64, input: PendingInput) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sender_id, input);
    }
}

/// Build every component from `config`, restore the schedule and serve
/// events from `channel` until Ctrl-C.
pub async fn start_gateway(
    mut config: PostGateConfig,
    channel: Arc<dyn ChannelPlugin>,
) -> anyhow::Result<()> {
    config.validate()?;
    config.resolve_posts_root()?;
    let timezone = config.timezone()?;
    let bot = &config.bot;

    let messenger = channel.messenger();
    let admin_chat = ChatId::Id(bot.admin_chat_id);
    let images = ImageFilter::new(&bot.image_extensions);
    let tokens = Arc::new(TokenRegistry::new());
    let store = Arc::new(ScheduleStore::new(config.schedule_path()));

    let scanner = Arc::new(ScanEngine::new(
        bot.posts_root.clone(),
        admin_chat.clone(),
        images.clone(),
        tokens.clone(),
        messenger.clone(),
    ));
    let publisher = Arc::new(ChannelPublisher::new(messenger.clone(), images));

    let (timer, fired) = TokioTimer::new();
    let scheduler = Arc::new(PublicationScheduler::new(
        SchedulerSettings {
            channel: bot.channel.clone(),
            admin_chat,
            timezone,
        },
        store,
        Arc::new(timer),
        publisher.clone(),
        scanner.clone(),
        messenger.clone(),
    ));

    let cancel = CancellationToken::new();
    let scheduler_task = tokio::spawn(scheduler.clone().run(fired, cancel.child_token()));

    match scheduler.restore().await {
        Ok(report) if report.rearmed + report.represented + report.discarded > 0 => {
            info!(
                rearmed = report.rearmed,
                represented = report.represented,
                discarded = report.discarded,
                "Restored scheduled publications"
            );
        }
        Ok(_) => {}
        Err(e) => warn!("Schedule restoration failed: {e}"),
    }

    let gateway = Arc::new(Gateway::new(GatewayDeps {
        admin_id: bot.admin_chat_id,
        channel: bot.channel.clone(),
        posts_root: bot.posts_root.clone(),
        tokens,
        scanner: scanner.clone(),
        publisher,
        scheduler,
        messenger,
        scan_loops: ScanLoops::new(scanner, Duration::from_secs(bot.scan_interval_secs)),
    }));

    let (tx, rx) = mpsc::channel(256);
    channel
        .start(tx)
        .await
        .with_context(|| format!("failed to start {} channel", channel.channel_type()))?;
    if let Err(e) = channel.register_commands(handlers::COMMANDS).await {
        warn!("Failed to register bot commands: {e:#}");
    }

    let boot_task = gateway.scan_loops().start(BOOT_SCAN_DELAY);
    info!(
        posts_root = %bot.posts_root.display(),
        scan_interval_secs = bot.scan_interval_secs,
        task_id = %boot_task,
        "Bot started"
    );

    let events_task = tokio::spawn(gateway.clone().run(rx, cancel.child_token()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutting down");

    cancel.cancel();
    gateway.scan_loops().stop_all();
    if let Err(e) = channel.stop().await {
        warn!("Failed to stop channel: {e:#}");
    }
    let _ = events_task.await;
    let _ = scheduler_task.await;
    Ok(())
}
