use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use postgate_channel_telegram::TelegramChannel;
use postgate_config::PostGateConfig;
use postgate_cron::format_run_at;
use postgate_storage::ScheduleStore;

#[derive(Parser)]
#[command(name = "postgate", about = "Folder-to-channel post approval bot")]
struct Cli {
    /// Config file (defaults to ~/.postgate/config.json5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default)
    Run,
    /// List scheduled publications without starting the bot
    Jobs,
    /// Drop scheduled publications whose folder no longer exists
    Prune,
    /// Validate configuration and print the effective settings
    Check,
}

fn init_tracing(config: &PostGateConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = postgate_config::load_config(cli.config.as_deref())
        .context("failed to load configuration")?;
    init_tracing(&config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let channel = TelegramChannel::new(&config.bot.bot_token)?;
                postgate_gateway::start_gateway(config, Arc::new(channel)).await
            })?;
        }
        Commands::Jobs => {
            let tz = config.timezone()?;
            let store = ScheduleStore::new(config.schedule_path());
            let mut jobs: Vec<_> = store.load_all().into_iter().collect();
            jobs.sort_by(|a, b| a.1.run_at.cmp(&b.1.run_at).then_with(|| a.0.cmp(&b.0)));
            if jobs.is_empty() {
                println!("No scheduled publications.");
            }
            for (job_id, post) in jobs {
                let missing = if post.folder.exists() {
                    ""
                } else {
                    " (folder missing)"
                };
                println!("{job_id}  {}", format_run_at(post.run_at, tz));
                println!("    {}{missing}", post.folder.display());
            }
        }
        Commands::Prune => {
            let store = ScheduleStore::new(config.schedule_path());
            let report = store.prune_missing_folders()?;
            println!(
                "Removed {} job(s) with missing folders, {} kept.",
                report.removed, report.retained
            );
        }
        Commands::Check => {
            config.validate()?;
            config.resolve_posts_root()?;
            println!("postgate configuration is valid");
            println!("  channel: {}", config.bot.channel);
            println!("  admin chat: {}", config.bot.admin_chat_id);
            println!("  posts root: {}", config.bot.posts_root.display());
            println!("  scan interval: {} s", config.bot.scan_interval_secs);
            println!("  time zone: {}", config.app.timezone);
            println!("  schedule file: {}", config.schedule_path().display());
        }
    }

    Ok(())
}
