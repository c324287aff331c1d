use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use postgate_types::ChatId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Posts root is not a directory: {}", .0.display())]
    PostsRoot(PathBuf),
    #[error("Unknown time zone: {0}")]
    Timezone(String),
}

/// Telegram bot and watched-folder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot API token.
    #[serde(default)]
    pub bot_token: String,
    /// The only user allowed to talk to the bot; previews are sent here.
    #[serde(default)]
    pub admin_chat_id: i64,
    /// Broadcast channel that approved posts are published to.
    #[serde(default = "default_channel")]
    pub channel: ChatId,
    /// Directory watched for post folders.
    #[serde(default)]
    pub posts_root: PathBuf,
    /// Seconds between periodic scans.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Schedule file name, relative to `posts_root`.
    #[serde(default = "default_schedule_file")]
    pub schedule_file: String,
    /// Lower-case image extensions without the leading dot.
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

fn default_channel() -> ChatId {
    ChatId::Handle(String::new())
}

fn default_scan_interval() -> u64 {
    60
}

fn default_schedule_file() -> String {
    ".scheduled_posts.json".to_string()
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            admin_chat_id: 0,
            channel: default_channel(),
            posts_root: PathBuf::new(),
            scan_interval_secs: default_scan_interval(),
            schedule_file: default_schedule_file(),
            image_extensions: default_image_extensions(),
        }
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// IANA time zone used to read and display local times.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "Europe/Moscow".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

/// Logging output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Top-level postgate configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostGateConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl PostGateConfig {
    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TGBOT_BOT_TOKEN") {
            self.bot.bot_token = v;
        }
        if let Some(v) = lookup("TGBOT_ADMIN_CHAT_ID") {
            self.bot.admin_chat_id = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "TGBOT_ADMIN_CHAT_ID",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("TGBOT_CHANNEL_ID") {
            self.bot.channel = v.parse().unwrap_or_else(|never| match never {});
        }
        if let Some(v) = lookup("TGBOT_POSTS_ROOT") {
            self.bot.posts_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("TGBOT_SCAN_INTERVAL") {
            self.bot.scan_interval_secs =
                v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: "TGBOT_SCAN_INTERVAL",
                    value: v.clone(),
                })?;
        }
        if let Some(v) = lookup("APP_TIMEZONE") {
            self.app.timezone = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(v) = lookup("LOG_JSON") {
            self.log.json = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Startup checks; any failure here means the process must not start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("bot.bot_token"));
        }
        if self.bot.admin_chat_id == 0 {
            return Err(ConfigError::Missing("bot.admin_chat_id"));
        }
        if self.bot.channel.to_string().is_empty() {
            return Err(ConfigError::Missing("bot.channel"));
        }
        if self.bot.scan_interval_secs == 0 {
            return Err(ConfigError::Missing("bot.scan_interval_secs"));
        }
        if !self.bot.posts_root.is_dir() {
            return Err(ConfigError::PostsRoot(self.bot.posts_root.clone()));
        }
        self.timezone()?;
        Ok(())
    }

    /// Parse the configured IANA time zone.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.app
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.app.timezone.clone()))
    }

    /// Replace `bot.posts_root` with its canonical absolute form.
    ///
    /// Folder paths handed to tokens and the schedule file derive from the
    /// root, so they stay valid across working-directory changes.
    pub fn resolve_posts_root(&mut self) -> Result<(), ConfigError> {
        let root = std::fs::canonicalize(&self.bot.posts_root)
            .map_err(|_| ConfigError::PostsRoot(self.bot.posts_root.clone()))?;
        if !root.is_dir() {
            return Err(ConfigError::PostsRoot(root));
        }
        self.bot.posts_root = root;
        Ok(())
    }

    /// Location of the schedule file; absolute once
    /// [`resolve_posts_root`](Self::resolve_posts_root) has run.
    pub fn schedule_path(&self) -> PathBuf {
        self.bot.posts_root.join(&self.bot.schedule_file)
    }
}

/// Resolve the postgate config directory (~/.postgate/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".postgate"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.postgate/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from `path` (or the default path), then apply
/// environment overrides. `.env` is read first when present.
pub fn load_config(path: Option<&Path>) -> Result<PostGateConfig, ConfigError> {
    let _ = dotenvy::dotenv();

    let mut config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config_from(&config_file_path()?)?,
    };
    config.apply_overrides(|var| std::env::var(var).ok())?;
    Ok(config)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<PostGateConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(PostGateConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: PostGateConfig = json5::from_str(&content)?;
    Ok(config)
}
