//! Startup configuration: required credentials from the environment,
//! defaulted tunables, and the watched feed list (built-in set, optionally
//! replaced by a TOML file pointed at by `FEEDS_PATH`).

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::dedup::{DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_WINDOW_SECS};
use crate::render::OutputMode;

pub const ENV_FEEDS_PATH: &str = "FEEDS_PATH";

const DEFAULT_PORT: u16 = 7860;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 600;
const DEFAULT_PUBLISH_GAP_SECS: u64 = 5;
const DEFAULT_WARMUP_SECS: u64 = 10;
const DEFAULT_DB_PATH: &str = "event_scout.db";

/// One watched channel feed. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    pub channel: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub target_channel: String,
    pub port: u16,
    pub poll_interval_secs: u64,
    pub publish_gap_secs: u64,
    pub warmup_secs: u64,
    pub dedup_window_secs: i64,
    pub similarity_threshold: f64,
    pub state_db_path: String,
    pub output_mode: OutputMode,
    pub feeds: Vec<FeedSource>,
}

impl Config {
    /// Read configuration from the environment. Missing credentials are
    /// fatal; everything else falls back to defaults.
    pub fn from_env() -> Result<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| anyhow!("TELEGRAM_BOT_TOKEN environment variable is required"))?;
        let target_channel = std::env::var("TARGET_CHANNEL")
            .map_err(|_| anyhow!("TARGET_CHANNEL environment variable is required"))?;

        Ok(Self {
            bot_token,
            target_channel,
            port: env_parsed("PORT", DEFAULT_PORT),
            poll_interval_secs: env_parsed("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS),
            publish_gap_secs: env_parsed("PUBLISH_GAP_SECS", DEFAULT_PUBLISH_GAP_SECS),
            warmup_secs: env_parsed("WARMUP_SECS", DEFAULT_WARMUP_SECS),
            dedup_window_secs: env_parsed("DEDUP_WINDOW_SECS", DEFAULT_WINDOW_SECS),
            similarity_threshold: env_parsed(
                "TITLE_SIMILARITY_THRESHOLD",
                DEFAULT_SIMILARITY_THRESHOLD,
            ),
            state_db_path: std::env::var("STATE_DB_PATH")
                .unwrap_or_else(|_| DEFAULT_DB_PATH.to_string()),
            output_mode: output_mode_from_env(),
            feeds: load_feeds()?,
        })
    }
}

fn env_parsed<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn output_mode_from_env() -> OutputMode {
    match std::env::var("OUTPUT_MODE")
        .unwrap_or_default()
        .to_ascii_lowercase()
        .as_str()
    {
        "html" => OutputMode::Html,
        _ => OutputMode::MarkdownV2,
    }
}

/// The channels watched when no `FEEDS_PATH` override is given.
pub fn default_feeds() -> Vec<FeedSource> {
    [
        ("WinCell Co", "wincellco"),
        ("Rayazistazma", "Rayazistazma"),
        ("SBU Bio Society", "SBUBIOSOCIETY"),
    ]
    .into_iter()
    .map(|(name, channel)| FeedSource {
        name: name.to_string(),
        url: format!("https://rsshub.app/telegram/channel/{channel}"),
        channel: channel.to_string(),
    })
    .collect()
}

fn load_feeds() -> Result<Vec<FeedSource>> {
    if let Ok(path) = std::env::var(ENV_FEEDS_PATH) {
        return load_feeds_from(Path::new(&path));
    }
    Ok(default_feeds())
}

/// Load a feed list from a TOML file of `[[feeds]]` tables.
pub fn load_feeds_from(path: &Path) -> Result<Vec<FeedSource>> {
    #[derive(Deserialize)]
    struct FeedFile {
        feeds: Vec<FeedSource>,
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed list from {}", path.display()))?;
    let parsed: FeedFile =
        toml::from_str(&content).with_context(|| format!("parsing feed list {}", path.display()))?;
    if parsed.feeds.is_empty() {
        return Err(anyhow!("feed list {} is empty", path.display()));
    }
    Ok(parsed.feeds)
}
