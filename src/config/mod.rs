// src/config/mod.rs
//! Bridge configuration from environment variables (after `.env` via dotenvy).

pub mod feeds;
pub mod validate;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::sources::youtube::Playlist;
use crate::state::store::DEFAULT_STATE_PATH;
pub use validate::{validate, ConfigReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertsConfig {
    pub enabled: bool,
    /// Falls back to the main channel when unset.
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YoutubeConfig {
    pub api_key: String,
    pub playlists: Vec<Playlist>,
    pub interval_minutes: u64,
    pub max_pages: u32,
    pub archive_to_readwise: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadwiseConfig {
    pub api_token: String,
    pub interval_minutes: u64,
    pub max_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RssConfig {
    pub feeds: Vec<String>,
    pub interval_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub telegram: TelegramConfig,
    pub alerts: AlertsConfig,
    pub youtube: YoutubeConfig,
    pub readwise: ReadwiseConfig,
    pub rss: RssConfig,
    pub state_file: PathBuf,
    pub dry_run: bool,
    pub log_level: String,
    pub log_format: LogFormat,
    pub proxy_url: Option<String>,
    pub metrics_addr: Option<String>,
}

impl BridgeConfig {
    /// Read from the process environment, including the feed list file fallbacks.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::from_lookup(|k| std::env::var(k).ok());
        let from_file = feeds::load_feeds_default()?;
        cfg.rss.feeds = dedup(cfg.rss.feeds.into_iter().chain(from_file));
        Ok(cfg)
    }

    /// Build from any key lookup; pure, so tests never touch the process env.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let flag = |k: &str, default: bool| var(k).map_or(default, |v| parse_bool(&v));
        let num = |k: &str, default: u64| var(k).and_then(|v| v.parse().ok()).unwrap_or(default);
        let pages = |k: &str, default: u32| var(k).and_then(|v| v.parse().ok()).unwrap_or(default);

        let channel_id = var("TELEGRAM_CHANNEL_ID").unwrap_or_default();

        let mut playlists = Vec::new();
        for (k, label) in [
            ("YOUTUBE_PLAYLIST_ID", "youtube"),
            ("YOUTUBE_PLAYLIST_ID_VIDEO", "youtube"),
            ("YOUTUBE_PLAYLIST_ID_MUSIC", "music"),
        ] {
            if let Some(id) = var(k) {
                playlists.push(Playlist {
                    id,
                    label: label.to_string(),
                });
            }
        }
        for id in split_list(var("YOUTUBE_PLAYLISTS").as_deref()) {
            playlists.push(Playlist {
                id,
                label: "youtube".to_string(),
            });
        }
        let mut seen = HashSet::new();
        playlists.retain(|p| seen.insert(p.id.clone()));

        Self {
            alerts: AlertsConfig {
                enabled: flag("ALERTS_ENABLED", true),
                chat_id: var("ALERT_CHAT_ID").unwrap_or_else(|| channel_id.clone()),
            },
            telegram: TelegramConfig {
                bot_token: var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
                channel_id,
            },
            youtube: YoutubeConfig {
                api_key: var("YOUTUBE_API_KEY").unwrap_or_default(),
                playlists,
                interval_minutes: num("YOUTUBE_SYNC_INTERVAL_MINUTES", 15),
                max_pages: pages("YOUTUBE_MAX_PAGES", 3),
                archive_to_readwise: flag("YOUTUBE_ARCHIVE_TO_READWISE", true),
            },
            readwise: ReadwiseConfig {
                api_token: var("READWISE_API_TOKEN").unwrap_or_default(),
                interval_minutes: num("READWISE_SYNC_INTERVAL_MINUTES", 60),
                max_pages: pages("READWISE_MAX_PAGES", 10),
            },
            rss: RssConfig {
                feeds: dedup(split_list(var("RSS_FEEDS").as_deref())),
                interval_minutes: num("RSS_SYNC_INTERVAL_MINUTES", 30),
            },
            state_file: var("STATE_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
            dry_run: flag("DRY_RUN", false),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Compact,
            },
            proxy_url: var("PROXY_URL")
                .or_else(|| var("HTTPS_PROXY"))
                .or_else(|| var("HTTP_PROXY")),
            metrics_addr: var("METRICS_ADDR"),
        }
    }

    pub fn interval(minutes: u64) -> Duration {
        Duration::from_secs(minutes.saturating_mul(60))
    }

    pub fn metrics_socket_addr(&self) -> Result<Option<std::net::SocketAddr>> {
        self.metrics_addr
            .as_deref()
            .map(|a| a.parse().with_context(|| format!("invalid METRICS_ADDR {a:?}")))
            .transpose()
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Drop repeats, keeping the first occurrence.
pub(crate) fn dedup<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|s| seen.insert(s.clone())).collect()
}
