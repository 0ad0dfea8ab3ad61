// src/config/validate.rs
use super::BridgeConfig;

/// Problems found in a [`BridgeConfig`]. Errors stop startup; warnings only disable
/// the affected source.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn validate(cfg: &BridgeConfig) -> ConfigReport {
    let mut r = ConfigReport::default();

    // Dry-run never sends, so it can run without chat credentials.
    if !cfg.dry_run {
        if cfg.telegram.bot_token.is_empty() {
            r.errors.push("TELEGRAM_BOT_TOKEN is missing".into());
        }
        if cfg.telegram.channel_id.is_empty() {
            r.errors.push("TELEGRAM_CHANNEL_ID is missing".into());
        }
    }

    for (name, minutes) in [
        ("YOUTUBE_SYNC_INTERVAL_MINUTES", cfg.youtube.interval_minutes),
        ("READWISE_SYNC_INTERVAL_MINUTES", cfg.readwise.interval_minutes),
        ("RSS_SYNC_INTERVAL_MINUTES", cfg.rss.interval_minutes),
    ] {
        if minutes == 0 {
            r.errors.push(format!("{name} must be at least 1"));
        }
    }

    if cfg.youtube.playlists.is_empty() {
        r.warnings
            .push("No YouTube playlists configured; YouTube sync will be skipped".into());
    } else if cfg.youtube.api_key.is_empty() {
        r.warnings.push(
            "YOUTUBE_API_KEY is missing while playlists are configured; YouTube sync will be skipped"
                .into(),
        );
    }
    for p in cfg.youtube.playlists.iter().filter(|p| p.id.ends_with('.')) {
        r.warnings.push(format!(
            "YouTube playlist id {:?} ends with a period and will fail to fetch",
            p.id
        ));
    }

    if cfg.readwise.api_token.is_empty() {
        r.warnings
            .push("READWISE_API_TOKEN missing; Readwise sync and archiving will be skipped".into());
    }

    if cfg.rss.feeds.is_empty() {
        r.warnings
            .push("No RSS feeds configured; RSS sync will be skipped".into());
    }

    if cfg.alerts.enabled && cfg.alerts.chat_id.is_empty() {
        r.warnings
            .push("Alerts enabled but no ALERT_CHAT_ID or TELEGRAM_CHANNEL_ID; alerts will be logged only".into());
    }

    r
}
