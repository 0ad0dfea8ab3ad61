// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod format;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod poll;
pub mod sources;
pub mod state;

// ---- Re-exports for stable public API ----
pub use crate::notify::{Alerter, DeliverySink, TelegramSink};
pub use crate::poll::{select_new, CycleReport, PollCycle, PollError};
pub use crate::sources::{Archiver, Item, SourceAdapter, SourceKind, SubSource};
pub use crate::state::{DeliveryState, SharedState, WatermarkStore};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BridgeConfig;
use crate::sources::{feed::FeedSource, readwise::ReadwiseClient, youtube::YoutubeSource};

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything `main` needs to start the source loops.
pub struct Bridge {
    pub cycles: Vec<(PollCycle, Duration)>,
    pub alerter: Alerter,
    pub sink: Arc<TelegramSink>,
}

/// Wire adapters, sink, archiver and shared state from configuration. Sources that
/// cannot operate are left out with a warning.
pub async fn build_bridge(cfg: &BridgeConfig) -> Result<Bridge> {
    let client = http::build_client(FETCH_TIMEOUT, cfg.proxy_url.as_deref())?;

    let sink = Arc::new(
        TelegramSink::new(
            client.clone(),
            cfg.telegram.bot_token.clone(),
            cfg.telegram.channel_id.clone(),
        )
        .with_dry_run(cfg.dry_run),
    );
    let alerter = if cfg.alerts.enabled {
        Alerter::new(sink.clone(), cfg.alerts.chat_id.clone())
    } else {
        Alerter::disabled()
    };

    let state = SharedState::open(WatermarkStore::new(&cfg.state_file)).await;

    let readwise = Arc::new(
        ReadwiseClient::new(client.clone(), cfg.readwise.api_token.clone())
            .with_dry_run(cfg.dry_run)
            .with_max_pages(cfg.readwise.max_pages),
    );
    let youtube = Arc::new(
        YoutubeSource::new(
            client.clone(),
            cfg.youtube.api_key.clone(),
            cfg.youtube.playlists.clone(),
        )
        .with_max_pages(cfg.youtube.max_pages),
    );
    let feeds = Arc::new(FeedSource::new(client, cfg.rss.feeds.clone()));

    let mut cycles = Vec::new();

    if youtube.can_operate() {
        let mut cycle = PollCycle::new(youtube, sink.clone(), state.clone());
        if cfg.youtube.archive_to_readwise && readwise.can_use() {
            cycle = cycle.with_archiver(readwise.clone());
        }
        cycles.push((cycle, BridgeConfig::interval(cfg.youtube.interval_minutes)));
    } else {
        tracing::warn!("YouTube sync disabled: API key or playlists missing");
    }

    if readwise.can_use() {
        cycles.push((
            PollCycle::new(readwise, sink.clone(), state.clone()),
            BridgeConfig::interval(cfg.readwise.interval_minutes),
        ));
    } else {
        tracing::warn!("Readwise sync disabled: API token missing");
    }

    if feeds.can_operate() {
        cycles.push((
            PollCycle::new(feeds, sink.clone(), state),
            BridgeConfig::interval(cfg.rss.interval_minutes),
        ));
    } else {
        tracing::warn!("RSS sync disabled: no feeds configured");
    }

    Ok(Bridge {
        cycles,
        alerter,
        sink,
    })
}
