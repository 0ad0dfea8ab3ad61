//! feed-relay binary entrypoint.
//! Loads configuration, restores the delivery state and starts one poll loop per
//! configured source until Ctrl-C / SIGTERM.

use std::process::ExitCode;

use feed_relay::config::{validate, BridgeConfig};
use feed_relay::metrics::Metrics;
use feed_relay::poll::scheduler::spawn_poll_loop;
use feed_relay::{build_bridge, logging};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();

    let cfg = match BridgeConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            logging::init("info", Default::default());
            tracing::error!(error = ?e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&cfg.log_level, cfg.log_format);

    let report = validate(&cfg);
    for w in &report.warnings {
        tracing::warn!("{w}");
    }
    if !report.is_ok() {
        for e in &report.errors {
            tracing::error!("{e}");
        }
        return ExitCode::FAILURE;
    }

    match run(cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "fatal error starting bridge");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: BridgeConfig) -> anyhow::Result<()> {
    let metrics_addr = cfg.metrics_socket_addr()?;

    tracing::info!(
        dry_run = cfg.dry_run,
        state_file = %cfg.state_file.display(),
        youtube_interval_min = cfg.youtube.interval_minutes,
        youtube_playlists = cfg.youtube.playlists.len(),
        readwise_interval_min = cfg.readwise.interval_minutes,
        rss_interval_min = cfg.rss.interval_minutes,
        rss_feeds = cfg.rss.feeds.len(),
        "bridge starting"
    );

    let mut tasks = Vec::new();

    if let Some(addr) = metrics_addr {
        let metrics = Metrics::install()?;
        tasks.push(tokio::spawn(async move {
            if let Err(e) = metrics.serve(addr).await {
                tracing::error!(error = ?e, "metrics endpoint stopped");
            }
        }));
    } else {
        feed_relay::metrics::describe();
    }

    let bridge = build_bridge(&cfg).await?;
    if bridge.cycles.is_empty() {
        tracing::warn!("no source can run; idling until shutdown");
    }
    for (cycle, interval) in bridge.cycles {
        tracing::info!(source = %cycle.kind(), every = ?interval, "starting poll loop");
        tasks.push(spawn_poll_loop(cycle, interval, bridge.alerter.clone()));
    }

    shutdown_signal().await;
    tracing::info!("shutting down");
    for t in tasks {
        t.abort();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let term = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }
}
