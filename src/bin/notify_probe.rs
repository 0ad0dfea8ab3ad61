//! Sends one test message through the configured Telegram sink (logs only under DRY_RUN).

use std::process::ExitCode;
use std::time::Duration;

use feed_relay::config::BridgeConfig;
use feed_relay::{http, logging, DeliverySink, TelegramSink};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cfg = BridgeConfig::from_lookup(|k| std::env::var(k).ok());
    logging::init(&cfg.log_level, cfg.log_format);

    let client = match http::build_client(Duration::from_secs(20), cfg.proxy_url.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = ?e, "cannot build HTTP client");
            return ExitCode::FAILURE;
        }
    };
    let sink = TelegramSink::new(client, cfg.telegram.bot_token, cfg.telegram.channel_id)
        .with_dry_run(cfg.dry_run);
    if !sink.can_operate() {
        tracing::error!("TELEGRAM_BOT_TOKEN / TELEGRAM_CHANNEL_ID not set");
        return ExitCode::FAILURE;
    }

    let text = format!("feed-relay probe @ {}", chrono::Utc::now().to_rfc3339());
    match sink.deliver(&text).await {
        Ok(()) => {
            println!("notify-probe done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = ?e, "probe send failed");
            ExitCode::FAILURE
        }
    }
}
