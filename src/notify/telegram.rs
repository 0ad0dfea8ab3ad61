use anyhow::{anyhow, bail, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::DeliverySink;
use crate::format::bound_message;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
/// Bot API limit for `sendMessage` text, in characters.
pub const TELEGRAM_MAX_CHARS: usize = 4096;

#[derive(Clone)]
pub struct TelegramSink {
    client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
    dry_run: bool,
    timeout: Duration,
    max_retries: u8,
    backoff_base: Duration,
}

impl TelegramSink {
    pub fn new(client: Client, bot_token: String, chat_id: String) -> Self {
        Self {
            client,
            base_url: TELEGRAM_API_BASE.to_string(),
            bot_token,
            chat_id,
            dry_run: false,
            timeout: Duration::from_secs(20),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn has_credentials(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }

    /// Send `text` to an arbitrary chat (used by alerts); retries transport and
    /// non-2xx failures with exponential backoff.
    pub async fn send_to(&self, chat_id: &str, text: &str) -> Result<()> {
        let text = bound_message(text, TELEGRAM_MAX_CHARS);

        if self.dry_run {
            tracing::info!(preview = %text, "DRY_RUN enabled: skipping Telegram send");
            return Ok(());
        }
        if !self.has_credentials() || chat_id.is_empty() {
            bail!("Telegram bot token or chat id missing");
        }

        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let payload = SendMessage {
            chat_id,
            text: &text,
            disable_web_page_preview: false,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Telegram HTTP error: {}", e.without_url()),
                },
                Err(e) => anyhow!("Telegram request failed: {}", e.without_url()),
            };

            tracing::warn!(attempt, max = self.max_retries, error = %err, "Telegram send failed");
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(self.backoff_base * (1u32 << (attempt - 1))).await;
        }
    }
}

#[async_trait::async_trait]
impl DeliverySink for TelegramSink {
    fn can_operate(&self) -> bool {
        self.dry_run || self.has_credentials()
    }

    async fn deliver(&self, text: &str) -> Result<()> {
        self.send_to(&self.chat_id, text).await
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}
