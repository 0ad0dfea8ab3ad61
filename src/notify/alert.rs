// src/notify/alert.rs
use std::sync::Arc;

use super::TelegramSink;
use crate::format::truncate_chars;

const ALERT_MAX_CHARS: usize = 3500;

/// Operational alerts (failed cycles) sent to a separate chat. Never fails.
#[derive(Clone)]
pub struct Alerter {
    sink: Option<Arc<TelegramSink>>,
    chat_id: String,
}

impl Alerter {
    pub fn new(sink: Arc<TelegramSink>, chat_id: impl Into<String>) -> Self {
        Self {
            sink: Some(sink),
            chat_id: chat_id.into(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            sink: None,
            chat_id: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some() && !self.chat_id.is_empty()
    }

    pub fn alert_text(text: &str) -> String {
        format!("⚠️ Bridge alert\n{}", truncate_chars(text, ALERT_MAX_CHARS))
    }

    pub async fn send_alert(&self, text: &str) {
        let Some(sink) = self.sink.as_ref().filter(|_| !self.chat_id.is_empty()) else {
            tracing::warn!(alert = %text, "alert skipped (disabled or Telegram not configured)");
            return;
        };
        if let Err(e) = sink.send_to(&self.chat_id, &Self::alert_text(text)).await {
            tracing::error!(error = %e, "failed to send alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_text_is_prefixed_and_bounded() {
        let long = "x".repeat(5000);
        let out = Alerter::alert_text(&long);
        assert!(out.starts_with("⚠️ Bridge alert\n"));
        assert!(out.chars().count() <= ALERT_MAX_CHARS + "⚠️ Bridge alert\n".chars().count());
    }

    #[tokio::test]
    async fn disabled_alerter_is_a_noop() {
        let a = Alerter::disabled();
        assert!(!a.is_enabled());
        a.send_alert("state write failed").await;
    }
}
