pub mod alert;
pub mod telegram;

use anyhow::Result;

pub use alert::Alerter;
pub use telegram::TelegramSink;

/// Outbound chat channel for formatted item messages.
#[async_trait::async_trait]
pub trait DeliverySink: Send + Sync {
    fn can_operate(&self) -> bool;

    async fn deliver(&self, text: &str) -> Result<()>;
}
