mod telegram;

use async_trait::async_trait;

use crate::Result;

pub use telegram::{BotInfo, TelegramPublisher};

/// Outbound channel for formatted messages.
///
/// Implementations retry transient failures themselves; an error returned
/// from `publish` means the message was not delivered.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str) -> Result<()>;
}
