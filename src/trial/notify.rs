//! Outbound notification seam.

use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Sends an email-style message to a merchant contact.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Notification`] if the message was not accepted.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Gateway that only logs messages. Always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationGateway for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to, subject, body_len = body.len(), "Notification (log only)");
        Ok(())
    }
}
