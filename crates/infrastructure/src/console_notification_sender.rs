//! Console notification sender for development. Logs messages to tracing output.

use async_trait::async_trait;
use bureau_application::{Notification, NotificationSender};
use bureau_core::AppResult;
use tracing::info;

/// Development sender that logs notifications instead of delivering them.
#[derive(Clone, Default)]
pub struct ConsoleNotificationSender;

impl ConsoleNotificationSender {
    /// Creates a new console sender.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSender for ConsoleNotificationSender {
    async fn send(&self, notification: Notification) -> AppResult<String> {
        let delivery_id = format!("console-{}", uuid::Uuid::new_v4());
        info!(
            tenant_id = %notification.tenant_id,
            recipient_id = %notification.recipient_id,
            channel = notification.channel.as_str(),
            correlation_id = %notification.correlation_id,
            delivery_id = delivery_id.as_str(),
            "--- NOTIFICATION (console) ---\nSubject: {}\n\n{}\n--- END NOTIFICATION ---",
            notification.subject.as_deref().unwrap_or("(none)"),
            notification.body
        );

        Ok(delivery_id)
    }
}
