use async_trait::async_trait;
use bureau_application::{Notification, NotificationSender};
use bureau_core::{AppError, AppResult};
use serde::Deserialize;
use tracing::{debug, info};

use crate::http_response::{checked, transport_error};

#[derive(Debug, Deserialize)]
struct DeliveryReceipt {
    delivery_id: Option<String>,
}

/// Delivers notifications by posting them to a provider webhook.
///
/// The provider fans out to e-mail, SMS or Telegram based on the `channel`
/// field and answers with an optional `delivery_id`.
#[derive(Clone)]
pub struct HttpNotificationSender {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpNotificationSender {
    /// Creates a sender posting to `endpoint`.
    pub fn new(http_client: reqwest::Client, endpoint: impl Into<String>) -> AppResult<Self> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(AppError::Validation(format!(
                "notification endpoint '{endpoint}' must be an http(s) url"
            )));
        }

        Ok(Self {
            http_client,
            endpoint,
        })
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send(&self, notification: Notification) -> AppResult<String> {
        let operation = "notification delivery";
        let response = self
            .http_client
            .post(self.endpoint.as_str())
            .header("X-Correlation-Id", notification.correlation_id.to_string())
            .json(&notification)
            .send()
            .await
            .map_err(|error| transport_error(&error, operation))?;
        let response = checked(response, operation).await?;

        let fallback_id = uuid::Uuid::new_v4().to_string();
        let delivery_id = match response.json::<DeliveryReceipt>().await {
            Ok(receipt) => receipt.delivery_id.unwrap_or(fallback_id),
            Err(error) => {
                debug!(error = %error, "notification provider returned no receipt body");
                fallback_id
            }
        };

        info!(
            tenant_id = %notification.tenant_id,
            recipient_id = %notification.recipient_id,
            channel = notification.channel.as_str(),
            delivery_id = delivery_id.as_str(),
            "notification delivered"
        );

        Ok(delivery_id)
    }
}

#[cfg(test)]
mod tests {
    use bureau_application::{Notification, NotificationChannel, NotificationSender};
    use bureau_core::{AppError, CorrelationId, TenantId, UserId};

    use super::HttpNotificationSender;

    #[test]
    fn endpoint_must_be_http() {
        let sender = HttpNotificationSender::new(reqwest::Client::new(), "ftp://example.test");
        assert!(matches!(sender, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let Ok(sender) =
            HttpNotificationSender::new(reqwest::Client::new(), "http://127.0.0.1:9/notify")
        else {
            panic!("endpoint should be accepted");
        };

        let result = sender
            .send(Notification {
                tenant_id: TenantId::new(),
                recipient_id: UserId::new(),
                channel: NotificationChannel::Email,
                subject: None,
                body: "Reminder".to_owned(),
                correlation_id: CorrelationId::new(),
            })
            .await;

        assert!(matches!(result, Err(AppError::Unavailable(_))));
    }
}
