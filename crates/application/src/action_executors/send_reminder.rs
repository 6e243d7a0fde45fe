use std::sync::Arc;

use async_trait::async_trait;
use bureau_core::{AppError, AppResult};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::params::{RecipientParams, interpolate};
use super::{ActionExecutor, ActionInvocation, ExecutorError, parse_params};
use crate::{Notification, NotificationChannel, NotificationSender};

const ACTION_TYPE: &str = "send_reminder";

#[derive(Debug, Deserialize)]
struct SendReminderParams {
    #[serde(flatten)]
    recipient: RecipientParams,
    channel: NotificationChannel,
    #[serde(default)]
    subject: Option<String>,
    message: String,
}

impl SendReminderParams {
    fn parse(params: &Value) -> AppResult<Self> {
        let parsed: Self = parse_params(ACTION_TYPE, params)?;
        parsed.recipient.validate()?;
        if parsed.message.trim().is_empty() {
            return Err(AppError::Validation(
                "send_reminder message must not be empty".to_owned(),
            ));
        }
        Ok(parsed)
    }
}

/// Sends a templated reminder to one user.
pub struct SendReminderExecutor {
    notifications: Arc<dyn NotificationSender>,
}

impl SendReminderExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(notifications: Arc<dyn NotificationSender>) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl ActionExecutor for SendReminderExecutor {
    fn action_type(&self) -> &'static str {
        ACTION_TYPE
    }

    fn validate_params(&self, params: &Value) -> AppResult<()> {
        SendReminderParams::parse(params).map(|_| ())
    }

    async fn execute(&self, invocation: ActionInvocation<'_>) -> Result<Value, ExecutorError> {
        let params = SendReminderParams::parse(invocation.params)?;
        let recipient_id = params.recipient.resolve(invocation.trigger_context)?;
        let body = interpolate(&params.message, invocation.trigger_context);
        let subject = params
            .subject
            .as_deref()
            .map(|subject| interpolate(subject, invocation.trigger_context));

        let delivery_id = self
            .notifications
            .send(Notification {
                tenant_id: invocation.context.tenant_id(),
                recipient_id,
                channel: params.channel,
                subject,
                body,
                correlation_id: invocation.context.correlation_id(),
            })
            .await?;

        debug!(
            tenant_id = %invocation.context.tenant_id(),
            recipient_id = %recipient_id,
            channel = params.channel.as_str(),
            delivery_id = %delivery_id,
            "reminder sent"
        );

        Ok(json!({
            "delivery_id": delivery_id,
            "recipient_id": recipient_id,
            "channel": params.channel,
        }))
    }
}
