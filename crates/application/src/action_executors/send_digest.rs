use std::sync::Arc;

use async_trait::async_trait;
use bureau_core::AppResult;
use serde::Deserialize;
use serde_json::{Value, json};

use super::params::{RecipientParams, interpolate};
use super::{ActionExecutor, ActionInvocation, ExecutorError, parse_params};
use crate::{AiSummarizer, Notification, NotificationChannel, NotificationSender, SummaryRequest};

const ACTION_TYPE: &str = "send_digest";
const DEFAULT_SUBJECT: &str = "Digest";

#[derive(Debug, Deserialize)]
struct SendDigestParams {
    #[serde(flatten)]
    recipient: RecipientParams,
    channel: NotificationChannel,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
}

impl SendDigestParams {
    fn parse(params: &Value) -> AppResult<Self> {
        let parsed: Self = parse_params(ACTION_TYPE, params)?;
        parsed.recipient.validate()?;
        Ok(parsed)
    }
}

/// Summarizes the outputs of earlier actions and sends the summary.
pub struct SendDigestExecutor {
    notifications: Arc<dyn NotificationSender>,
    summarizer: Arc<dyn AiSummarizer>,
}

impl SendDigestExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(
        notifications: Arc<dyn NotificationSender>,
        summarizer: Arc<dyn AiSummarizer>,
    ) -> Self {
        Self {
            notifications,
            summarizer,
        }
    }
}

#[async_trait]
impl ActionExecutor for SendDigestExecutor {
    fn action_type(&self) -> &'static str {
        ACTION_TYPE
    }

    fn validate_params(&self, params: &Value) -> AppResult<()> {
        SendDigestParams::parse(params).map(|_| ())
    }

    fn requires_previous_outputs(&self) -> bool {
        true
    }

    async fn execute(&self, invocation: ActionInvocation<'_>) -> Result<Value, ExecutorError> {
        let params = SendDigestParams::parse(invocation.params)?;
        if invocation.previous_outputs.is_empty() {
            return Err(ExecutorError::Fatal(
                "send_digest has no earlier outputs to summarize".to_owned(),
            ));
        }

        let recipient_id = params.recipient.resolve(invocation.trigger_context)?;
        let sections = invocation
            .previous_outputs
            .iter()
            .map(|outcome| format!("{}: {}", outcome.action_type, outcome.output))
            .collect::<Vec<_>>()
            .join("\n");

        let summary = self
            .summarizer
            .summarize(SummaryRequest {
                tenant_id: invocation.context.tenant_id(),
                text: sections,
                instructions: params.instructions,
            })
            .await?;

        let subject = params
            .subject
            .as_deref()
            .map_or_else(
                || DEFAULT_SUBJECT.to_owned(),
                |subject| interpolate(subject, invocation.trigger_context),
            );

        let delivery_id = self
            .notifications
            .send(Notification {
                tenant_id: invocation.context.tenant_id(),
                recipient_id,
                channel: params.channel,
                subject: Some(subject),
                body: summary.clone(),
                correlation_id: invocation.context.correlation_id(),
            })
            .await?;

        Ok(json!({
            "delivery_id": delivery_id,
            "recipient_id": recipient_id,
            "summary": summary,
        }))
    }
}
