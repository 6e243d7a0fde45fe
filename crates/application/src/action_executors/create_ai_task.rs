use std::sync::Arc;

use async_trait::async_trait;
use bureau_core::{AppError, AppResult, UserId};
use bureau_domain::{AuditAction, AuditEvent, Permission, ResourceType, lookup_path};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::params::interpolate;
use super::{ActionExecutor, ActionInvocation, ExecutorError, parse_params};
use crate::{AccessFilter, AiSummarizer, NewTask, OfficeRecordStore, SummaryRequest};

const ACTION_TYPE: &str = "create_ai_task";
const DEFAULT_TITLE: &str = "Automated follow-up";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateAiTaskParams {
    source_field: String,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    assignee_field: Option<String>,
    #[serde(default)]
    due_in_hours: Option<u32>,
}

impl CreateAiTaskParams {
    fn parse(params: &Value) -> AppResult<Self> {
        let parsed: Self = parse_params(ACTION_TYPE, params)?;
        if parsed.source_field.trim().is_empty() {
            return Err(AppError::Validation(
                "create_ai_task source_field must not be empty".to_owned(),
            ));
        }
        if parsed.due_in_hours == Some(0) {
            return Err(AppError::Validation(
                "create_ai_task due_in_hours must be positive".to_owned(),
            ));
        }
        Ok(parsed)
    }
}

/// Summarizes a trigger field and files the summary as a follow-up task.
pub struct CreateAiTaskExecutor {
    access_filter: AccessFilter,
    summarizer: Arc<dyn AiSummarizer>,
    records: Arc<dyn OfficeRecordStore>,
}

impl CreateAiTaskExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(
        access_filter: AccessFilter,
        summarizer: Arc<dyn AiSummarizer>,
        records: Arc<dyn OfficeRecordStore>,
    ) -> Self {
        Self {
            access_filter,
            summarizer,
            records,
        }
    }
}

#[async_trait]
impl ActionExecutor for CreateAiTaskExecutor {
    fn action_type(&self) -> &'static str {
        ACTION_TYPE
    }

    fn validate_params(&self, params: &Value) -> AppResult<()> {
        CreateAiTaskParams::parse(params).map(|_| ())
    }

    async fn execute(&self, invocation: ActionInvocation<'_>) -> Result<Value, ExecutorError> {
        let params = CreateAiTaskParams::parse(invocation.params)?;
        let context = invocation.context;
        self.access_filter
            .authorization()
            .require_permission(context, Permission::TaskCreate)
            .await?;

        let source_text = match lookup_path(invocation.trigger_context, &params.source_field) {
            Some(Value::String(text)) if !text.trim().is_empty() => text.clone(),
            Some(Value::Null) | None => {
                return Err(ExecutorError::Fatal(format!(
                    "trigger context has no text at '{}'",
                    params.source_field
                )));
            }
            Some(Value::String(_)) => {
                return Err(ExecutorError::Fatal(format!(
                    "trigger context field '{}' is blank",
                    params.source_field
                )));
            }
            Some(other) => other.to_string(),
        };

        let assignee_id = match params.assignee_field.as_deref() {
            Some(field) => lookup_path(invocation.trigger_context, field)
                .and_then(Value::as_str)
                .map(UserId::parse)
                .transpose()?,
            None => None,
        };

        let summary = self
            .summarizer
            .summarize(SummaryRequest {
                tenant_id: context.tenant_id(),
                text: source_text,
                instructions: params.instructions,
            })
            .await?;

        let title = params
            .title
            .as_deref()
            .map(|title| interpolate(title, invocation.trigger_context))
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_owned());

        let task = self
            .records
            .create_task(
                context.tenant_id(),
                NewTask {
                    title,
                    description: summary.clone(),
                    owner_id: context.user_id(),
                    assignee_id,
                    due_at: params
                        .due_in_hours
                        .map(|hours| Utc::now() + Duration::hours(i64::from(hours))),
                },
            )
            .await?;

        self.access_filter
            .authorization()
            .audit()
            .record(
                context,
                AuditEvent::new(AuditAction::Create, ResourceType::Task.as_str())
                    .with_resource_id(task.id)
                    .with_new_values(json!({
                        "title": task.attributes["title"],
                        "assignee_id": assignee_id,
                    })),
            )
            .await?;

        info!(
            tenant_id = %context.tenant_id(),
            task_id = %task.id,
            correlation_id = %context.correlation_id(),
            "automation created follow-up task"
        );

        Ok(json!({
            "task_id": task.id,
            "assignee_id": assignee_id,
            "summary": summary,
        }))
    }
}
