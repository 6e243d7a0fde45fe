use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bureau_core::{AppError, AppResult};
use bureau_domain::{ActionOutcome, WorkflowAction};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::{AccessFilter, AiSummarizer, NotificationSender, OfficeRecordStore, RequestContext};

mod aggregate_records;
mod create_ai_task;
mod find_appointments;
mod params;
mod send_digest;
mod send_reminder;

pub use aggregate_records::AggregateRecordsExecutor;
pub use create_ai_task::CreateAiTaskExecutor;
pub use find_appointments::FindAppointmentsExecutor;
pub use send_digest::SendDigestExecutor;
pub use send_reminder::SendReminderExecutor;

/// Failure of one action attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// Retrying the action may succeed.
    #[error("transient failure: {0}")]
    Transient(String),
    /// Retrying cannot help.
    #[error("fatal failure: {0}")]
    Fatal(String),
}

impl ExecutorError {
    /// Returns whether the failure is retryable.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<AppError> for ExecutorError {
    fn from(value: AppError) -> Self {
        if value.is_transient() {
            Self::Transient(value.to_string())
        } else {
            Self::Fatal(value.to_string())
        }
    }
}

/// Everything one action attempt may read.
#[derive(Debug, Clone, Copy)]
pub struct ActionInvocation<'a> {
    /// Context the pipeline runs under.
    pub context: &'a RequestContext,
    /// Action parameters.
    pub params: &'a Value,
    /// Context the trigger supplied.
    pub trigger_context: &'a Value,
    /// Outputs of earlier actions of the same execution.
    pub previous_outputs: &'a [ActionOutcome],
}

/// Typed executor for one action type.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Returns the action type string the executor is registered under.
    fn action_type(&self) -> &'static str;

    /// Validates parameters when a template or rule is created.
    fn validate_params(&self, params: &Value) -> AppResult<()>;

    /// Returns whether the action consumes outputs of earlier actions.
    fn requires_previous_outputs(&self) -> bool {
        false
    }

    /// Runs one attempt of the action.
    async fn execute(&self, invocation: ActionInvocation<'_>) -> Result<Value, ExecutorError>;
}

/// Registry mapping action type strings to executors.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: BTreeMap<&'static str, Arc<dyn ActionExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in executors.
    #[must_use]
    pub fn with_default_executors(
        access_filter: AccessFilter,
        notifications: Arc<dyn NotificationSender>,
        summarizer: Arc<dyn AiSummarizer>,
        records: Arc<dyn OfficeRecordStore>,
    ) -> Self {
        Self::new()
            .register(Arc::new(SendReminderExecutor::new(notifications.clone())))
            .register(Arc::new(FindAppointmentsExecutor::new(
                access_filter.clone(),
                records.clone(),
            )))
            .register(Arc::new(CreateAiTaskExecutor::new(
                access_filter.clone(),
                summarizer.clone(),
                records.clone(),
            )))
            .register(Arc::new(AggregateRecordsExecutor::new(
                access_filter,
                records,
            )))
            .register(Arc::new(SendDigestExecutor::new(notifications, summarizer)))
    }

    /// Registers an executor, replacing one with the same action type.
    #[must_use]
    pub fn register(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executors.insert(executor.action_type(), executor);
        self
    }

    /// Returns the executor of one action type.
    #[must_use]
    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionExecutor>> {
        self.executors.get(action_type).cloned()
    }

    /// Returns the registered action types in order.
    #[must_use]
    pub fn action_types(&self) -> Vec<&'static str> {
        self.executors.keys().copied().collect()
    }

    /// Validates a pipeline against the registered executors.
    pub fn validate_actions(&self, actions: &[WorkflowAction]) -> AppResult<()> {
        bureau_domain::validate_actions(actions)?;

        for (index, action) in actions.iter().enumerate() {
            let executor = self.get(action.action_type.as_str()).ok_or_else(|| {
                AppError::Validation(format!(
                    "action {index} has unknown type '{}' (known: {})",
                    action.action_type,
                    self.action_types().join(", ")
                ))
            })?;

            executor.validate_params(&action.params).map_err(|error| {
                AppError::Validation(format!(
                    "action {index} ({}) has invalid params: {error}",
                    action.action_type
                ))
            })?;

            if index == 0 && executor.requires_previous_outputs() {
                return Err(AppError::Validation(format!(
                    "action {index} ({}) needs an earlier action to consume",
                    action.action_type
                )));
            }
        }

        Ok(())
    }
}

pub(crate) fn parse_params<T: DeserializeOwned>(action_type: &str, params: &Value) -> AppResult<T> {
    serde_json::from_value(params.clone())
        .map_err(|error| AppError::Validation(format!("{action_type} params: {error}")))
}
