use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bureau_core::{
    AppError, AppResult, AutomationRuleId, CorrelationId, NonEmptyString, TenantId, UserId,
    WorkflowExecutionId, WorkflowTemplateId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ConditionSet, CronSchedule};

/// Kind of trigger that starts a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Cron schedule evaluated by the worker ticker.
    Scheduled,
    /// Internal domain event.
    Event,
    /// Inbound webhook.
    Webhook,
    /// Explicit user request.
    Manual,
}

impl TriggerType {
    /// Returns stable trigger type value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Event => "event",
            Self::Webhook => "webhook",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for TriggerType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scheduled" => Ok(Self::Scheduled),
            "event" => Ok(Self::Event),
            "webhook" => Ok(Self::Webhook),
            "manual" => Ok(Self::Manual),
            _ => Err(AppError::Validation(format!(
                "unknown trigger type '{value}'"
            ))),
        }
    }
}

impl Display for TriggerType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Workflow trigger with its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowTrigger {
    /// Fires when the cron schedule matches a tick.
    Scheduled {
        /// Cron expression.
        cron: CronSchedule,
    },
    /// Fires on a matching domain event.
    Event {
        /// Event type such as `appointment.created`.
        event_type: String,
    },
    /// Fires on a webhook call carrying the hook key.
    Webhook {
        /// Tenant unique hook key.
        hook_key: String,
    },
    /// Fires on explicit request.
    Manual,
}

impl WorkflowTrigger {
    /// Returns the trigger kind.
    #[must_use]
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            Self::Scheduled { .. } => TriggerType::Scheduled,
            Self::Event { .. } => TriggerType::Event,
            Self::Webhook { .. } => TriggerType::Webhook,
            Self::Manual => TriggerType::Manual,
        }
    }

    /// Returns the event type of event triggers.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        match self {
            Self::Event { event_type } => Some(event_type.as_str()),
            _ => None,
        }
    }

    /// Returns the hook key of webhook triggers.
    #[must_use]
    pub fn hook_key(&self) -> Option<&str> {
        match self {
            Self::Webhook { hook_key } => Some(hook_key.as_str()),
            _ => None,
        }
    }

    /// Returns the schedule of scheduled triggers.
    #[must_use]
    pub fn schedule(&self) -> Option<&CronSchedule> {
        match self {
            Self::Scheduled { cron } => Some(cron),
            _ => None,
        }
    }

    fn validate(&self) -> AppResult<()> {
        match self {
            Self::Event { event_type } if event_type.trim().is_empty() => Err(
                AppError::Validation("event trigger requires an event_type".to_owned()),
            ),
            Self::Webhook { hook_key } if hook_key.trim().is_empty() => Err(
                AppError::Validation("webhook trigger requires a hook_key".to_owned()),
            ),
            _ => Ok(()),
        }
    }
}

/// One pipeline step: an executor type and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowAction {
    /// Registered executor type, e.g. `send_reminder`.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Executor parameters, always a JSON object.
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

impl WorkflowAction {
    /// Creates an action.
    #[must_use]
    pub fn new(action_type: impl Into<String>, params: Value) -> Self {
        Self {
            action_type: action_type.into(),
            params,
        }
    }
}

/// Validates the structural shape of an action pipeline.
///
/// Executor-specific parameter checks happen in the executor registry.
pub fn validate_actions(actions: &[WorkflowAction]) -> AppResult<()> {
    if actions.is_empty() {
        return Err(AppError::Validation(
            "workflow must include at least one action".to_owned(),
        ));
    }

    for (index, action) in actions.iter().enumerate() {
        if action.action_type.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "action {index} requires a type"
            )));
        }

        if !action.params.is_object() {
            return Err(AppError::Validation(format!(
                "action {index} ({}) params must be a JSON object",
                action.action_type
            )));
        }
    }

    Ok(())
}

/// Input payload used to construct a validated workflow template.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTemplateInput {
    /// Template name, unique per tenant.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Trigger configuration.
    pub trigger: WorkflowTrigger,
    /// Conditions evaluated against the trigger context.
    pub conditions: ConditionSet,
    /// Ordered action pipeline.
    pub actions: Vec<WorkflowAction>,
    /// Higher priority runs first within one tick.
    pub priority: i32,
    /// Whether the template starts active.
    pub is_active: bool,
}

/// Tenant-scoped workflow template. Disabled, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    id: WorkflowTemplateId,
    tenant_id: TenantId,
    name: NonEmptyString,
    description: Option<String>,
    trigger: WorkflowTrigger,
    conditions: ConditionSet,
    actions: Vec<WorkflowAction>,
    is_active: bool,
    priority: i32,
    created_by: UserId,
    created_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    /// Creates a validated workflow template.
    pub fn new(
        id: WorkflowTemplateId,
        tenant_id: TenantId,
        created_by: UserId,
        created_at: DateTime<Utc>,
        input: WorkflowTemplateInput,
    ) -> AppResult<Self> {
        let WorkflowTemplateInput {
            name,
            description,
            trigger,
            conditions,
            actions,
            priority,
            is_active,
        } = input;

        trigger.validate()?;
        validate_actions(&actions)?;
        let conditions = ConditionSet::new(conditions.conditions().to_vec())?;

        Ok(Self {
            id,
            tenant_id,
            name: NonEmptyString::new(name.trim())?,
            description: normalize_description(description),
            trigger,
            conditions,
            actions,
            is_active,
            priority,
            created_by,
            created_at,
        })
    }

    /// Returns the template id.
    #[must_use]
    pub fn id(&self) -> WorkflowTemplateId {
        self.id
    }

    /// Returns the tenant.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the template name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the trigger.
    #[must_use]
    pub fn trigger(&self) -> &WorkflowTrigger {
        &self.trigger
    }

    /// Returns the conditions.
    #[must_use]
    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    /// Returns the action pipeline.
    #[must_use]
    pub fn actions(&self) -> &[WorkflowAction] {
        &self.actions
    }

    /// Returns whether the template is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the priority.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the creator.
    #[must_use]
    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    /// Returns the creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Activates or deactivates the template.
    pub fn set_active(&mut self, is_active: bool) {
        self.is_active = is_active;
    }
}

pub(crate) fn normalize_description(description: Option<String>) -> Option<String> {
    description.and_then(|value| {
        let trimmed = value.trim().to_owned();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

/// Definition an execution was started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ExecutionSource {
    /// A workflow template.
    Template(WorkflowTemplateId),
    /// An automation rule.
    Rule(AutomationRuleId),
}

impl ExecutionSource {
    /// Returns stable source kind value.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Template(_) => "template",
            Self::Rule(_) => "rule",
        }
    }

    /// Returns the source id as a UUID.
    #[must_use]
    pub fn id(&self) -> uuid::Uuid {
        match self {
            Self::Template(id) => id.as_uuid(),
            Self::Rule(id) => id.as_uuid(),
        }
    }

    /// Rebuilds a source from its stored kind and id.
    pub fn from_parts(kind: &str, id: uuid::Uuid) -> AppResult<Self> {
        match kind {
            "template" => Ok(Self::Template(WorkflowTemplateId::from_uuid(id))),
            "rule" => Ok(Self::Rule(AutomationRuleId::from_uuid(id))),
            _ => Err(AppError::Validation(format!(
                "unknown execution source kind '{kind}'"
            ))),
        }
    }
}

impl Display for ExecutionSource {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.kind(), self.id())
    }
}

/// Lifecycle status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, not started.
    Pending,
    /// Pipeline in progress.
    Running,
    /// Every action succeeded.
    Completed,
    /// An action failed, retries were exhausted, or the run was cancelled.
    Failed,
}

impl ExecutionStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown workflow execution status '{value}'"
            ))),
        }
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns whether moving to `next` goes forward in the lifecycle.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

/// Result of one pipeline action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Position in the pipeline.
    pub index: usize,
    /// Executor type.
    pub action_type: String,
    /// Attempts used, at least one.
    pub attempts: u32,
    /// Executor output.
    pub output: Value,
}

/// Persisted workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Execution id.
    pub id: WorkflowExecutionId,
    /// Tenant.
    pub tenant_id: TenantId,
    /// Template or rule the execution was started from.
    pub source: ExecutionSource,
    /// Trigger kind.
    pub trigger_type: TriggerType,
    /// Context the trigger supplied.
    pub trigger_context: Value,
    /// Lifecycle status.
    pub status: ExecutionStatus,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Terminal time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Outputs of the actions that succeeded, in order.
    pub output: Vec<ActionOutcome>,
    /// Failure reason.
    pub error_message: Option<String>,
    /// Correlation id shared by all audit records of this execution.
    pub correlation_id: CorrelationId,
}

impl WorkflowExecution {
    /// Creates a pending execution.
    #[must_use]
    pub fn pending(
        tenant_id: TenantId,
        source: ExecutionSource,
        trigger_type: TriggerType,
        trigger_context: Value,
        correlation_id: CorrelationId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WorkflowExecutionId::new(),
            tenant_id,
            source,
            trigger_type,
            trigger_context,
            status: ExecutionStatus::Pending,
            started_at: now,
            completed_at: None,
            output: Vec::new(),
            error_message: None,
            correlation_id,
        }
    }

    /// Moves the execution to `running`.
    pub fn start(&mut self) -> AppResult<()> {
        self.transition(ExecutionStatus::Running)
    }

    /// Appends the output of one finished action.
    pub fn record_outcome(&mut self, outcome: ActionOutcome) -> AppResult<()> {
        if self.status != ExecutionStatus::Running {
            return Err(AppError::Conflict(format!(
                "execution '{}' is not running",
                self.id
            )));
        }

        self.output.push(outcome);
        Ok(())
    }

    /// Marks the execution as completed.
    pub fn complete(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.transition(ExecutionStatus::Completed)?;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Marks the execution as failed with a reason.
    pub fn fail(&mut self, now: DateTime<Utc>, reason: impl Into<String>) -> AppResult<()> {
        self.transition(ExecutionStatus::Failed)?;
        self.completed_at = Some(now);
        self.error_message = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, next: ExecutionStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "execution '{}' cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }

        self.status = next;
        Ok(())
    }
}

/// Internal domain event consumed by event triggers and automation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Event type such as `task.completed`.
    pub event_type: String,
    /// Event payload used as trigger context.
    pub payload: Value,
    /// Time the event happened.
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Creates an event occurring now.
    pub fn new(event_type: impl Into<String>, payload: Value) -> AppResult<Self> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(AppError::Validation(
                "event_type must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            event_type,
            payload,
            occurred_at: Utc::now(),
        })
    }
}
