use async_trait::async_trait;
use bureau_core::{AppResult, AutomationRuleId, TenantId, WorkflowExecutionId, WorkflowTemplateId};
use bureau_domain::{
    AutomationRule, ExecutionSource, ExecutionStatus, TriggerType, WorkflowExecution,
    WorkflowTemplate,
};
use chrono::{DateTime, Utc};

/// Workflow execution listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionListQuery {
    /// Optional template or rule filter.
    pub source: Option<ExecutionSource>,
    /// Optional status filter.
    pub status: Option<ExecutionStatus>,
    /// Page size.
    pub limit: usize,
    /// Row offset.
    pub offset: usize,
}

impl Default for ExecutionListQuery {
    fn default() -> Self {
        Self {
            source: None,
            status: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Repository port for workflow templates, executions and schedule slots.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Inserts or updates a template.
    ///
    /// Returns a conflict when another template of the tenant has the same name.
    async fn save_template(&self, template: WorkflowTemplate) -> AppResult<()>;

    /// Finds one template.
    async fn find_template(
        &self,
        tenant_id: TenantId,
        template_id: WorkflowTemplateId,
    ) -> AppResult<Option<WorkflowTemplate>>;

    /// Lists all templates of the tenant.
    async fn list_templates(&self, tenant_id: TenantId) -> AppResult<Vec<WorkflowTemplate>>;

    /// Lists active templates of one trigger type.
    async fn list_active_templates_for_trigger(
        &self,
        tenant_id: TenantId,
        trigger_type: TriggerType,
    ) -> AppResult<Vec<WorkflowTemplate>>;

    /// Lists tenants owning at least one active scheduled template.
    async fn list_tenants_with_active_schedules(&self) -> AppResult<Vec<TenantId>>;

    /// Claims the minute slot of a scheduled template.
    ///
    /// Returns false when the slot was already claimed.
    async fn claim_schedule_slot(
        &self,
        tenant_id: TenantId,
        template_id: WorkflowTemplateId,
        slot: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Persists a new execution.
    async fn create_execution(&self, execution: &WorkflowExecution) -> AppResult<()>;

    /// Persists the current state of an execution.
    async fn update_execution(&self, execution: &WorkflowExecution) -> AppResult<()>;

    /// Finds one execution.
    async fn find_execution(
        &self,
        tenant_id: TenantId,
        execution_id: WorkflowExecutionId,
    ) -> AppResult<Option<WorkflowExecution>>;

    /// Lists executions newest first.
    async fn list_executions(
        &self,
        tenant_id: TenantId,
        query: &ExecutionListQuery,
    ) -> AppResult<Vec<WorkflowExecution>>;
}

/// Repository port for event automation rules.
#[async_trait]
pub trait AutomationRuleRepository: Send + Sync {
    /// Inserts or updates a rule.
    async fn save_rule(&self, rule: AutomationRule) -> AppResult<()>;

    /// Finds one rule.
    async fn find_rule(
        &self,
        tenant_id: TenantId,
        rule_id: AutomationRuleId,
    ) -> AppResult<Option<AutomationRule>>;

    /// Lists all rules of the tenant.
    async fn list_rules(&self, tenant_id: TenantId) -> AppResult<Vec<AutomationRule>>;

    /// Lists active rules reacting to one event type.
    async fn list_active_rules_for_event(
        &self,
        tenant_id: TenantId,
        event_type: &str,
    ) -> AppResult<Vec<AutomationRule>>;

    /// Atomically claims a firing at `now`.
    ///
    /// Returns false while the cooldown is running, otherwise stores
    /// `last_triggered = now` and returns true.
    async fn claim_rule_firing(
        &self,
        tenant_id: TenantId,
        rule_id: AutomationRuleId,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;
}
