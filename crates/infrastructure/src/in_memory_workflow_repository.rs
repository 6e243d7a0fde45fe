use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bureau_application::{ExecutionListQuery, WorkflowRepository};
use bureau_core::{AppError, AppResult, TenantId, WorkflowExecutionId, WorkflowTemplateId};
use bureau_domain::{TriggerType, WorkflowExecution, WorkflowTemplate};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Claims of the newest evaluated minute; older minutes are forgotten.
#[derive(Debug, Default)]
struct ScheduleSlots {
    minute: Option<DateTime<Utc>>,
    claimed: HashSet<(TenantId, WorkflowTemplateId)>,
}

/// In-memory workflow repository for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    templates: RwLock<HashMap<(TenantId, WorkflowTemplateId), WorkflowTemplate>>,
    executions: RwLock<Vec<WorkflowExecution>>,
    slots: RwLock<ScheduleSlots>,
}

impl InMemoryWorkflowRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_priority(templates: &mut [WorkflowTemplate]) {
    templates.sort_by(|left, right| {
        right
            .priority()
            .cmp(&left.priority())
            .then_with(|| left.name().as_str().cmp(right.name().as_str()))
    });
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save_template(&self, template: WorkflowTemplate) -> AppResult<()> {
        let mut templates = self.templates.write().await;
        let name_taken = templates.values().any(|stored| {
            stored.tenant_id() == template.tenant_id()
                && stored.id() != template.id()
                && stored.name() == template.name()
        });
        if name_taken {
            return Err(AppError::Conflict(format!(
                "workflow template '{}' already exists",
                template.name().as_str()
            )));
        }

        templates.insert((template.tenant_id(), template.id()), template);
        Ok(())
    }

    async fn find_template(
        &self,
        tenant_id: TenantId,
        template_id: WorkflowTemplateId,
    ) -> AppResult<Option<WorkflowTemplate>> {
        Ok(self
            .templates
            .read()
            .await
            .get(&(tenant_id, template_id))
            .cloned())
    }

    async fn list_templates(&self, tenant_id: TenantId) -> AppResult<Vec<WorkflowTemplate>> {
        let mut values = self
            .templates
            .read()
            .await
            .values()
            .filter(|template| template.tenant_id() == tenant_id)
            .cloned()
            .collect::<Vec<_>>();
        by_priority(&mut values);
        Ok(values)
    }

    async fn list_active_templates_for_trigger(
        &self,
        tenant_id: TenantId,
        trigger_type: TriggerType,
    ) -> AppResult<Vec<WorkflowTemplate>> {
        let mut values = self
            .templates
            .read()
            .await
            .values()
            .filter(|template| {
                template.tenant_id() == tenant_id
                    && template.is_active()
                    && template.trigger().trigger_type() == trigger_type
            })
            .cloned()
            .collect::<Vec<_>>();
        by_priority(&mut values);
        Ok(values)
    }

    async fn list_tenants_with_active_schedules(&self) -> AppResult<Vec<TenantId>> {
        let mut tenants = self
            .templates
            .read()
            .await
            .values()
            .filter(|template| {
                template.is_active()
                    && template.trigger().trigger_type() == TriggerType::Scheduled
            })
            .map(WorkflowTemplate::tenant_id)
            .collect::<Vec<_>>();
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }

    async fn claim_schedule_slot(
        &self,
        tenant_id: TenantId,
        template_id: WorkflowTemplateId,
        slot: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut slots = self.slots.write().await;
        match slots.minute {
            Some(minute) if slot < minute => return Ok(false),
            Some(minute) if slot == minute => {}
            _ => {
                slots.minute = Some(slot);
                slots.claimed.clear();
            }
        }

        Ok(slots.claimed.insert((tenant_id, template_id)))
    }

    async fn create_execution(&self, execution: &WorkflowExecution) -> AppResult<()> {
        let mut executions = self.executions.write().await;
        if executions.iter().any(|stored| stored.id == execution.id) {
            return Err(AppError::Conflict(format!(
                "workflow execution '{}' already exists",
                execution.id
            )));
        }

        executions.push(execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> AppResult<()> {
        let mut executions = self.executions.write().await;
        let stored = executions
            .iter_mut()
            .find(|stored| stored.id == execution.id && stored.tenant_id == execution.tenant_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("workflow execution '{}' not found", execution.id))
            })?;
        *stored = execution.clone();
        Ok(())
    }

    async fn find_execution(
        &self,
        tenant_id: TenantId,
        execution_id: WorkflowExecutionId,
    ) -> AppResult<Option<WorkflowExecution>> {
        Ok(self
            .executions
            .read()
            .await
            .iter()
            .find(|execution| execution.id == execution_id && execution.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_executions(
        &self,
        tenant_id: TenantId,
        query: &ExecutionListQuery,
    ) -> AppResult<Vec<WorkflowExecution>> {
        let executions = self.executions.read().await;
        let mut matching = executions
            .iter()
            .filter(|execution| {
                execution.tenant_id == tenant_id
                    && query.source.is_none_or(|source| source == execution.source)
                    && query.status.is_none_or(|status| status == execution.status)
            })
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|left, right| right.started_at.cmp(&left.started_at));

        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }
}

#[cfg(test)]
mod tests;
