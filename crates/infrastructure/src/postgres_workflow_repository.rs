use async_trait::async_trait;
use bureau_application::{ExecutionListQuery, WorkflowRepository};
use bureau_core::{AppError, AppResult, TenantId, WorkflowExecutionId, WorkflowTemplateId};
use bureau_domain::{TriggerType, WorkflowExecution, WorkflowTemplate};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::postgres_errors::store_error;

mod executions;
mod templates;

/// PostgreSQL-backed repository for workflow templates, executions and
/// schedule slot claims.
#[derive(Clone)]
pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    /// Creates a workflow repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct TenantRow {
    tenant_id: uuid::Uuid,
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn save_template(&self, template: WorkflowTemplate) -> AppResult<()> {
        self.save_template_impl(template).await
    }

    async fn find_template(
        &self,
        tenant_id: TenantId,
        template_id: WorkflowTemplateId,
    ) -> AppResult<Option<WorkflowTemplate>> {
        self.find_template_impl(tenant_id, template_id).await
    }

    async fn list_templates(&self, tenant_id: TenantId) -> AppResult<Vec<WorkflowTemplate>> {
        self.list_templates_impl(tenant_id, None).await
    }

    async fn list_active_templates_for_trigger(
        &self,
        tenant_id: TenantId,
        trigger_type: TriggerType,
    ) -> AppResult<Vec<WorkflowTemplate>> {
        self.list_templates_impl(tenant_id, Some(trigger_type)).await
    }

    async fn list_tenants_with_active_schedules(&self) -> AppResult<Vec<TenantId>> {
        let rows = sqlx::query_as::<_, TenantRow>(
            r#"
            SELECT DISTINCT tenant_id
            FROM workflow_templates
            WHERE is_active AND trigger_type = 'scheduled'
            ORDER BY tenant_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error(error, "list tenants with scheduled workflows"))?;

        Ok(rows
            .into_iter()
            .map(|row| TenantId::from_uuid(row.tenant_id))
            .collect())
    }

    async fn claim_schedule_slot(
        &self,
        tenant_id: TenantId,
        template_id: WorkflowTemplateId,
        slot: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO workflow_schedule_slots (tenant_id, template_id, slot)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, template_id, slot) DO NOTHING
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(template_id.as_uuid())
        .bind(slot)
        .execute(&self.pool)
        .await
        .map_err(|error| store_error(error, "claim workflow schedule slot"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn create_execution(&self, execution: &WorkflowExecution) -> AppResult<()> {
        self.create_execution_impl(execution).await
    }

    async fn update_execution(&self, execution: &WorkflowExecution) -> AppResult<()> {
        self.update_execution_impl(execution).await
    }

    async fn find_execution(
        &self,
        tenant_id: TenantId,
        execution_id: WorkflowExecutionId,
    ) -> AppResult<Option<WorkflowExecution>> {
        self.find_execution_impl(tenant_id, execution_id).await
    }

    async fn list_executions(
        &self,
        tenant_id: TenantId,
        query: &ExecutionListQuery,
    ) -> AppResult<Vec<WorkflowExecution>> {
        self.list_executions_impl(tenant_id, query).await
    }
}

fn json_column<T: serde::Serialize>(value: &T, column: &str) -> AppResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|error| AppError::Internal(format!("failed to encode {column}: {error}")))
}

fn from_json_column<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    column: &str,
) -> AppResult<T> {
    serde_json::from_value(value)
        .map_err(|error| AppError::Internal(format!("failed to decode stored {column}: {error}")))
}
