use std::str::FromStr;

use bureau_core::CorrelationId;
use bureau_domain::{ActionOutcome, ExecutionSource, ExecutionStatus};
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};

use super::*;

#[derive(Debug, FromRow)]
struct WorkflowExecutionRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    source_kind: String,
    source_id: uuid::Uuid,
    trigger_type: String,
    trigger_context: Value,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    output: Value,
    error_message: Option<String>,
    correlation_id: uuid::Uuid,
}

const EXECUTION_COLUMNS: &str = r#"
    id, tenant_id, source_kind, source_id, trigger_type, trigger_context, status,
    started_at, completed_at, output, error_message, correlation_id
"#;

impl PostgresWorkflowRepository {
    pub(super) async fn create_execution_impl(
        &self,
        execution: &WorkflowExecution,
    ) -> AppResult<()> {
        let output = json_column(&execution.output, "workflow execution output")?;

        sqlx::query(
            r#"
            INSERT INTO workflow_executions (
                id, tenant_id, source_kind, source_id, trigger_type, trigger_context, status,
                started_at, completed_at, output, error_message, correlation_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(execution.id.as_uuid())
        .bind(execution.tenant_id.as_uuid())
        .bind(execution.source.kind())
        .bind(execution.source.id())
        .bind(execution.trigger_type.as_str())
        .bind(execution.trigger_context.clone())
        .bind(execution.status.as_str())
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(output)
        .bind(execution.error_message.clone())
        .bind(execution.correlation_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| store_error(error, "create workflow execution"))?;

        Ok(())
    }

    pub(super) async fn update_execution_impl(
        &self,
        execution: &WorkflowExecution,
    ) -> AppResult<()> {
        let output = json_column(&execution.output, "workflow execution output")?;

        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $3, completed_at = $4, output = $5, error_message = $6
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(execution.tenant_id.as_uuid())
        .bind(execution.id.as_uuid())
        .bind(execution.status.as_str())
        .bind(execution.completed_at)
        .bind(output)
        .bind(execution.error_message.clone())
        .execute(&self.pool)
        .await
        .map_err(|error| store_error(error, "update workflow execution"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "workflow execution '{}' not found",
                execution.id
            )));
        }

        Ok(())
    }

    pub(super) async fn find_execution_impl(
        &self,
        tenant_id: TenantId,
        execution_id: WorkflowExecutionId,
    ) -> AppResult<Option<WorkflowExecution>> {
        let row = sqlx::query_as::<_, WorkflowExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(execution_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error(error, "find workflow execution"))?;

        row.map(execution_from_row).transpose()
    }

    pub(super) async fn list_executions_impl(
        &self,
        tenant_id: TenantId,
        query: &ExecutionListQuery,
    ) -> AppResult<Vec<WorkflowExecution>> {
        let limit = i64::try_from(query.limit).map_err(|error| {
            AppError::Validation(format!("invalid workflow execution limit: {error}"))
        })?;
        let offset = i64::try_from(query.offset).map_err(|error| {
            AppError::Validation(format!("invalid workflow execution offset: {error}"))
        })?;

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT ");
        builder.push(EXECUTION_COLUMNS);
        builder.push(" FROM workflow_executions WHERE tenant_id = ");
        builder.push_bind(tenant_id.as_uuid());

        if let Some(source) = query.source {
            builder.push(" AND source_kind = ");
            builder.push_bind(source.kind());
            builder.push(" AND source_id = ");
            builder.push_bind(source.id());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }

        builder.push(" ORDER BY started_at DESC, id LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows = builder
            .build_query_as::<WorkflowExecutionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| store_error(error, "list workflow executions"))?;

        rows.into_iter().map(execution_from_row).collect()
    }
}

fn execution_from_row(row: WorkflowExecutionRow) -> AppResult<WorkflowExecution> {
    Ok(WorkflowExecution {
        id: WorkflowExecutionId::from_uuid(row.id),
        tenant_id: TenantId::from_uuid(row.tenant_id),
        source: ExecutionSource::from_parts(row.source_kind.as_str(), row.source_id)?,
        trigger_type: TriggerType::from_str(row.trigger_type.as_str())?,
        trigger_context: row.trigger_context,
        status: ExecutionStatus::parse(row.status.as_str())?,
        started_at: row.started_at,
        completed_at: row.completed_at,
        output: from_json_column::<Vec<ActionOutcome>>(row.output, "workflow execution output")?,
        error_message: row.error_message,
        correlation_id: CorrelationId::from_uuid(row.correlation_id),
    })
}
