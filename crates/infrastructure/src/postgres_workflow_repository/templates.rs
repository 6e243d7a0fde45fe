use bureau_core::UserId;
use bureau_domain::{ConditionSet, WorkflowAction, WorkflowTemplateInput, WorkflowTrigger};
use serde_json::Value;

use crate::postgres_errors::is_unique_violation;

use super::*;

#[derive(Debug, FromRow)]
struct WorkflowTemplateRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    name: String,
    description: Option<String>,
    trigger_config: Value,
    conditions: Value,
    actions: Value,
    is_active: bool,
    priority: i32,
    created_by: uuid::Uuid,
    created_at: DateTime<Utc>,
}

impl PostgresWorkflowRepository {
    pub(super) async fn save_template_impl(&self, template: WorkflowTemplate) -> AppResult<()> {
        let trigger_config = json_column(template.trigger(), "workflow trigger")?;
        let conditions = json_column(template.conditions(), "workflow conditions")?;
        let actions = json_column(&template.actions(), "workflow actions")?;

        let result = sqlx::query(
            r#"
            INSERT INTO workflow_templates (
                id, tenant_id, name, description, trigger_type, trigger_config,
                conditions, actions, is_active, priority, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now())
            ON CONFLICT (id)
            DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                trigger_type = EXCLUDED.trigger_type,
                trigger_config = EXCLUDED.trigger_config,
                conditions = EXCLUDED.conditions,
                actions = EXCLUDED.actions,
                is_active = EXCLUDED.is_active,
                priority = EXCLUDED.priority,
                updated_at = now()
            WHERE workflow_templates.tenant_id = EXCLUDED.tenant_id
            "#,
        )
        .bind(template.id().as_uuid())
        .bind(template.tenant_id().as_uuid())
        .bind(template.name().as_str())
        .bind(template.description())
        .bind(template.trigger().trigger_type().as_str())
        .bind(trigger_config)
        .bind(conditions)
        .bind(actions)
        .bind(template.is_active())
        .bind(template.priority())
        .bind(template.created_by().as_uuid())
        .bind(template.created_at())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(AppError::Conflict(format!(
                "workflow template '{}' already exists",
                template.name().as_str()
            ))),
            Err(error) => Err(store_error(error, "save workflow template")),
        }
    }

    pub(super) async fn find_template_impl(
        &self,
        tenant_id: TenantId,
        template_id: WorkflowTemplateId,
    ) -> AppResult<Option<WorkflowTemplate>> {
        let row = sqlx::query_as::<_, WorkflowTemplateRow>(
            r#"
            SELECT id, tenant_id, name, description, trigger_config, conditions, actions,
                   is_active, priority, created_by, created_at
            FROM workflow_templates
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(template_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error(error, "find workflow template"))?;

        row.map(template_from_row).transpose()
    }

    pub(super) async fn list_templates_impl(
        &self,
        tenant_id: TenantId,
        active_trigger: Option<TriggerType>,
    ) -> AppResult<Vec<WorkflowTemplate>> {
        let rows = sqlx::query_as::<_, WorkflowTemplateRow>(
            r#"
            SELECT id, tenant_id, name, description, trigger_config, conditions, actions,
                   is_active, priority, created_by, created_at
            FROM workflow_templates
            WHERE tenant_id = $1
              AND ($2::TEXT IS NULL OR (is_active AND trigger_type = $2))
            ORDER BY priority DESC, name
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(active_trigger.map(|trigger_type| trigger_type.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error(error, "list workflow templates"))?;

        rows.into_iter().map(template_from_row).collect()
    }
}

fn template_from_row(row: WorkflowTemplateRow) -> AppResult<WorkflowTemplate> {
    let trigger = from_json_column::<WorkflowTrigger>(row.trigger_config, "workflow trigger")?;
    let conditions = from_json_column::<ConditionSet>(row.conditions, "workflow conditions")?;
    let actions = from_json_column::<Vec<WorkflowAction>>(row.actions, "workflow actions")?;

    WorkflowTemplate::new(
        WorkflowTemplateId::from_uuid(row.id),
        TenantId::from_uuid(row.tenant_id),
        UserId::from_uuid(row.created_by),
        row.created_at,
        WorkflowTemplateInput {
            name: row.name,
            description: row.description,
            trigger,
            conditions,
            actions,
            priority: row.priority,
            is_active: row.is_active,
        },
    )
}
