use async_trait::async_trait;
use bureau_application::AutomationRuleRepository;
use bureau_core::{AppError, AppResult, AutomationRuleId, TenantId, UserId};
use bureau_domain::{AutomationRule, AutomationRuleInput, ConditionSet, WorkflowAction};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use crate::postgres_errors::store_error;

/// PostgreSQL-backed repository for event automation rules.
#[derive(Clone)]
pub struct PostgresAutomationRuleRepository {
    pool: PgPool,
}

impl PostgresAutomationRuleRepository {
    /// Creates a rule repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AutomationRuleRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    name: String,
    description: Option<String>,
    event_type: String,
    conditions: Value,
    actions: Value,
    is_active: bool,
    cooldown_minutes: i32,
    last_triggered: Option<DateTime<Utc>>,
    created_by: uuid::Uuid,
    created_at: DateTime<Utc>,
}

const RULE_COLUMNS: &str = r#"
    id, tenant_id, name, description, event_type, conditions, actions, is_active,
    cooldown_minutes, last_triggered, created_by, created_at
"#;

#[async_trait]
impl AutomationRuleRepository for PostgresAutomationRuleRepository {
    async fn save_rule(&self, rule: AutomationRule) -> AppResult<()> {
        let conditions = serde_json::to_value(rule.conditions()).map_err(|error| {
            AppError::Internal(format!("failed to encode rule conditions: {error}"))
        })?;
        let actions = serde_json::to_value(rule.actions()).map_err(|error| {
            AppError::Internal(format!("failed to encode rule actions: {error}"))
        })?;
        let cooldown_minutes = i32::try_from(rule.cooldown_minutes()).map_err(|error| {
            AppError::Validation(format!("invalid cooldown_minutes value: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO automation_rules (
                id, tenant_id, name, description, event_type, conditions, actions, is_active,
                cooldown_minutes, last_triggered, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now())
            ON CONFLICT (id)
            DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                event_type = EXCLUDED.event_type,
                conditions = EXCLUDED.conditions,
                actions = EXCLUDED.actions,
                is_active = EXCLUDED.is_active,
                cooldown_minutes = EXCLUDED.cooldown_minutes,
                updated_at = now()
            WHERE automation_rules.tenant_id = EXCLUDED.tenant_id
            "#,
        )
        .bind(rule.id().as_uuid())
        .bind(rule.tenant_id().as_uuid())
        .bind(rule.name().as_str())
        .bind(rule.description())
        .bind(rule.event_type())
        .bind(conditions)
        .bind(actions)
        .bind(rule.is_active())
        .bind(cooldown_minutes)
        .bind(rule.last_triggered())
        .bind(rule.created_by().as_uuid())
        .bind(rule.created_at())
        .execute(&self.pool)
        .await
        .map_err(|error| store_error(error, "save automation rule"))?;

        Ok(())
    }

    async fn find_rule(
        &self,
        tenant_id: TenantId,
        rule_id: AutomationRuleId,
    ) -> AppResult<Option<AutomationRule>> {
        let row = sqlx::query_as::<_, AutomationRuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM automation_rules WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(rule_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error(error, "find automation rule"))?;

        row.map(rule_from_row).transpose()
    }

    async fn list_rules(&self, tenant_id: TenantId) -> AppResult<Vec<AutomationRule>> {
        let rows = sqlx::query_as::<_, AutomationRuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM automation_rules WHERE tenant_id = $1 ORDER BY name"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error(error, "list automation rules"))?;

        rows.into_iter().map(rule_from_row).collect()
    }

    async fn list_active_rules_for_event(
        &self,
        tenant_id: TenantId,
        event_type: &str,
    ) -> AppResult<Vec<AutomationRule>> {
        let rows = sqlx::query_as::<_, AutomationRuleRow>(&format!(
            r#"
            SELECT {RULE_COLUMNS}
            FROM automation_rules
            WHERE tenant_id = $1 AND is_active AND event_type = $2
            ORDER BY name
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(event_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error(error, "list automation rules for event"))?;

        rows.into_iter().map(rule_from_row).collect()
    }

    async fn claim_rule_firing(
        &self,
        tenant_id: TenantId,
        rule_id: AutomationRuleId,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let claimed = sqlx::query(
            r#"
            UPDATE automation_rules
            SET last_triggered = $3, updated_at = now()
            WHERE tenant_id = $1
              AND id = $2
              AND (
                    last_triggered IS NULL
                    OR last_triggered + make_interval(mins => cooldown_minutes) <= $3
                  )
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(rule_id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|error| store_error(error, "claim automation rule firing"))?;

        if claimed.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM automation_rules WHERE tenant_id = $1 AND id = $2)",
        )
        .bind(tenant_id.as_uuid())
        .bind(rule_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| store_error(error, "check automation rule"))?;

        if !exists {
            return Err(AppError::NotFound(format!(
                "automation rule '{rule_id}' not found"
            )));
        }

        Ok(false)
    }
}

fn rule_from_row(row: AutomationRuleRow) -> AppResult<AutomationRule> {
    let conditions = serde_json::from_value::<ConditionSet>(row.conditions).map_err(|error| {
        AppError::Internal(format!("failed to decode stored rule conditions: {error}"))
    })?;
    let actions = serde_json::from_value::<Vec<WorkflowAction>>(row.actions).map_err(|error| {
        AppError::Internal(format!("failed to decode stored rule actions: {error}"))
    })?;
    let cooldown_minutes = u32::try_from(row.cooldown_minutes).map_err(|error| {
        AppError::Internal(format!("invalid stored cooldown_minutes value: {error}"))
    })?;

    Ok(AutomationRule::new(
        AutomationRuleId::from_uuid(row.id),
        TenantId::from_uuid(row.tenant_id),
        UserId::from_uuid(row.created_by),
        row.created_at,
        AutomationRuleInput {
            name: row.name,
            description: row.description,
            event_type: row.event_type,
            conditions,
            actions,
            cooldown_minutes,
            is_active: row.is_active,
        },
    )?
    .with_last_triggered(row.last_triggered))
}
