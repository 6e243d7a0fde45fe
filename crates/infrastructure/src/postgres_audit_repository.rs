use async_trait::async_trait;
use bureau_application::{AuditQuery, AuditRepository};
use bureau_core::{AppError, AppResult, AuditRecordId, CorrelationId, TenantId, UserId};
use bureau_domain::{
    AuditAction, AuditRecord, AuditRecordDraft, ChainLink, GENESIS_HASH, RiskLevel,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::postgres_errors::store_error;

/// PostgreSQL-backed append-only audit repository.
///
/// Every tenant owns one row in `audit_chain_heads`; appends lock that row so
/// sequences stay gapless under concurrent writers.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ChainHeadRow {
    sequence: i64,
    record_hash: String,
}

#[derive(Debug, FromRow)]
struct AuditRecordRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    user_id: uuid::Uuid,
    correlation_id: uuid::Uuid,
    action: String,
    resource_type: String,
    resource_id: Option<String>,
    old_values: Option<Value>,
    new_values: Option<Value>,
    ip: Option<String>,
    user_agent: Option<String>,
    risk_level: String,
    blocked: bool,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    sequence: i64,
    previous_hash: String,
    record_hash: String,
}

const AUDIT_COLUMNS: &str = r#"
    id, tenant_id, user_id, correlation_id, action, resource_type, resource_id,
    old_values, new_values, ip, user_agent, risk_level, blocked, error_message,
    created_at, sequence, previous_hash, record_hash
"#;

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append(&self, draft: AuditRecordDraft) -> AppResult<AuditRecord> {
        let tenant_id = draft.tenant_id;
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| store_error(error, "start audit append transaction"))?;

        sqlx::query(
            r#"
            INSERT INTO audit_chain_heads (tenant_id, sequence, record_hash)
            VALUES ($1, 0, $2)
            ON CONFLICT (tenant_id) DO NOTHING
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(GENESIS_HASH)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            store_error(
                error,
                &format!("initialize audit chain for tenant '{tenant_id}'"),
            )
        })?;

        let head = sqlx::query_as::<_, ChainHeadRow>(
            r#"
            SELECT sequence, record_hash
            FROM audit_chain_heads
            WHERE tenant_id = $1
            FOR UPDATE
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            store_error(
                error,
                &format!("lock audit chain head for tenant '{tenant_id}'"),
            )
        })?;

        let record = AuditRecord::seal(
            draft,
            ChainLink {
                sequence: head.sequence + 1,
                previous_hash: head.record_hash,
            },
        );

        sqlx::query(
            r#"
            INSERT INTO audit_log_entries (
                id, tenant_id, user_id, correlation_id, action, resource_type, resource_id,
                old_values, new_values, ip, user_agent, risk_level, blocked, error_message,
                created_at, sequence, previous_hash, record_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.tenant_id.as_uuid())
        .bind(record.user_id.as_uuid())
        .bind(record.correlation_id.as_uuid())
        .bind(record.action.as_str())
        .bind(record.resource_type.as_str())
        .bind(record.resource_id.clone())
        .bind(record.old_values.clone())
        .bind(record.new_values.clone())
        .bind(record.ip.clone())
        .bind(record.user_agent.clone())
        .bind(record.risk_level.as_str())
        .bind(record.blocked)
        .bind(record.error_message.clone())
        .bind(record.created_at)
        .bind(record.sequence)
        .bind(record.previous_hash.as_str())
        .bind(record.record_hash.as_str())
        .execute(&mut *transaction)
        .await
        .map_err(|error| store_error(error, "append audit record"))?;

        sqlx::query(
            r#"
            UPDATE audit_chain_heads
            SET sequence = $2, record_hash = $3
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(record.sequence)
        .bind(record.record_hash.as_str())
        .execute(&mut *transaction)
        .await
        .map_err(|error| store_error(error, "advance audit chain head"))?;

        transaction
            .commit()
            .await
            .map_err(|error| store_error(error, "commit audit append transaction"))?;

        Ok(record)
    }

    async fn list_records(
        &self,
        tenant_id: TenantId,
        query: &AuditQuery,
    ) -> AppResult<Vec<AuditRecord>> {
        let limit = i64::try_from(query.limit).map_err(|error| {
            AppError::Validation(format!("invalid audit query limit: {error}"))
        })?;
        let offset = i64::try_from(query.offset).map_err(|error| {
            AppError::Validation(format!("invalid audit query offset: {error}"))
        })?;

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT ");
        builder.push(AUDIT_COLUMNS);
        builder.push(" FROM audit_log_entries WHERE tenant_id = ");
        builder.push_bind(tenant_id.as_uuid());

        if let Some(correlation_id) = query.correlation_id {
            builder.push(" AND correlation_id = ");
            builder.push_bind(correlation_id.as_uuid());
        }
        if let Some(user_id) = query.user_id {
            builder.push(" AND user_id = ");
            builder.push_bind(user_id.as_uuid());
        }
        if let Some(action) = query.action {
            builder.push(" AND action = ");
            builder.push_bind(action.as_str());
        }
        if let Some(resource_type) = &query.resource_type {
            builder.push(" AND resource_type = ");
            builder.push_bind(resource_type.clone());
        }
        if let Some(resource_id) = &query.resource_id {
            builder.push(" AND resource_id = ");
            builder.push_bind(resource_id.clone());
        }
        if query.blocked_only {
            builder.push(" AND blocked");
        }
        if let Some(since) = query.since {
            builder.push(" AND created_at >= ");
            builder.push_bind(since);
        }
        if let Some(until) = query.until {
            builder.push(" AND created_at < ");
            builder.push_bind(until);
        }

        builder.push(" ORDER BY sequence DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows = builder
            .build_query_as::<AuditRecordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                store_error(
                    error,
                    &format!("list audit records for tenant '{tenant_id}'"),
                )
            })?;

        rows.into_iter().map(audit_record_from_row).collect()
    }

    async fn list_chain(&self, tenant_id: TenantId) -> AppResult<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRecordRow>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log_entries WHERE tenant_id = $1 ORDER BY sequence ASC"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            store_error(error, &format!("load audit chain for tenant '{tenant_id}'"))
        })?;

        rows.into_iter().map(audit_record_from_row).collect()
    }
}

fn audit_record_from_row(row: AuditRecordRow) -> AppResult<AuditRecord> {
    Ok(AuditRecord {
        id: AuditRecordId::from_uuid(row.id),
        tenant_id: TenantId::from_uuid(row.tenant_id),
        user_id: UserId::from_uuid(row.user_id),
        correlation_id: CorrelationId::from_uuid(row.correlation_id),
        action: row.action.parse::<AuditAction>()?,
        resource_type: row.resource_type,
        resource_id: row.resource_id,
        old_values: row.old_values,
        new_values: row.new_values,
        ip: row.ip,
        user_agent: row.user_agent,
        risk_level: row.risk_level.parse::<RiskLevel>()?,
        blocked: row.blocked,
        error_message: row.error_message,
        created_at: row.created_at,
        sequence: row.sequence,
        previous_hash: row.previous_hash,
        record_hash: row.record_hash,
    })
}

#[cfg(test)]
mod tests;
