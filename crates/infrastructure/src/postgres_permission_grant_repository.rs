use std::str::FromStr;

use async_trait::async_trait;
use bureau_application::PermissionGrantRepository;
use bureau_core::{AppError, AppResult, PermissionGrantId, TenantId, UserId};
use bureau_domain::{Permission, PermissionGrant};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::postgres_errors::store_error;

/// PostgreSQL-backed repository for per-user permission grants.
#[derive(Clone)]
pub struct PostgresPermissionGrantRepository {
    pool: PgPool,
}

impl PostgresPermissionGrantRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PermissionGrantRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    user_id: uuid::Uuid,
    permission: String,
    granted_by: uuid::Uuid,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl PermissionGrantRepository for PostgresPermissionGrantRepository {
    async fn list_grants_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<Vec<PermissionGrant>> {
        let rows = sqlx::query_as::<_, PermissionGrantRow>(
            r#"
            SELECT id, tenant_id, user_id, permission, granted_by, granted_at, expires_at
            FROM permission_grants
            WHERE tenant_id = $1 AND user_id = $2
            ORDER BY permission
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error(error, "load permission grants"))?;

        rows.into_iter().map(grant_from_row).collect()
    }

    async fn list_grants(&self, tenant_id: TenantId) -> AppResult<Vec<PermissionGrant>> {
        let rows = sqlx::query_as::<_, PermissionGrantRow>(
            r#"
            SELECT id, tenant_id, user_id, permission, granted_by, granted_at, expires_at
            FROM permission_grants
            WHERE tenant_id = $1
            ORDER BY user_id, permission
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| store_error(error, "list permission grants"))?;

        rows.into_iter().map(grant_from_row).collect()
    }

    async fn find_grant(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        permission: Permission,
    ) -> AppResult<Option<PermissionGrant>> {
        let row = sqlx::query_as::<_, PermissionGrantRow>(
            r#"
            SELECT id, tenant_id, user_id, permission, granted_by, granted_at, expires_at
            FROM permission_grants
            WHERE tenant_id = $1 AND user_id = $2 AND permission = $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(permission.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error(error, "find permission grant"))?;

        row.map(grant_from_row).transpose()
    }

    async fn save_grant(&self, grant: PermissionGrant) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO permission_grants (
                id, tenant_id, user_id, permission, granted_by, granted_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, user_id, permission)
            DO UPDATE SET
                granted_by = EXCLUDED.granted_by,
                granted_at = EXCLUDED.granted_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(grant.id().as_uuid())
        .bind(grant.tenant_id().as_uuid())
        .bind(grant.user_id().as_uuid())
        .bind(grant.permission().as_str())
        .bind(grant.granted_by().as_uuid())
        .bind(grant.granted_at())
        .bind(grant.expires_at())
        .execute(&self.pool)
        .await
        .map_err(|error| store_error(error, "save permission grant"))?;

        Ok(())
    }
}

fn grant_from_row(row: PermissionGrantRow) -> AppResult<PermissionGrant> {
    let permission = Permission::from_str(row.permission.as_str()).map_err(|error| {
        AppError::Internal(format!(
            "failed to decode permission '{}' for tenant '{}': {error}",
            row.permission, row.tenant_id
        ))
    })?;

    Ok(PermissionGrant::from_stored(
        PermissionGrantId::from_uuid(row.id),
        TenantId::from_uuid(row.tenant_id),
        UserId::from_uuid(row.user_id),
        permission,
        UserId::from_uuid(row.granted_by),
        row.granted_at,
        row.expires_at,
    ))
}
