use async_trait::async_trait;
use bureau_application::{NewTask, OfficeRecord, OfficeRecordStore, RecordFilter};
use bureau_core::{AppError, AppResult, DepartmentId, RecordId, TenantId, UserId};
use bureau_domain::{RecordOwnership, ResourceType, ScopeClause, ScopePredicate};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::postgres_errors::store_error;

const ROW_ALIAS: &str = "record_row";

/// PostgreSQL-backed office record store used by automation executors.
///
/// The access scope is rendered into the `WHERE` clause so rows outside the
/// predicate never leave the database.
#[derive(Clone)]
pub struct PostgresOfficeRecordStore {
    pool: PgPool,
}

impl PostgresOfficeRecordStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct OfficeRecordRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    owner_id: uuid::Uuid,
    assignee_id: Option<uuid::Uuid>,
    department_id: Option<uuid::Uuid>,
    attributes: Value,
}

/// Backing table of a resource type plus its fixed discriminator.
fn table_for(resource_type: ResourceType) -> (&'static str, Option<&'static str>) {
    match resource_type {
        ResourceType::Customer => ("customers", None),
        ResourceType::Note => ("notes", Some("is_personal = FALSE")),
        ResourceType::PersonalNote => ("notes", Some("is_personal = TRUE")),
        ResourceType::Appointment => ("appointments", None),
        ResourceType::Task => ("tasks", None),
        ResourceType::TimeEntry => ("time_entries", None),
        ResourceType::Event => ("calendar_events", None),
    }
}

fn push_select(builder: &mut QueryBuilder<'_, Postgres>, resource_type: ResourceType) {
    let (table, discriminator) = table_for(resource_type);
    builder.push(format!(
        "SELECT {ROW_ALIAS}.id, {ROW_ALIAS}.tenant_id, {ROW_ALIAS}.owner_id, \
         {ROW_ALIAS}.assignee_id, {ROW_ALIAS}.department_id, \
         to_jsonb({ROW_ALIAS}) AS attributes FROM {table} {ROW_ALIAS} WHERE "
    ));
    if let Some(discriminator) = discriminator {
        builder.push(format!("{ROW_ALIAS}.{discriminator} AND "));
    }
}

/// Renders `tenant_id = ?` followed by the scope clause.
pub(crate) fn push_scope_predicate(
    builder: &mut QueryBuilder<'_, Postgres>,
    alias: &str,
    predicate: &ScopePredicate,
) {
    builder.push(format!("{alias}.tenant_id = "));
    builder.push_bind(predicate.tenant_id().as_uuid());

    match predicate.clause() {
        ScopeClause::Any => {}
        ScopeClause::OwnerIs(user_id) => {
            builder.push(format!(" AND {alias}.owner_id = "));
            builder.push_bind(user_id.as_uuid());
        }
        ScopeClause::OwnerOrAssigneeIs(user_id) => {
            builder.push(format!(" AND ({alias}.owner_id = "));
            builder.push_bind(user_id.as_uuid());
            builder.push(format!(" OR {alias}.assignee_id = "));
            builder.push_bind(user_id.as_uuid());
            builder.push(")");
        }
        ScopeClause::DepartmentIs(department_id) => {
            builder.push(format!(" AND {alias}.department_id = "));
            builder.push_bind(department_id.as_uuid());
        }
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &RecordFilter) -> AppResult<()> {
    if let Some(starts_from) = filter.starts_from {
        builder.push(format!(" AND {ROW_ALIAS}.starts_at >= "));
        builder.push_bind(starts_from);
    }
    if let Some(starts_until) = filter.starts_until {
        builder.push(format!(" AND {ROW_ALIAS}.starts_at < "));
        builder.push_bind(starts_until);
    }
    if let Some(status) = &filter.status {
        builder.push(format!(" AND {ROW_ALIAS}.status = "));
        builder.push_bind(status.clone());
    }

    builder.push(format!(
        " ORDER BY {ROW_ALIAS}.starts_at ASC NULLS LAST, {ROW_ALIAS}.created_at ASC"
    ));

    if let Some(limit) = filter.limit {
        let limit = i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid record query limit: {error}"))
        })?;
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }

    Ok(())
}

#[async_trait]
impl OfficeRecordStore for PostgresOfficeRecordStore {
    async fn list_records(
        &self,
        resource_type: ResourceType,
        predicate: &ScopePredicate,
        filter: &RecordFilter,
    ) -> AppResult<Vec<OfficeRecord>> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("");
        push_select(&mut builder, resource_type);
        push_scope_predicate(&mut builder, ROW_ALIAS, predicate);
        push_filter(&mut builder, filter)?;

        let rows = builder
            .build_query_as::<OfficeRecordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| store_error(error, &format!("list {resource_type} records")))?;

        Ok(rows
            .into_iter()
            .map(|row| record_from_row(resource_type, row))
            .collect())
    }

    async fn find_record(
        &self,
        tenant_id: TenantId,
        resource_type: ResourceType,
        record_id: RecordId,
    ) -> AppResult<Option<OfficeRecord>> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("");
        push_select(&mut builder, resource_type);
        builder.push(format!("{ROW_ALIAS}.tenant_id = "));
        builder.push_bind(tenant_id.as_uuid());
        builder.push(format!(" AND {ROW_ALIAS}.id = "));
        builder.push_bind(record_id.as_uuid());

        let row = builder
            .build_query_as::<OfficeRecordRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| store_error(error, &format!("find {resource_type} record")))?;

        Ok(row.map(|row| record_from_row(resource_type, row)))
    }

    async fn create_task(&self, tenant_id: TenantId, task: NewTask) -> AppResult<OfficeRecord> {
        let row = sqlx::query_as::<_, OfficeRecordRow>(
            r#"
            INSERT INTO tasks AS record_row (
                id, tenant_id, owner_id, assignee_id, title, description, status, due_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'open', $7)
            RETURNING
                record_row.id,
                record_row.tenant_id,
                record_row.owner_id,
                record_row.assignee_id,
                record_row.department_id,
                to_jsonb(record_row) AS attributes
            "#,
        )
        .bind(RecordId::new().as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(task.owner_id.as_uuid())
        .bind(task.assignee_id.map(|assignee_id| assignee_id.as_uuid()))
        .bind(task.title)
        .bind(task.description)
        .bind(task.due_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| store_error(error, "create task"))?;

        Ok(record_from_row(ResourceType::Task, row))
    }
}

fn record_from_row(resource_type: ResourceType, row: OfficeRecordRow) -> OfficeRecord {
    OfficeRecord {
        id: RecordId::from_uuid(row.id),
        resource_type,
        ownership: RecordOwnership {
            tenant_id: TenantId::from_uuid(row.tenant_id),
            owner_id: UserId::from_uuid(row.owner_id),
            assignee_id: row.assignee_id.map(UserId::from_uuid),
            department_id: row.department_id.map(DepartmentId::from_uuid),
        },
        attributes: row.attributes,
    }
}
