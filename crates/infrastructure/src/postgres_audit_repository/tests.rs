use bureau_application::{AuditQuery, AuditRepository};
use bureau_core::{CorrelationId, TenantId, UserId};
use bureau_domain::{AuditAction, AuditEvent, AuditRecordDraft, GENESIS_HASH, verify_chain};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::PostgresAuditRepository;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres audit tests: {error}");
    }

    Some(pool)
}

fn draft(tenant_id: TenantId, correlation_id: CorrelationId, resource_id: &str) -> AuditRecordDraft {
    AuditRecordDraft {
        tenant_id,
        user_id: UserId::new(),
        correlation_id,
        event: AuditEvent::new(AuditAction::Update, "task")
            .with_resource_id(resource_id)
            .with_old_values(json!({"status": "open"}))
            .with_new_values(json!({"status": "done", "hours": 1.5})),
        ip: Some("10.0.0.7".to_owned()),
        user_agent: Some("bureau-tests".to_owned()),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn appended_records_form_a_verifiable_chain() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAuditRepository::new(pool);
    let tenant_id = TenantId::new();
    let correlation_id = CorrelationId::new();

    for index in 0..3 {
        let appended = repository
            .append(draft(tenant_id, correlation_id, &format!("task-{index}")))
            .await;
        assert!(appended.is_ok());
    }

    let Ok(chain) = repository.list_chain(tenant_id).await else {
        panic!("chain should load");
    };
    assert_eq!(chain.len(), 3);
    assert_eq!(chain[0].previous_hash, GENESIS_HASH);
    assert_eq!(
        chain.iter().map(|record| record.sequence).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(verify_chain(&chain).is_intact());
}

#[tokio::test]
async fn tampered_row_breaks_verification() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAuditRepository::new(pool.clone());
    let tenant_id = TenantId::new();
    let correlation_id = CorrelationId::new();
    for index in 0..2 {
        assert!(
            repository
                .append(draft(tenant_id, correlation_id, &format!("task-{index}")))
                .await
                .is_ok()
        );
    }

    let tamper = sqlx::query(
        "UPDATE audit_log_entries SET resource_id = 'forged' WHERE tenant_id = $1 AND sequence = 1",
    )
    .bind(tenant_id.as_uuid())
    .execute(&pool)
    .await;
    assert!(tamper.is_ok());

    let Ok(chain) = repository.list_chain(tenant_id).await else {
        panic!("chain should load");
    };
    let verification = verify_chain(&chain);
    assert_eq!(verification.first_broken_sequence, Some(1));
}

#[tokio::test]
async fn concurrent_appends_never_share_a_sequence() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAuditRepository::new(pool);
    let tenant_id = TenantId::new();
    let mut handles = Vec::new();
    for index in 0..8 {
        let repository = repository.clone();
        handles.push(tokio::spawn(async move {
            repository
                .append(draft(tenant_id, CorrelationId::new(), &format!("row-{index}")))
                .await
        }));
    }
    for handle in handles {
        assert!(matches!(handle.await, Ok(Ok(_))));
    }

    let Ok(chain) = repository.list_chain(tenant_id).await else {
        panic!("chain should load");
    };
    assert_eq!(chain.len(), 8);
    assert!(verify_chain(&chain).is_intact());
}

#[tokio::test]
async fn listing_filters_by_correlation_and_stays_in_tenant() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let repository = PostgresAuditRepository::new(pool);
    let tenant_id = TenantId::new();
    let other_tenant = TenantId::new();
    let correlation_id = CorrelationId::new();

    assert!(repository.append(draft(tenant_id, correlation_id, "a")).await.is_ok());
    assert!(repository.append(draft(tenant_id, CorrelationId::new(), "b")).await.is_ok());
    assert!(repository.append(draft(other_tenant, correlation_id, "c")).await.is_ok());

    let query = AuditQuery {
        correlation_id: Some(correlation_id),
        ..AuditQuery::default()
    };
    let Ok(records) = repository.list_records(tenant_id, &query).await else {
        panic!("records should load");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].resource_id.as_deref(), Some("a"));
    assert_eq!(records[0].tenant_id, tenant_id);
}
