use std::sync::Arc;
use std::time::Duration;

use bureau_application::{
    AccessFilter, AiSummarizer, AuditRecorder, AuditRepository, AuthorizationService,
    AutomationRuleRepository, AutomationService, ExecutorRegistry, NotificationSender,
    OfficeRecordStore, PermissionGrantRepository, RetryPolicy, SchedulerLeaseCoordinator,
    WorkflowRepository,
};
use bureau_core::{AppError, AppResult};
use bureau_infrastructure::{
    CircuitBreaker, CircuitBreakingAiSummarizer, CircuitBreakingNotificationSender,
    ConsoleNotificationSender, HttpAiSummarizer, HttpNotificationSender, InMemoryAuditRepository,
    InMemoryAutomationRuleRepository, InMemoryOfficeRecordStore,
    InMemoryPermissionGrantRepository, InMemorySchedulerLeaseCoordinator,
    InMemoryWorkflowRepository, PostgresAuditRepository, PostgresAutomationRuleRepository,
    PostgresOfficeRecordStore, PostgresPermissionGrantRepository, PostgresWorkflowRepository,
    RedisSchedulerLeaseCoordinator,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::worker_config::{NotificationProviderConfig, StorageBackend, WorkerConfig};

const LEASE_KEY_PREFIX: &str = "bureau:scheduler";

struct Stores {
    grants: Arc<dyn PermissionGrantRepository>,
    audit: Arc<dyn AuditRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    rules: Arc<dyn AutomationRuleRepository>,
    records: Arc<dyn OfficeRecordStore>,
}

/// Wired services the worker loops drive.
pub struct WorkerRuntime {
    pub automation: AutomationService,
    pub lease_coordinator: Arc<dyn SchedulerLeaseCoordinator>,
}

impl WorkerRuntime {
    pub async fn build(config: &WorkerConfig) -> AppResult<Self> {
        let stores = match &config.storage {
            StorageBackend::Postgres { database_url } => {
                postgres_stores(connect_and_migrate(database_url).await?)
            }
            StorageBackend::Memory => memory_stores(),
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

        let notifications: Arc<dyn NotificationSender> = match &config.notification_provider {
            NotificationProviderConfig::Console => Arc::new(ConsoleNotificationSender::new()),
            NotificationProviderConfig::Http { endpoint } => Arc::new(
                HttpNotificationSender::new(http_client.clone(), endpoint.as_str())?,
            ),
        };
        let notifications: Arc<dyn NotificationSender> =
            Arc::new(CircuitBreakingNotificationSender::new(
                notifications,
                CircuitBreaker::new(
                    "notifications",
                    config.breaker_failure_threshold,
                    config.breaker_cool_off,
                )?,
            ));
        let summarizer: Arc<dyn AiSummarizer> = Arc::new(CircuitBreakingAiSummarizer::new(
            Arc::new(HttpAiSummarizer::new(
                http_client,
                config.ai_provider.base_url.as_str(),
                config.ai_provider.api_key.clone(),
                config.ai_provider.model.as_str(),
            )),
            CircuitBreaker::new("ai", config.breaker_failure_threshold, config.breaker_cool_off)?,
        ));

        let recorder = AuditRecorder::new(stores.audit, config.audit_write_policy);
        let authorization_service = AuthorizationService::new(stores.grants, recorder);
        let executors = ExecutorRegistry::with_default_executors(
            AccessFilter::new(authorization_service.clone()),
            notifications,
            summarizer,
            stores.records,
        );
        let automation = AutomationService::new(
            authorization_service,
            stores.workflows,
            stores.rules,
            executors,
        )
        .with_retry_policy(RetryPolicy::new(config.max_attempts, config.retry_backoff)?);

        let lease_coordinator: Arc<dyn SchedulerLeaseCoordinator> = match &config.redis_url {
            Some(redis_url) => {
                let client = redis::Client::open(redis_url.as_str()).map_err(|error| {
                    AppError::Validation(format!("invalid REDIS_URL: {error}"))
                })?;
                Arc::new(RedisSchedulerLeaseCoordinator::new(client, LEASE_KEY_PREFIX))
            }
            None => Arc::new(InMemorySchedulerLeaseCoordinator::new()),
        };

        info!(
            audit_write_policy = config.audit_write_policy.as_str(),
            max_attempts = config.max_attempts,
            distributed_lease = config.redis_url.is_some(),
            "automation runtime wired"
        );

        Ok(Self {
            automation,
            lease_coordinator,
        })
    }
}

async fn connect_and_migrate(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Unavailable(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

fn postgres_stores(pool: PgPool) -> Stores {
    Stores {
        grants: Arc::new(PostgresPermissionGrantRepository::new(pool.clone())),
        audit: Arc::new(PostgresAuditRepository::new(pool.clone())),
        workflows: Arc::new(PostgresWorkflowRepository::new(pool.clone())),
        rules: Arc::new(PostgresAutomationRuleRepository::new(pool.clone())),
        records: Arc::new(PostgresOfficeRecordStore::new(pool)),
    }
}

fn memory_stores() -> Stores {
    Stores {
        grants: Arc::new(InMemoryPermissionGrantRepository::new()),
        audit: Arc::new(InMemoryAuditRepository::new()),
        workflows: Arc::new(InMemoryWorkflowRepository::new()),
        rules: Arc::new(InMemoryAutomationRuleRepository::new()),
        records: Arc::new(InMemoryOfficeRecordStore::new()),
    }
}
