use std::env;
use std::str::FromStr;
use std::time::Duration;

use bureau_application::AuditWritePolicy;
use bureau_core::{AppError, AppResult};

const DEFAULT_AI_PROVIDER_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AI_MODEL: &str = "gpt-4o";

/// Where tenant data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// PostgreSQL with embedded migrations.
    Postgres {
        /// Connection string.
        database_url: String,
    },
    /// Process-local maps, lost on restart.
    Memory,
}

/// How reminders and digests leave the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationProviderConfig {
    /// Log notifications only.
    Console,
    /// POST notifications to a webhook.
    Http {
        /// Webhook endpoint.
        endpoint: String,
    },
}

/// OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub storage: StorageBackend,
    pub redis_url: Option<String>,
    pub worker_id: String,
    pub tick_interval: Duration,
    pub lease_seconds: u32,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub audit_write_policy: AuditWritePolicy,
    pub event_queue_capacity: usize,
    pub notification_provider: NotificationProviderConfig,
    pub ai_provider: AiProviderConfig,
    pub breaker_failure_threshold: u32,
    pub breaker_cool_off: Duration,
}

impl WorkerConfig {
    /// Loads configuration from the process environment.
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let value = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let storage = match value("STORAGE_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => StorageBackend::Postgres {
                database_url: value("DATABASE_URL").ok_or_else(|| {
                    AppError::Validation(
                        "DATABASE_URL is required when STORAGE_BACKEND=postgres".to_owned(),
                    )
                })?,
            },
            "memory" => StorageBackend::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "invalid STORAGE_BACKEND value '{other}'. Expected 'postgres' or 'memory'"
                )));
            }
        };

        let parse = |name: &str| value(name).map(|raw| (name.to_owned(), raw));
        let tick_seconds = parse_or(parse("SCHEDULER_TICK_SECONDS"), 60_u64)?;
        let lease_seconds = parse_or(parse("SCHEDULER_LEASE_SECONDS"), 55_u32)?;
        let max_attempts = parse_or(parse("AUTOMATION_MAX_ATTEMPTS"), 3_u32)?;
        let retry_backoff_ms = parse_or(parse("AUTOMATION_RETRY_BACKOFF_MS"), 500_u64)?;
        let event_queue_capacity = parse_or(parse("EVENT_QUEUE_CAPACITY"), 1024_usize)?;
        let breaker_failure_threshold =
            parse_or(parse("CIRCUIT_BREAKER_FAILURE_THRESHOLD"), 5_u32)?;
        let breaker_cool_off_seconds =
            parse_or(parse("CIRCUIT_BREAKER_COOL_OFF_SECONDS"), 60_u64)?;
        let audit_write_policy = value("AUDIT_WRITE_POLICY")
            .map(|raw| AuditWritePolicy::from_str(raw.as_str()))
            .transpose()?
            .unwrap_or_default();

        for (name, amount) in [
            ("SCHEDULER_TICK_SECONDS", tick_seconds),
            ("SCHEDULER_LEASE_SECONDS", u64::from(lease_seconds)),
            ("AUTOMATION_MAX_ATTEMPTS", u64::from(max_attempts)),
            ("CIRCUIT_BREAKER_FAILURE_THRESHOLD", u64::from(breaker_failure_threshold)),
        ] {
            if amount == 0 {
                return Err(AppError::Validation(format!("{name} must be greater than zero")));
            }
        }
        if event_queue_capacity == 0 {
            return Err(AppError::Validation(
                "EVENT_QUEUE_CAPACITY must be greater than zero".to_owned(),
            ));
        }

        let notification_provider =
            match value("NOTIFICATION_PROVIDER").as_deref().unwrap_or("console") {
                "console" => NotificationProviderConfig::Console,
                "http" => NotificationProviderConfig::Http {
                    endpoint: value("NOTIFICATION_WEBHOOK_URL").ok_or_else(|| {
                        AppError::Validation(
                            "NOTIFICATION_WEBHOOK_URL is required when NOTIFICATION_PROVIDER=http"
                                .to_owned(),
                        )
                    })?,
                },
                other => {
                    return Err(AppError::Validation(format!(
                        "invalid NOTIFICATION_PROVIDER value '{other}'. Expected 'console' or 'http'"
                    )));
                }
            };

        let ai_provider = AiProviderConfig {
            base_url: value("AI_PROVIDER_URL")
                .unwrap_or_else(|| DEFAULT_AI_PROVIDER_URL.to_owned()),
            api_key: value("AI_API_KEY"),
            model: value("AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_owned()),
        };

        let worker_id =
            value("WORKER_ID").unwrap_or_else(|| format!("worker-{}", std::process::id()));

        Ok(Self {
            storage,
            redis_url: value("REDIS_URL"),
            worker_id,
            tick_interval: Duration::from_secs(tick_seconds),
            lease_seconds,
            max_attempts,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            audit_write_policy,
            event_queue_capacity,
            notification_provider,
            ai_provider,
            breaker_failure_threshold,
            breaker_cool_off: Duration::from_secs(breaker_cool_off_seconds),
        })
    }
}

fn parse_or<T>(raw: Option<(String, String)>, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some((name, value)) => value.parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}
