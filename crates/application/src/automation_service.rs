use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bureau_core::{
    AppError, AppResult, AutomationRuleId, TenantId, WorkflowExecutionId, WorkflowTemplateId,
};
use bureau_domain::{
    ActionOutcome, AuditAction, AuditEvent, AutomationRule, AutomationRuleInput, DomainEvent,
    ExecutionSource, Permission, TriggerType, WorkflowAction, WorkflowExecution, WorkflowTemplate,
    WorkflowTemplateInput,
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::{
    ActionExecutor, ActionInvocation, AuthorizationService, AutomationRuleRepository,
    ExecutionListQuery, ExecutorError, ExecutorRegistry, RequestContext, WorkflowRepository,
};

mod definitions;
mod dispatch;
mod execution;
mod queue;
mod scheduling;

pub use queue::{AutomationEventQueue, AutomationEventReceiver, QueuedEvent};
pub use scheduling::TickReport;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_SECS: u64 = 30;

/// Retry budget for transient action failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy.
    pub fn new(max_attempts: u32, base_delay: Duration) -> AppResult<Self> {
        if max_attempts == 0 {
            return Err(AppError::Validation(
                "retry max_attempts must be at least 1".to_owned(),
            ));
        }

        Ok(Self {
            max_attempts,
            base_delay,
        })
    }

    /// Returns the attempt budget per action, first attempt included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before retrying after the given failed attempt.
    ///
    /// Doubles per attempt and is capped at thirty seconds.
    #[must_use]
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let delay_ms =
            base_ms.saturating_mul(2_u64.saturating_pow(failed_attempt.saturating_sub(1)));
        Duration::from_millis(delay_ms.min(MAX_RETRY_DELAY_SECS.saturating_mul(1000)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

/// Serializes evaluation of the same template or rule inside one process.
#[derive(Clone, Default)]
struct DefinitionLocks {
    locks: Arc<Mutex<HashMap<ExecutionSource, Arc<Mutex<()>>>>>,
}

impl DefinitionLocks {
    async fn acquire(&self, source: ExecutionSource) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .await
            .entry(source)
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

/// In-flight executions of this process and their pending cancellations.
#[derive(Clone, Default)]
struct CancellationRegistry {
    in_flight: Arc<Mutex<HashMap<WorkflowExecutionId, Option<String>>>>,
}

impl CancellationRegistry {
    async fn track(&self, execution_id: WorkflowExecutionId) {
        self.in_flight.lock().await.insert(execution_id, None);
    }

    async fn untrack(&self, execution_id: WorkflowExecutionId) {
        self.in_flight.lock().await.remove(&execution_id);
    }

    /// Returns false when the execution is not running in this process.
    async fn request(&self, execution_id: WorkflowExecutionId, reason: String) -> bool {
        match self.in_flight.lock().await.get_mut(&execution_id) {
            Some(slot) => {
                *slot = Some(reason);
                true
            }
            None => false,
        }
    }

    async fn requested(&self, execution_id: WorkflowExecutionId) -> Option<String> {
        self.in_flight
            .lock()
            .await
            .get(&execution_id)
            .cloned()
            .flatten()
    }
}

/// Result of evaluating one definition against a trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum FiringOutcome {
    /// The pipeline ran and finished with the contained execution.
    Executed(Box<WorkflowExecution>),
    /// The definition no longer exists.
    Missing,
    /// The definition is deactivated.
    Inactive,
    /// The trigger context did not satisfy the conditions.
    ConditionsNotMet,
    /// The rule fired too recently.
    CoolingDown,
}

impl FiringOutcome {
    /// Returns the execution when the pipeline ran.
    #[must_use]
    pub fn into_execution(self) -> Option<WorkflowExecution> {
        match self {
            Self::Executed(execution) => Some(*execution),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Executed(_) => "executed",
            Self::Missing => "missing",
            Self::Inactive => "inactive",
            Self::ConditionsNotMet => "conditions_not_met",
            Self::CoolingDown => "cooling_down",
        }
    }
}

/// Automation engine: workflow definitions, triggers and pipeline execution.
///
/// Pipelines run under the tenant service principal with a fresh correlation
/// id per execution.
#[derive(Clone)]
pub struct AutomationService {
    authorization_service: AuthorizationService,
    workflows: Arc<dyn WorkflowRepository>,
    rules: Arc<dyn AutomationRuleRepository>,
    executors: ExecutorRegistry,
    retry_policy: RetryPolicy,
    locks: DefinitionLocks,
    cancellations: CancellationRegistry,
}

impl AutomationService {
    /// Creates an automation service.
    #[must_use]
    pub fn new(
        authorization_service: AuthorizationService,
        workflows: Arc<dyn WorkflowRepository>,
        rules: Arc<dyn AutomationRuleRepository>,
        executors: ExecutorRegistry,
    ) -> Self {
        Self {
            authorization_service,
            workflows,
            rules,
            executors,
            retry_policy: RetryPolicy::default(),
            locks: DefinitionLocks::default(),
            cancellations: CancellationRegistry::default(),
        }
    }

    /// Overrides the default retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Returns the executor registry.
    #[must_use]
    pub fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }
}
