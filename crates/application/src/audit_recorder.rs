use std::str::FromStr;
use std::sync::Arc;

use bureau_core::{AppError, AppResult, AuditRecordId};
use bureau_domain::{AuditEvent, AuditRecordDraft};
use chrono::Utc;
use tracing::error;

use crate::{AuditRepository, RequestContext};

/// What happens to the caller when an audit write fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuditWritePolicy {
    /// Log the failure and let the audited operation succeed.
    #[default]
    BestEffort,
    /// Fail the audited operation.
    Strict,
}

impl AuditWritePolicy {
    /// Returns stable configuration value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BestEffort => "best_effort",
            Self::Strict => "strict",
        }
    }
}

impl FromStr for AuditWritePolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "best_effort" => Ok(Self::BestEffort),
            "strict" => Ok(Self::Strict),
            _ => Err(AppError::Validation(format!(
                "unknown audit write policy '{value}'"
            ))),
        }
    }
}

/// Appends audit records on behalf of every service.
#[derive(Clone)]
pub struct AuditRecorder {
    repository: Arc<dyn AuditRepository>,
    policy: AuditWritePolicy,
}

impl AuditRecorder {
    /// Creates a recorder.
    #[must_use]
    pub fn new(repository: Arc<dyn AuditRepository>, policy: AuditWritePolicy) -> Self {
        Self { repository, policy }
    }

    /// Returns the configured write policy.
    #[must_use]
    pub fn policy(&self) -> AuditWritePolicy {
        self.policy
    }

    /// Records one event under the context's tenant, user and correlation id.
    ///
    /// Returns `Ok(None)` when a best-effort write failed.
    pub async fn record(
        &self,
        context: &RequestContext,
        event: AuditEvent,
    ) -> AppResult<Option<AuditRecordId>> {
        let action = event.action;
        let draft = AuditRecordDraft {
            tenant_id: context.tenant_id(),
            user_id: context.user_id(),
            correlation_id: context.correlation_id(),
            event,
            ip: context.client().ip.clone(),
            user_agent: context.client().user_agent.clone(),
            created_at: Utc::now(),
        };

        match self.repository.append(draft).await {
            Ok(record) => Ok(Some(record.id)),
            Err(write_error) => match self.policy {
                AuditWritePolicy::BestEffort => {
                    error!(
                        target: "audit",
                        tenant_id = %context.tenant_id(),
                        correlation_id = %context.correlation_id(),
                        action = action.as_str(),
                        error = %write_error,
                        "audit record could not be written"
                    );
                    Ok(None)
                }
                AuditWritePolicy::Strict => Err(write_error),
            },
        }
    }
}
