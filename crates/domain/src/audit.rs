use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bureau_core::{AppError, AuditRecordId, CorrelationId, TenantId, UserId};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash used as `previous_hash` of the first record of every tenant chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Audited mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuditAction {
    /// A record was created.
    Create,
    /// A record was updated.
    Update,
    /// A record was deleted.
    Delete,
    /// Records were exported.
    Export,
    /// A blocked read or write.
    AccessDenied,
    /// A permission grant was written.
    PermissionGranted,
    /// A permission grant was revoked.
    PermissionRevoked,
    /// A workflow template was created.
    WorkflowTemplateCreated,
    /// A workflow template was activated.
    WorkflowTemplateActivated,
    /// A workflow template was deactivated.
    WorkflowTemplateDeactivated,
    /// An automation rule was created.
    AutomationRuleCreated,
    /// An automation rule was activated.
    AutomationRuleActivated,
    /// An automation rule was deactivated.
    AutomationRuleDeactivated,
    /// A workflow execution reached `completed`.
    WorkflowExecutionCompleted,
    /// A workflow execution reached `failed`.
    WorkflowExecutionFailed,
    /// Cancellation of a running execution was requested.
    WorkflowExecutionCancelRequested,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Export => "export",
            Self::AccessDenied => "access.denied",
            Self::PermissionGranted => "security.permission.granted",
            Self::PermissionRevoked => "security.permission.revoked",
            Self::WorkflowTemplateCreated => "workflow.template.created",
            Self::WorkflowTemplateActivated => "workflow.template.activated",
            Self::WorkflowTemplateDeactivated => "workflow.template.deactivated",
            Self::AutomationRuleCreated => "automation.rule.created",
            Self::AutomationRuleActivated => "automation.rule.activated",
            Self::AutomationRuleDeactivated => "automation.rule.deactivated",
            Self::WorkflowExecutionCompleted => "workflow.execution.completed",
            Self::WorkflowExecutionFailed => "workflow.execution.failed",
            Self::WorkflowExecutionCancelRequested => "workflow.execution.cancel_requested",
        }
    }

    /// Returns all audit actions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[AuditAction] = &[
            AuditAction::Create,
            AuditAction::Update,
            AuditAction::Delete,
            AuditAction::Export,
            AuditAction::AccessDenied,
            AuditAction::PermissionGranted,
            AuditAction::PermissionRevoked,
            AuditAction::WorkflowTemplateCreated,
            AuditAction::WorkflowTemplateActivated,
            AuditAction::WorkflowTemplateDeactivated,
            AuditAction::AutomationRuleCreated,
            AuditAction::AutomationRuleActivated,
            AuditAction::AutomationRuleDeactivated,
            AuditAction::WorkflowExecutionCompleted,
            AuditAction::WorkflowExecutionFailed,
            AuditAction::WorkflowExecutionCancelRequested,
        ];

        ALL
    }

    /// Returns the standard risk classification of the action.
    #[must_use]
    pub fn default_risk(&self) -> RiskLevel {
        match self {
            Self::PermissionGranted | Self::PermissionRevoked => RiskLevel::Critical,
            Self::Delete | Self::Export => RiskLevel::High,
            Self::AccessDenied
            | Self::WorkflowTemplateActivated
            | Self::WorkflowTemplateDeactivated
            | Self::AutomationRuleActivated
            | Self::AutomationRuleDeactivated
            | Self::WorkflowExecutionFailed
            | Self::WorkflowExecutionCancelRequested => RiskLevel::Medium,
            Self::Create
            | Self::Update
            | Self::WorkflowTemplateCreated
            | Self::AutomationRuleCreated
            | Self::WorkflowExecutionCompleted => RiskLevel::Low,
        }
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown audit action '{value}'")))
    }
}

impl TryFrom<String> for AuditAction {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<AuditAction> for String {
    fn from(value: AuditAction) -> Self {
        value.as_str().to_owned()
    }
}

impl Display for AuditAction {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Risk classification of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Routine change.
    Low,
    /// Change worth reviewing.
    Medium,
    /// Destructive or bulk change.
    High,
    /// Change of the security boundary itself.
    Critical,
}

impl RiskLevel {
    /// Returns a stable storage value for this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(AppError::Validation(format!("unknown risk level '{value}'"))),
        }
    }
}

/// What happened, as described by the caller of the audit recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Audited action.
    pub action: AuditAction,
    /// Resource family, e.g. `task` or `workflow_template`.
    pub resource_type: String,
    /// Affected resource id.
    pub resource_id: Option<String>,
    /// State before the change.
    pub old_values: Option<Value>,
    /// State after the change.
    pub new_values: Option<Value>,
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// Whether the action was blocked by policy.
    pub blocked: bool,
    /// Failure or denial reason.
    pub error_message: Option<String>,
}

impl AuditEvent {
    /// Creates an event classified with the action's default risk.
    #[must_use]
    pub fn new(action: AuditAction, resource_type: impl Into<String>) -> Self {
        Self {
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            old_values: None,
            new_values: None,
            risk_level: action.default_risk(),
            blocked: false,
            error_message: None,
        }
    }

    /// Creates a blocked access event.
    #[must_use]
    pub fn denied(resource_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AuditAction::AccessDenied, resource_type).blocked(reason)
    }

    /// Sets the affected resource id.
    #[must_use]
    pub fn with_resource_id(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    /// Sets the previous state.
    #[must_use]
    pub fn with_old_values(mut self, values: Value) -> Self {
        self.old_values = Some(values);
        self
    }

    /// Sets the new state.
    #[must_use]
    pub fn with_new_values(mut self, values: Value) -> Self {
        self.new_values = Some(values);
        self
    }

    /// Overrides the risk classification.
    #[must_use]
    pub fn with_risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    /// Records a failure without marking the action as blocked.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Marks the event as blocked by policy.
    #[must_use]
    pub fn blocked(mut self, reason: impl Into<String>) -> Self {
        self.blocked = true;
        self.error_message = Some(reason.into());
        self
    }
}

/// Everything a store needs to append one record to a tenant chain.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecordDraft {
    /// Tenant whose chain receives the record.
    pub tenant_id: TenantId,
    /// Acting user.
    pub user_id: UserId,
    /// Unit of work the record belongs to.
    pub correlation_id: CorrelationId,
    /// Caller supplied event.
    pub event: AuditEvent,
    /// Client address.
    pub ip: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Append time.
    pub created_at: DateTime<Utc>,
}

/// Position of a record in its tenant chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    /// One-based position inside the tenant chain.
    pub sequence: i64,
    /// Hash of the preceding record, or [`GENESIS_HASH`].
    pub previous_hash: String,
}

impl ChainLink {
    /// Returns the link of the first record of a chain.
    #[must_use]
    pub fn genesis() -> Self {
        Self {
            sequence: 1,
            previous_hash: GENESIS_HASH.to_owned(),
        }
    }

    /// Returns the link following the given record.
    #[must_use]
    pub fn after(record: &AuditRecord) -> Self {
        Self {
            sequence: record.sequence + 1,
            previous_hash: record.record_hash.clone(),
        }
    }
}

/// Immutable, hash-chained audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record id.
    pub id: AuditRecordId,
    /// Tenant.
    pub tenant_id: TenantId,
    /// Acting user.
    pub user_id: UserId,
    /// Unit of work.
    pub correlation_id: CorrelationId,
    /// Audited action.
    pub action: AuditAction,
    /// Resource family.
    pub resource_type: String,
    /// Affected resource id.
    pub resource_id: Option<String>,
    /// State before the change.
    pub old_values: Option<Value>,
    /// State after the change.
    pub new_values: Option<Value>,
    /// Client address.
    pub ip: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// Whether the action was blocked.
    pub blocked: bool,
    /// Failure or denial reason.
    pub error_message: Option<String>,
    /// Append time, microsecond precision.
    pub created_at: DateTime<Utc>,
    /// One-based position in the tenant chain.
    pub sequence: i64,
    /// Hash of the preceding record.
    pub previous_hash: String,
    /// SHA-256 over the record content and `previous_hash`.
    pub record_hash: String,
}

impl AuditRecord {
    /// Seals a draft into the next record of a tenant chain.
    #[must_use]
    pub fn seal(draft: AuditRecordDraft, link: ChainLink) -> Self {
        let AuditRecordDraft {
            tenant_id,
            user_id,
            correlation_id,
            event,
            ip,
            user_agent,
            created_at,
        } = draft;

        let mut record = Self {
            id: AuditRecordId::new(),
            tenant_id,
            user_id,
            correlation_id,
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            old_values: event.old_values,
            new_values: event.new_values,
            ip,
            user_agent,
            risk_level: event.risk_level,
            blocked: event.blocked,
            error_message: event.error_message,
            created_at: created_at.trunc_subsecs(6),
            sequence: link.sequence,
            previous_hash: link.previous_hash,
            record_hash: String::new(),
        };
        record.record_hash = record.compute_hash();
        record
    }

    /// Recomputes the content hash from the stored fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let fields = [
            self.id.to_string(),
            self.tenant_id.to_string(),
            self.user_id.to_string(),
            self.correlation_id.to_string(),
            self.action.as_str().to_owned(),
            self.resource_type.clone(),
            self.resource_id.clone().unwrap_or_default(),
            canonical_json(self.old_values.as_ref()),
            canonical_json(self.new_values.as_ref()),
            self.ip.clone().unwrap_or_default(),
            self.user_agent.clone().unwrap_or_default(),
            self.risk_level.as_str().to_owned(),
            self.blocked.to_string(),
            self.error_message.clone().unwrap_or_default(),
            self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.sequence.to_string(),
            self.previous_hash.clone(),
        ];

        for field in fields {
            hasher.update(field.len().to_string().as_bytes());
            hasher.update(b":");
            hasher.update(field.as_bytes());
            hasher.update(b"\n");
        }

        hex::encode(hasher.finalize())
    }
}

fn canonical_json(value: Option<&Value>) -> String {
    value.map(Value::to_string).unwrap_or_default()
}

/// Outcome of verifying one tenant chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// Number of records inspected.
    pub checked: usize,
    /// Sequence of the first record failing verification.
    pub first_broken_sequence: Option<i64>,
    /// Why that record failed.
    pub reason: Option<String>,
}

impl ChainVerification {
    /// Returns whether the whole chain verified.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.first_broken_sequence.is_none()
    }
}

/// Verifies a tenant chain given its records in ascending sequence order.
#[must_use]
pub fn verify_chain(records: &[AuditRecord]) -> ChainVerification {
    let mut expected = ChainLink::genesis();

    for (index, record) in records.iter().enumerate() {
        let failure = if record.sequence != expected.sequence {
            Some(format!(
                "expected sequence {} but found {}",
                expected.sequence, record.sequence
            ))
        } else if record.previous_hash != expected.previous_hash {
            Some("previous hash does not match preceding record".to_owned())
        } else if record.compute_hash() != record.record_hash {
            Some("record content does not match its hash".to_owned())
        } else {
            None
        };

        if let Some(reason) = failure {
            return ChainVerification {
                checked: index + 1,
                first_broken_sequence: Some(record.sequence),
                reason: Some(reason),
            };
        }

        expected = ChainLink::after(record);
    }

    ChainVerification {
        checked: records.len(),
        first_broken_sequence: None,
        reason: None,
    }
}
