//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access;
mod audit;
mod automation_rule;
mod condition;
mod grant;
mod schedule;
mod security;
mod workflow;

pub use access::{
    AccessScope, OwnedRecord, RecordOwnership, ResourceSemantics, ResourceType, ScopeClause,
    ScopePredicate,
};
pub use audit::{
    AuditAction, AuditEvent, AuditRecord, AuditRecordDraft, ChainLink, ChainVerification,
    GENESIS_HASH, RiskLevel, verify_chain,
};
pub use automation_rule::{AutomationRule, AutomationRuleInput, MAX_COOLDOWN_MINUTES};
pub use condition::{ConditionOperator, ConditionSet, FieldCondition, lookup_path};
pub use grant::PermissionGrant;
pub use schedule::CronSchedule;
pub use security::{Permission, RolePermissionDefaults};
pub use workflow::{
    ActionOutcome, DomainEvent, ExecutionSource, ExecutionStatus, TriggerType, WorkflowAction,
    WorkflowExecution, WorkflowTemplate, WorkflowTemplateInput, WorkflowTrigger,
    validate_actions,
};
