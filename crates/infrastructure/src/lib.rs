//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod circuit_breaker;
mod console_notification_sender;
mod http_ai_summarizer;
mod http_notification_sender;
mod http_response;
mod in_memory_audit_repository;
mod in_memory_automation_rule_repository;
mod in_memory_office_record_store;
mod in_memory_permission_grant_repository;
mod in_memory_scheduler_lease_coordinator;
mod in_memory_workflow_repository;
mod postgres_audit_repository;
mod postgres_automation_rule_repository;
mod postgres_errors;
mod postgres_office_record_store;
mod postgres_permission_grant_repository;
mod postgres_workflow_repository;
mod redis_scheduler_lease_coordinator;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakingAiSummarizer, CircuitBreakingNotificationSender,
};
pub use console_notification_sender::ConsoleNotificationSender;
pub use http_ai_summarizer::HttpAiSummarizer;
pub use http_notification_sender::HttpNotificationSender;
pub use in_memory_audit_repository::InMemoryAuditRepository;
pub use in_memory_automation_rule_repository::InMemoryAutomationRuleRepository;
pub use in_memory_office_record_store::InMemoryOfficeRecordStore;
pub use in_memory_permission_grant_repository::InMemoryPermissionGrantRepository;
pub use in_memory_scheduler_lease_coordinator::InMemorySchedulerLeaseCoordinator;
pub use in_memory_workflow_repository::InMemoryWorkflowRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_automation_rule_repository::PostgresAutomationRuleRepository;
pub use postgres_office_record_store::PostgresOfficeRecordStore;
pub use postgres_permission_grant_repository::PostgresPermissionGrantRepository;
pub use postgres_workflow_repository::PostgresWorkflowRepository;
pub use redis_scheduler_lease_coordinator::RedisSchedulerLeaseCoordinator;
