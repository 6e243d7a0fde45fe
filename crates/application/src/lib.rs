//! Application services and ports.

#![forbid(unsafe_code)]

mod access_service;
mod action_executors;
mod audit_ports;
mod audit_recorder;
mod audit_service;
mod authorization_ports;
mod authorization_service;
mod automation_service;
mod executor_ports;
mod request_context;
mod security_admin_service;
mod workflow_ports;

#[cfg(test)]
mod test_support;

pub use access_service::AccessFilter;
pub use action_executors::{
    ActionExecutor, ActionInvocation, AggregateRecordsExecutor, CreateAiTaskExecutor,
    ExecutorError, ExecutorRegistry, FindAppointmentsExecutor, SendDigestExecutor,
    SendReminderExecutor,
};
pub use audit_ports::{AuditQuery, AuditRepository};
pub use audit_recorder::{AuditRecorder, AuditWritePolicy};
pub use audit_service::AuditTrailService;
pub use authorization_ports::PermissionGrantRepository;
pub use authorization_service::AuthorizationService;
pub use automation_service::{
    AutomationEventQueue, AutomationEventReceiver, AutomationService, FiringOutcome,
    QueuedEvent, RetryPolicy, TickReport,
};
pub use executor_ports::{
    AiSummarizer, NewTask, Notification, NotificationChannel, NotificationSender, OfficeRecord,
    OfficeRecordStore, RecordFilter, SummaryRequest,
};
pub use request_context::{ClientInfo, RequestContext};
pub use security_admin_service::{GrantPermissionInput, SecurityAdminService};
pub use workflow_ports::{
    AutomationRuleRepository, ExecutionListQuery, SchedulerLease, SchedulerLeaseCoordinator,
    WorkflowRepository,
};
