mod lease;
mod repository;

pub use lease::{SchedulerLease, SchedulerLeaseCoordinator};
pub use repository::{AutomationRuleRepository, ExecutionListQuery, WorkflowRepository};
