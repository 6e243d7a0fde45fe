use std::fmt::{Display, Formatter};
use std::str::FromStr;

use async_trait::async_trait;
use bureau_core::{AppError, AppResult, CorrelationId, RecordId, TenantId, UserId};
use bureau_domain::{OwnedRecord, RecordOwnership, ResourceType, ScopePredicate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Delivery channel of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    /// E-mail.
    Email,
    /// Text message.
    Sms,
    /// Telegram bot message.
    Telegram,
}

impl NotificationChannel {
    /// Returns stable channel value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Telegram => "telegram",
        }
    }
}

impl FromStr for NotificationChannel {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "telegram" => Ok(Self::Telegram),
            _ => Err(AppError::Validation(format!(
                "unknown notification channel '{value}'"
            ))),
        }
    }
}

impl Display for NotificationChannel {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Message addressed to one user of the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Tenant of the recipient.
    pub tenant_id: TenantId,
    /// Recipient user.
    pub recipient_id: UserId,
    /// Delivery channel.
    pub channel: NotificationChannel,
    /// Optional subject line.
    pub subject: Option<String>,
    /// Message body.
    pub body: String,
    /// Unit of work that produced the message.
    pub correlation_id: CorrelationId,
}

/// Port for outbound notifications.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Delivers one notification and returns a provider delivery id.
    async fn send(&self, notification: Notification) -> AppResult<String>;
}

/// Text summarization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRequest {
    /// Tenant the text belongs to.
    pub tenant_id: TenantId,
    /// Text to summarize.
    pub text: String,
    /// Optional extra instructions.
    pub instructions: Option<String>,
}

/// Port for the opaque AI summarization function.
#[async_trait]
pub trait AiSummarizer: Send + Sync {
    /// Returns a summary of the text.
    async fn summarize(&self, request: SummaryRequest) -> AppResult<String>;
}

/// Tenant-scoped office row as seen by automation executors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfficeRecord {
    /// Row id.
    pub id: RecordId,
    /// Resource family.
    pub resource_type: ResourceType,
    /// Ownership projection used by the access filter.
    pub ownership: RecordOwnership,
    /// Remaining columns as JSON.
    pub attributes: Value,
}

impl OwnedRecord for OfficeRecord {
    fn ownership(&self) -> RecordOwnership {
        self.ownership.clone()
    }
}

/// Additional row filter applied inside the scope predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Rows whose `starts_at` is at or after this time.
    pub starts_from: Option<DateTime<Utc>>,
    /// Rows whose `starts_at` is before this time.
    pub starts_until: Option<DateTime<Utc>>,
    /// Rows with this status.
    pub status: Option<String>,
    /// Maximum rows returned.
    pub limit: Option<usize>,
}

/// Follow-up task created by automation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Task title.
    pub title: String,
    /// Task description.
    pub description: String,
    /// Creator.
    pub owner_id: UserId,
    /// Assigned user.
    pub assignee_id: Option<UserId>,
    /// Optional due date.
    pub due_at: Option<DateTime<Utc>>,
}

/// Port for reading and writing office rows on behalf of executors.
#[async_trait]
pub trait OfficeRecordStore: Send + Sync {
    /// Lists rows matching the scope predicate and filter.
    async fn list_records(
        &self,
        resource_type: ResourceType,
        predicate: &ScopePredicate,
        filter: &RecordFilter,
    ) -> AppResult<Vec<OfficeRecord>>;

    /// Finds one row of the tenant without applying any user scope.
    async fn find_record(
        &self,
        tenant_id: TenantId,
        resource_type: ResourceType,
        record_id: RecordId,
    ) -> AppResult<Option<OfficeRecord>>;

    /// Creates a task row.
    async fn create_task(&self, tenant_id: TenantId, task: NewTask) -> AppResult<OfficeRecord>;
}
