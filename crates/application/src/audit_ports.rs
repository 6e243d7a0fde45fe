use async_trait::async_trait;
use bureau_core::{AppResult, CorrelationId, TenantId, UserId};
use bureau_domain::{AuditAction, AuditRecord, AuditRecordDraft};
use chrono::{DateTime, Utc};

/// Filter for audit trail listings. Unset fields do not restrict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    /// Records of one unit of work.
    pub correlation_id: Option<CorrelationId>,
    /// Records of one acting user.
    pub user_id: Option<UserId>,
    /// Records of one action.
    pub action: Option<AuditAction>,
    /// Records of one resource family.
    pub resource_type: Option<String>,
    /// Records of one resource.
    pub resource_id: Option<String>,
    /// Only blocked records.
    pub blocked_only: bool,
    /// Inclusive lower time bound.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper time bound.
    pub until: Option<DateTime<Utc>>,
    /// Page size.
    pub limit: usize,
    /// Row offset.
    pub offset: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            correlation_id: None,
            user_id: None,
            action: None,
            resource_type: None,
            resource_id: None,
            blocked_only: false,
            since: None,
            until: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl AuditQuery {
    /// Returns whether a record satisfies the filter, ignoring paging.
    #[must_use]
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.correlation_id
            .is_none_or(|value| value == record.correlation_id)
            && self.user_id.is_none_or(|value| value == record.user_id)
            && self.action.is_none_or(|value| value == record.action)
            && self
                .resource_type
                .as_deref()
                .is_none_or(|value| value == record.resource_type)
            && self
                .resource_id
                .as_deref()
                .is_none_or(|value| Some(value) == record.resource_id.as_deref())
            && (!self.blocked_only || record.blocked)
            && self.since.is_none_or(|value| record.created_at >= value)
            && self.until.is_none_or(|value| record.created_at < value)
    }
}

/// Port for the append-only, hash-chained audit store.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Appends one record to the tenant chain.
    ///
    /// Implementations read the chain head and seal the draft atomically so
    /// concurrent appends never share a sequence.
    async fn append(&self, draft: AuditRecordDraft) -> AppResult<AuditRecord>;

    /// Lists records newest first.
    async fn list_records(
        &self,
        tenant_id: TenantId,
        query: &AuditQuery,
    ) -> AppResult<Vec<AuditRecord>>;

    /// Lists the whole tenant chain in ascending sequence order.
    async fn list_chain(&self, tenant_id: TenantId) -> AppResult<Vec<AuditRecord>>;
}
