use std::collections::HashMap;

use async_trait::async_trait;
use bureau_application::{AuditQuery, AuditRepository};
use bureau_core::{AppResult, TenantId};
use bureau_domain::{AuditRecord, AuditRecordDraft, ChainLink};
use tokio::sync::RwLock;

/// In-memory hash-chained audit store.
#[derive(Debug, Default)]
pub struct InMemoryAuditRepository {
    chains: RwLock<HashMap<TenantId, Vec<AuditRecord>>>,
}

impl InMemoryAuditRepository {
    /// Creates an empty audit store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append(&self, draft: AuditRecordDraft) -> AppResult<AuditRecord> {
        let mut chains = self.chains.write().await;
        let chain = chains.entry(draft.tenant_id).or_default();
        let link = chain.last().map_or_else(ChainLink::genesis, ChainLink::after);
        let record = AuditRecord::seal(draft, link);
        chain.push(record.clone());
        Ok(record)
    }

    async fn list_records(
        &self,
        tenant_id: TenantId,
        query: &AuditQuery,
    ) -> AppResult<Vec<AuditRecord>> {
        let chains = self.chains.read().await;
        Ok(chains
            .get(&tenant_id)
            .map(|chain| {
                chain
                    .iter()
                    .rev()
                    .filter(|record| query.matches(record))
                    .skip(query.offset)
                    .take(query.limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_chain(&self, tenant_id: TenantId) -> AppResult<Vec<AuditRecord>> {
        Ok(self
            .chains
            .read()
            .await
            .get(&tenant_id)
            .cloned()
            .unwrap_or_default())
    }
}
