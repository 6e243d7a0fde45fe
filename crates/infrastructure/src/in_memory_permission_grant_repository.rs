use std::collections::HashMap;

use async_trait::async_trait;
use bureau_application::PermissionGrantRepository;
use bureau_core::{AppResult, TenantId, UserId};
use bureau_domain::{Permission, PermissionGrant};
use tokio::sync::RwLock;

type GrantKey = (TenantId, UserId, Permission);

/// In-memory permission grant store keyed by tenant, user and permission.
#[derive(Debug, Default)]
pub struct InMemoryPermissionGrantRepository {
    grants: RwLock<HashMap<GrantKey, PermissionGrant>>,
}

impl InMemoryPermissionGrantRepository {
    /// Creates an empty grant store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionGrantRepository for InMemoryPermissionGrantRepository {
    async fn list_grants_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<Vec<PermissionGrant>> {
        let grants = self.grants.read().await;
        let mut values = grants
            .values()
            .filter(|grant| grant.tenant_id() == tenant_id && grant.user_id() == user_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by_key(PermissionGrant::permission);
        Ok(values)
    }

    async fn list_grants(&self, tenant_id: TenantId) -> AppResult<Vec<PermissionGrant>> {
        let grants = self.grants.read().await;
        let mut values = grants
            .values()
            .filter(|grant| grant.tenant_id() == tenant_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by_key(|grant| (grant.user_id(), grant.permission()));
        Ok(values)
    }

    async fn find_grant(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        permission: Permission,
    ) -> AppResult<Option<PermissionGrant>> {
        Ok(self
            .grants
            .read()
            .await
            .get(&(tenant_id, user_id, permission))
            .cloned())
    }

    async fn save_grant(&self, grant: PermissionGrant) -> AppResult<()> {
        let key = (grant.tenant_id(), grant.user_id(), grant.permission());
        self.grants.write().await.insert(key, grant);
        Ok(())
    }
}
