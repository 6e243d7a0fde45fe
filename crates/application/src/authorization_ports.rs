use async_trait::async_trait;
use bureau_core::{AppResult, TenantId, UserId};
use bureau_domain::{Permission, PermissionGrant};

/// Repository port for per-user permission grants.
#[async_trait]
pub trait PermissionGrantRepository: Send + Sync {
    /// Lists every stored grant of one user, expired ones included.
    async fn list_grants_for_user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> AppResult<Vec<PermissionGrant>>;

    /// Lists every stored grant of the tenant.
    async fn list_grants(&self, tenant_id: TenantId) -> AppResult<Vec<PermissionGrant>>;

    /// Finds the grant of one permission for one user.
    async fn find_grant(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        permission: Permission,
    ) -> AppResult<Option<PermissionGrant>>;

    /// Inserts the grant or replaces the row with the same tenant, user and permission.
    async fn save_grant(&self, grant: PermissionGrant) -> AppResult<()>;
}
