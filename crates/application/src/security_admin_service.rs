use std::sync::Arc;

use bureau_core::{AppError, AppResult, UserId};
use bureau_domain::{AuditAction, AuditEvent, Permission, PermissionGrant};
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::{AuthorizationService, PermissionGrantRepository, RequestContext};

/// Input payload for granting one permission to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantPermissionInput {
    /// Grantee.
    pub user_id: UserId,
    /// Granted permission.
    pub permission: Permission,
    /// Optional expiry. A grant expiring in the past is stored but inert.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Administrative service for per-user permission grants.
#[derive(Clone)]
pub struct SecurityAdminService {
    authorization_service: AuthorizationService,
    repository: Arc<dyn PermissionGrantRepository>,
}

impl SecurityAdminService {
    /// Creates a security admin service.
    #[must_use]
    pub fn new(
        authorization_service: AuthorizationService,
        repository: Arc<dyn PermissionGrantRepository>,
    ) -> Self {
        Self {
            authorization_service,
            repository,
        }
    }

    /// Grants a permission, replacing granter and expiry of an existing grant.
    pub async fn grant_permission(
        &self,
        context: &RequestContext,
        input: GrantPermissionInput,
    ) -> AppResult<PermissionGrant> {
        self.authorization_service
            .require_admin_permission(context, Permission::AdminUsers)
            .await?;

        if input.user_id.is_service() {
            return Err(AppError::Validation(
                "permissions cannot be granted to the service identity".to_owned(),
            ));
        }

        let now = Utc::now();

        let existing = self
            .repository
            .find_grant(context.tenant_id(), input.user_id, input.permission)
            .await?;
        let old_values = existing.as_ref().map(grant_values);

        let grant = match existing {
            Some(mut grant) => {
                grant.regrant(context.user_id(), now, input.expires_at);
                grant
            }
            None => PermissionGrant::new(
                context.tenant_id(),
                input.user_id,
                input.permission,
                context.user_id(),
                now,
                input.expires_at,
            ),
        };

        self.repository.save_grant(grant.clone()).await?;

        let mut event = AuditEvent::new(AuditAction::PermissionGranted, "permission_grant")
            .with_resource_id(grant.id())
            .with_new_values(grant_values(&grant));
        if let Some(old_values) = old_values {
            event = event.with_old_values(old_values);
        }
        self.authorization_service
            .audit()
            .record(context, event)
            .await?;

        Ok(grant)
    }

    /// Revokes a grant logically by expiring it now.
    pub async fn revoke_permission(
        &self,
        context: &RequestContext,
        user_id: UserId,
        permission: Permission,
    ) -> AppResult<PermissionGrant> {
        self.authorization_service
            .require_admin_permission(context, Permission::AdminUsers)
            .await?;

        let mut grant = self
            .repository
            .find_grant(context.tenant_id(), user_id, permission)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "grant of '{}' to user '{user_id}' does not exist",
                    permission.as_str()
                ))
            })?;

        let old_values = grant_values(&grant);
        grant.revoke(Utc::now());
        self.repository.save_grant(grant.clone()).await?;

        self.authorization_service
            .audit()
            .record(
                context,
                AuditEvent::new(AuditAction::PermissionRevoked, "permission_grant")
                    .with_resource_id(grant.id())
                    .with_old_values(old_values)
                    .with_new_values(grant_values(&grant)),
            )
            .await?;

        Ok(grant)
    }

    /// Lists grants of the tenant, optionally of one user, expired ones included.
    pub async fn list_grants(
        &self,
        context: &RequestContext,
        user_id: Option<UserId>,
    ) -> AppResult<Vec<PermissionGrant>> {
        self.authorization_service
            .require_admin_permission(context, Permission::AdminUsers)
            .await?;

        match user_id {
            Some(user_id) => {
                self.repository
                    .list_grants_for_user(context.tenant_id(), user_id)
                    .await
            }
            None => self.repository.list_grants(context.tenant_id()).await,
        }
    }
}

fn grant_values(grant: &PermissionGrant) -> serde_json::Value {
    json!({
        "user_id": grant.user_id(),
        "permission": grant.permission(),
        "granted_by": grant.granted_by(),
        "granted_at": grant.granted_at(),
        "expires_at": grant.expires_at(),
    })
}

#[cfg(test)]
mod tests;
