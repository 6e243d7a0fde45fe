use std::collections::BTreeSet;
use std::sync::Arc;

use bureau_core::{AppError, AppResult, Principal, Role};
use bureau_domain::{AuditEvent, Permission, RolePermissionDefaults};
use chrono::Utc;
use tracing::error;

use crate::{AuditRecorder, PermissionGrantRepository, RequestContext};

/// Application service for tenant-scoped permission checks.
///
/// Effective permissions are the role defaults plus the non-expired grants of
/// the principal, evaluated on every call.
#[derive(Clone)]
pub struct AuthorizationService {
    repository: Arc<dyn PermissionGrantRepository>,
    audit: AuditRecorder,
}

impl AuthorizationService {
    /// Creates a new authorization service from a repository implementation.
    #[must_use]
    pub fn new(repository: Arc<dyn PermissionGrantRepository>, audit: AuditRecorder) -> Self {
        Self { repository, audit }
    }

    /// Returns the audit recorder shared with dependent services.
    #[must_use]
    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    /// Computes role defaults plus active grants of the principal.
    pub async fn effective_permissions(
        &self,
        principal: &Principal,
    ) -> AppResult<BTreeSet<Permission>> {
        let mut permissions = RolePermissionDefaults::permission_set(principal.role());
        if principal.is_service() {
            return Ok(permissions);
        }

        let grants = self
            .repository
            .list_grants_for_user(principal.tenant_id(), principal.user_id())
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("permission grant store unavailable: {error}"))
            })?;

        let now = Utc::now();
        permissions.extend(
            grants
                .iter()
                .filter(|grant| {
                    grant.tenant_id() == principal.tenant_id()
                        && grant.user_id() == principal.user_id()
                        && grant.is_active_at(now)
                })
                .map(|grant| grant.permission()),
        );

        Ok(permissions)
    }

    /// Returns whether the principal currently holds the permission.
    ///
    /// Never fails: a grant store failure is logged and answered with deny.
    pub async fn has_permission(&self, principal: &Principal, permission: Permission) -> bool {
        if RolePermissionDefaults::role_has(principal.role(), permission) {
            return true;
        }

        if principal.is_service() {
            return false;
        }

        match self
            .repository
            .find_grant(principal.tenant_id(), principal.user_id(), permission)
            .await
        {
            Ok(grant) => grant.is_some_and(|grant| {
                grant.tenant_id() == principal.tenant_id() && grant.is_active_at(Utc::now())
            }),
            Err(store_error) => {
                error!(
                    tenant_id = %principal.tenant_id(),
                    subject = %principal.subject(),
                    permission = permission.as_str(),
                    error = %store_error,
                    "permission grant store unavailable, denying"
                );
                false
            }
        }
    }

    /// Ensures the context principal holds the permission.
    ///
    /// A denial is recorded as a blocked audit record before the error returns.
    pub async fn require_permission(
        &self,
        context: &RequestContext,
        permission: Permission,
    ) -> AppResult<()> {
        if self.has_permission(context.principal(), permission).await {
            return Ok(());
        }

        let reason = format!(
            "subject '{}' is missing permission '{}' in tenant '{}'",
            context.principal().subject(),
            permission.as_str(),
            context.tenant_id()
        );
        self.audit
            .record(context, AuditEvent::denied(permission.family(), reason.clone()))
            .await?;

        Err(AppError::Forbidden(reason))
    }

    /// Ensures the context principal has the admin role and holds the permission.
    ///
    /// Grants never confer the admin role, so a granted permission alone does
    /// not open administrative operations.
    pub async fn require_admin_permission(
        &self,
        context: &RequestContext,
        permission: Permission,
    ) -> AppResult<()> {
        if context.principal().role() != Role::Admin {
            let reason = format!(
                "subject '{}' with role '{}' may not use '{}' in tenant '{}'",
                context.principal().subject(),
                context.principal().role().as_str(),
                permission.as_str(),
                context.tenant_id()
            );
            self.audit
                .record(context, AuditEvent::denied(permission.family(), reason.clone()))
                .await?;

            return Err(AppError::Forbidden(reason));
        }

        self.require_permission(context, permission).await
    }
}
