use bureau_core::{AppError, AppResult, Principal, RecordId};
use bureau_domain::{
    AccessScope, AuditEvent, OwnedRecord, Permission, RecordOwnership, ResourceType,
    ScopePredicate,
};
use tracing::warn;

use crate::{AuthorizationService, RequestContext};

/// Row-level access filter applied to every read and write.
///
/// Out-of-scope rows are reported exactly like missing rows.
#[derive(Clone)]
pub struct AccessFilter {
    authorization_service: AuthorizationService,
}

impl AccessFilter {
    /// Creates an access filter.
    #[must_use]
    pub fn new(authorization_service: AuthorizationService) -> Self {
        Self {
            authorization_service,
        }
    }

    /// Returns the authorization service used for permission checks.
    #[must_use]
    pub fn authorization(&self) -> &AuthorizationService {
        &self.authorization_service
    }

    /// Resolves the scope of a principal for one resource type.
    #[must_use]
    pub fn resolve_scope(&self, principal: &Principal, resource_type: ResourceType) -> AccessScope {
        AccessScope::resolve(principal, resource_type)
    }

    /// Checks the read permission and returns the query predicate for list reads.
    pub async fn scoped_predicate(
        &self,
        context: &RequestContext,
        resource_type: ResourceType,
    ) -> AppResult<ScopePredicate> {
        self.authorization_service
            .require_permission(context, resource_type.read_permission())
            .await?;

        Ok(self
            .resolve_scope(context.principal(), resource_type)
            .predicate())
    }

    /// Authorizes a single-row read.
    ///
    /// `ownership` is `None` when the row does not exist.
    pub async fn authorize_read(
        &self,
        context: &RequestContext,
        resource_type: ResourceType,
        resource_id: RecordId,
        ownership: Option<&RecordOwnership>,
    ) -> AppResult<()> {
        self.authorize(
            context,
            resource_type,
            resource_id,
            ownership,
            resource_type.read_permission(),
        )
        .await
    }

    /// Authorizes an update or delete of a single row.
    pub async fn authorize_write(
        &self,
        context: &RequestContext,
        resource_type: ResourceType,
        resource_id: RecordId,
        ownership: Option<&RecordOwnership>,
        permission: Permission,
    ) -> AppResult<()> {
        self.authorize(context, resource_type, resource_id, ownership, permission)
            .await
    }

    /// Keeps only the rows visible to the context principal.
    #[must_use]
    pub fn filter_visible<T: OwnedRecord>(
        &self,
        context: &RequestContext,
        resource_type: ResourceType,
        rows: Vec<T>,
    ) -> Vec<T> {
        self.resolve_scope(context.principal(), resource_type)
            .filter_visible(rows)
    }

    async fn authorize(
        &self,
        context: &RequestContext,
        resource_type: ResourceType,
        resource_id: RecordId,
        ownership: Option<&RecordOwnership>,
        permission: Permission,
    ) -> AppResult<()> {
        self.authorization_service
            .require_permission(context, permission)
            .await?;

        let not_found = || {
            AppError::NotFound(format!(
                "{} '{resource_id}' does not exist",
                resource_type.as_str()
            ))
        };

        let Some(ownership) = ownership else {
            return Err(not_found());
        };

        let scope = self.resolve_scope(context.principal(), resource_type);
        if scope.permits(ownership) {
            return Ok(());
        }

        let cross_tenant = ownership.tenant_id != context.tenant_id();
        warn!(
            tenant_id = %context.tenant_id(),
            subject = %context.principal().subject(),
            resource_type = resource_type.as_str(),
            resource_id = %resource_id,
            scope = scope.kind(),
            cross_tenant,
            "blocked out-of-scope access"
        );

        let reason = if cross_tenant {
            "record belongs to another tenant".to_owned()
        } else {
            format!("record is outside the {} scope", scope.kind())
        };
        self.authorization_service
            .audit()
            .record(
                context,
                AuditEvent::denied(resource_type.as_str(), reason).with_resource_id(resource_id),
            )
            .await?;

        Err(not_found())
    }
}
