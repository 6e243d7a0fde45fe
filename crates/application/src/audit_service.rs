use std::sync::Arc;

use bureau_core::AppResult;
use bureau_domain::{AuditRecord, ChainVerification, Permission, verify_chain};
use tracing::{error, info};

use crate::{AuditQuery, AuditRepository, AuthorizationService, RequestContext};

/// Read side of the audit trail for administrators.
#[derive(Clone)]
pub struct AuditTrailService {
    authorization_service: AuthorizationService,
    repository: Arc<dyn AuditRepository>,
}

impl AuditTrailService {
    /// Creates an audit trail service.
    #[must_use]
    pub fn new(
        authorization_service: AuthorizationService,
        repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            authorization_service,
            repository,
        }
    }

    /// Lists audit records of the context tenant, newest first.
    pub async fn list_records(
        &self,
        context: &RequestContext,
        query: AuditQuery,
    ) -> AppResult<Vec<AuditRecord>> {
        self.authorization_service
            .require_permission(context, Permission::AdminAudit)
            .await?;

        self.repository
            .list_records(context.tenant_id(), &query)
            .await
    }

    /// Verifies the hash chain of the context tenant.
    pub async fn verify_chain(&self, context: &RequestContext) -> AppResult<ChainVerification> {
        self.authorization_service
            .require_permission(context, Permission::AdminAudit)
            .await?;

        let records = self.repository.list_chain(context.tenant_id()).await?;
        let verification = verify_chain(&records);

        if verification.is_intact() {
            info!(
                target: "audit",
                tenant_id = %context.tenant_id(),
                checked = verification.checked,
                "audit chain verified"
            );
        } else {
            error!(
                target: "audit",
                tenant_id = %context.tenant_id(),
                first_broken_sequence = verification.first_broken_sequence,
                reason = verification.reason.as_deref().unwrap_or_default(),
                "audit chain integrity violation"
            );
        }

        Ok(verification)
    }
}

#[cfg(test)]
mod tests {
    use bureau_core::{AppError, Role, TenantId};
    use bureau_domain::{AuditAction, AuditEvent};

    use super::AuditTrailService;
    use crate::AuditQuery;
    use crate::test_support::{AuthorizationFixture, context};

    fn service(fixture: &AuthorizationFixture) -> AuditTrailService {
        AuditTrailService::new(
            fixture.authorization.clone(),
            fixture.audit_repository.clone(),
        )
    }

    #[tokio::test]
    async fn records_of_one_request_share_the_correlation_id() {
        let fixture = AuthorizationFixture::new();
        let tenant_id = TenantId::new();
        let employee = context(tenant_id, Role::Employee);
        let admin = context(tenant_id, Role::Admin);
        let audit = fixture.authorization.audit();

        for action in [AuditAction::Create, AuditAction::Update] {
            let result = audit
                .record(&employee, AuditEvent::new(action, "task"))
                .await;
            assert!(matches!(result, Ok(Some(_))));
        }

        let records = service(&fixture)
            .list_records(
                &admin,
                AuditQuery {
                    correlation_id: Some(employee.correlation_id()),
                    ..AuditQuery::default()
                },
            )
            .await;
        assert!(matches!(records, Ok(ref value) if value.len() == 2));
    }

    #[tokio::test]
    async fn listing_is_confined_to_the_caller_tenant() {
        let fixture = AuthorizationFixture::new();
        let audit = fixture.authorization.audit();
        let other = context(TenantId::new(), Role::Employee);
        let result = audit
            .record(&other, AuditEvent::new(AuditAction::Delete, "note"))
            .await;
        assert!(result.is_ok());

        let admin = context(TenantId::new(), Role::Admin);
        let records = service(&fixture)
            .list_records(&admin, AuditQuery::default())
            .await;
        assert!(matches!(records, Ok(ref value) if value.is_empty()));
    }

    #[tokio::test]
    async fn verify_chain_reports_tampering() {
        let fixture = AuthorizationFixture::new();
        let tenant_id = TenantId::new();
        let admin = context(tenant_id, Role::Admin);
        let audit = fixture.authorization.audit();

        for _ in 0..3 {
            let result = audit
                .record(&admin, AuditEvent::new(AuditAction::Update, "customer"))
                .await;
            assert!(result.is_ok());
        }

        let service = service(&fixture);
        let intact = service.verify_chain(&admin).await;
        assert!(matches!(intact, Ok(ref value) if value.is_intact()));

        fixture.audit_repository.tamper(1, "rewritten").await;
        let broken = service.verify_chain(&admin).await;
        assert!(matches!(broken, Ok(ref value) if value.first_broken_sequence == Some(2)));
    }

    #[tokio::test]
    async fn audit_reads_require_admin_audit() {
        let fixture = AuthorizationFixture::new();
        let manager = context(TenantId::new(), Role::Manager);

        let result = service(&fixture).verify_chain(&manager).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
