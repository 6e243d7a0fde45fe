use bureau_core::{AppError, Role, TenantId, UserId};
use bureau_domain::{AuditAction, Permission, RiskLevel};
use chrono::{Duration, Utc};

use super::{GrantPermissionInput, SecurityAdminService};
use crate::test_support::{AuthorizationFixture, context};

fn service(fixture: &AuthorizationFixture) -> SecurityAdminService {
    SecurityAdminService::new(
        fixture.authorization.clone(),
        fixture.grant_repository.clone(),
    )
}

#[tokio::test]
async fn admin_grant_is_effective_and_audited_as_critical() {
    let fixture = AuthorizationFixture::new();
    let service = service(&fixture);
    let tenant_id = TenantId::new();
    let admin = context(tenant_id, Role::Admin);
    let employee = context(tenant_id, Role::Employee);

    let grant = service
        .grant_permission(
            &admin,
            GrantPermissionInput {
                user_id: employee.user_id(),
                permission: Permission::TaskAssign,
                expires_at: Some(Utc::now() + Duration::days(1)),
            },
        )
        .await;
    assert!(grant.is_ok());
    assert!(
        fixture
            .authorization
            .has_permission(employee.principal(), Permission::TaskAssign)
            .await
    );

    let records = fixture.audit_repository.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, AuditAction::PermissionGranted);
    assert_eq!(records[0].risk_level, RiskLevel::Critical);
}

#[tokio::test]
async fn regrant_replaces_expiry_of_the_same_row() {
    let fixture = AuthorizationFixture::new();
    let service = service(&fixture);
    let tenant_id = TenantId::new();
    let admin = context(tenant_id, Role::Admin);
    let user_id = UserId::new();

    for expires_at in [Some(Utc::now() + Duration::hours(1)), None] {
        let result = service
            .grant_permission(
                &admin,
                GrantPermissionInput {
                    user_id,
                    permission: Permission::NoteDelete,
                    expires_at,
                },
            )
            .await;
        assert!(result.is_ok());
    }

    let grants = service.list_grants(&admin, Some(user_id)).await;
    assert!(matches!(grants, Ok(ref value) if value.len() == 1 && value[0].expires_at().is_none()));
}

#[tokio::test]
async fn revoke_expires_grant_without_deleting_it() {
    let fixture = AuthorizationFixture::new();
    let service = service(&fixture);
    let tenant_id = TenantId::new();
    let admin = context(tenant_id, Role::Admin);
    let employee = context(tenant_id, Role::Employee);

    let granted = service
        .grant_permission(
            &admin,
            GrantPermissionInput {
                user_id: employee.user_id(),
                permission: Permission::CustomerDelete,
                expires_at: None,
            },
        )
        .await;
    assert!(granted.is_ok());

    let revoked = service
        .revoke_permission(&admin, employee.user_id(), Permission::CustomerDelete)
        .await;
    assert!(matches!(revoked, Ok(ref grant) if grant.expires_at().is_some()));
    assert!(
        !fixture
            .authorization
            .has_permission(employee.principal(), Permission::CustomerDelete)
            .await
    );

    let grants = service.list_grants(&admin, None).await;
    assert!(matches!(grants, Ok(ref value) if value.len() == 1));
}

#[tokio::test]
async fn non_admin_cannot_grant() {
    let fixture = AuthorizationFixture::new();
    let service = service(&fixture);
    let tenant_id = TenantId::new();
    let manager = context(tenant_id, Role::Manager);

    let result = service
        .grant_permission(
            &manager,
            GrantPermissionInput {
                user_id: UserId::new(),
                permission: Permission::AdminUsers,
                expires_at: None,
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let records = fixture.audit_repository.records().await;
    assert!(records.iter().all(|record| record.blocked));
}

#[tokio::test]
async fn granted_admin_permission_does_not_let_non_admins_grant() {
    let fixture = AuthorizationFixture::new();
    let service = service(&fixture);
    let tenant_id = TenantId::new();
    let admin = context(tenant_id, Role::Admin);
    let employee = context(tenant_id, Role::Employee);

    let delegated = service
        .grant_permission(
            &admin,
            GrantPermissionInput {
                user_id: employee.user_id(),
                permission: Permission::AdminUsers,
                expires_at: None,
            },
        )
        .await;
    assert!(delegated.is_ok());

    let escalated = service
        .grant_permission(
            &employee,
            GrantPermissionInput {
                user_id: employee.user_id(),
                permission: Permission::WorkflowManage,
                expires_at: None,
            },
        )
        .await;
    assert!(matches!(escalated, Err(AppError::Forbidden(_))));
    assert!(matches!(
        service.list_grants(&employee, None).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(
        !fixture
            .authorization
            .has_permission(employee.principal(), Permission::WorkflowManage)
            .await
    );

    let records = fixture.audit_repository.records().await;
    assert_eq!(records.len(), 3);
    assert!(
        records[1..]
            .iter()
            .all(|record| record.blocked && record.action == AuditAction::AccessDenied)
    );
}

#[tokio::test]
async fn grant_expiring_in_the_past_is_stored_but_inert() {
    let fixture = AuthorizationFixture::new();
    let service = service(&fixture);
    let tenant_id = TenantId::new();
    let admin = context(tenant_id, Role::Admin);
    let employee = context(tenant_id, Role::Employee);

    let grant = service
        .grant_permission(
            &admin,
            GrantPermissionInput {
                user_id: employee.user_id(),
                permission: Permission::TaskAssign,
                expires_at: Some(Utc::now() - Duration::seconds(1)),
            },
        )
        .await;
    assert!(matches!(grant, Ok(ref value) if value.expires_at().is_some()));
    assert!(
        !fixture
            .authorization
            .has_permission(employee.principal(), Permission::TaskAssign)
            .await
    );

    let grants = service.list_grants(&admin, Some(employee.user_id())).await;
    assert!(matches!(grants, Ok(ref value) if value.len() == 1));
    let records = fixture.audit_repository.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, AuditAction::PermissionGranted);
}
