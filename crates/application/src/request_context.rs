use bureau_core::{AppResult, CorrelationId, IdentityClaims, Principal, TenantId, UserId};
use serde::{Deserialize, Serialize};

/// Client metadata captured for audit records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Remote address.
    pub ip: Option<String>,
    /// User agent header.
    pub user_agent: Option<String>,
}

/// Explicit per-request or per-job context passed through every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    principal: Principal,
    correlation_id: CorrelationId,
    client: ClientInfo,
}

impl RequestContext {
    /// Establishes the context of an inbound request from validated token claims.
    pub fn establish(claims: &IdentityClaims, client: ClientInfo) -> AppResult<Self> {
        Ok(Self {
            principal: Principal::from_claims(claims)?,
            correlation_id: CorrelationId::new(),
            client,
        })
    }

    /// Creates the context of a background job.
    #[must_use]
    pub fn for_job(principal: Principal) -> Self {
        Self {
            principal,
            correlation_id: CorrelationId::new(),
            client: ClientInfo::default(),
        }
    }

    /// Creates a job context running as the tenant's service principal.
    #[must_use]
    pub fn for_service(tenant_id: TenantId) -> Self {
        Self::for_job(Principal::service(tenant_id))
    }

    /// Replaces the correlation id, e.g. to continue a queued unit of work.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Returns the principal.
    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Returns the tenant the context is confined to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.principal.tenant_id()
    }

    /// Returns the acting user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.principal.user_id()
    }

    /// Returns the correlation id shared by every audit record of this unit of work.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Returns client metadata.
    #[must_use]
    pub fn client(&self) -> &ClientInfo {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use bureau_core::{AppError, IdentityClaims, Role, TenantId, UserId};

    use super::{ClientInfo, RequestContext};

    #[test]
    fn establish_generates_fresh_correlation_ids() {
        let claims = IdentityClaims {
            tenant_id: Some(TenantId::new().to_string()),
            user_id: Some(UserId::new().to_string()),
            role: Some("employee".to_owned()),
            department_id: None,
        };

        let first = RequestContext::establish(&claims, ClientInfo::default());
        let second = RequestContext::establish(&claims, ClientInfo::default());

        match (first, second) {
            (Ok(first), Ok(second)) => {
                assert_ne!(first.correlation_id(), second.correlation_id());
                assert_eq!(first.principal().role(), Role::Employee);
            }
            _ => panic!("claims should establish a context"),
        }
    }

    #[test]
    fn establish_rejects_missing_tenant() {
        let claims = IdentityClaims {
            tenant_id: None,
            user_id: Some(UserId::new().to_string()),
            role: Some("admin".to_owned()),
            department_id: None,
        };

        let context = RequestContext::establish(&claims, ClientInfo::default());
        assert!(matches!(context, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn service_context_is_confined_to_its_tenant() {
        let tenant_id = TenantId::new();
        let context = RequestContext::for_service(tenant_id);

        assert!(context.principal().is_service());
        assert_eq!(context.tenant_id(), tenant_id);
    }
}
