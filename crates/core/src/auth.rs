use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult, DepartmentId, TenantId, UserId};

/// Tenant role carried by every principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full tenant administration.
    Admin,
    /// Team management inside one department.
    Manager,
    /// Regular staff member.
    Employee,
    /// External customer using the portal.
    Customer,
}

impl Role {
    /// Returns a stable storage value for this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
            Self::Customer => "customer",
        }
    }

    /// Returns all known roles.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Role] = &[Role::Admin, Role::Manager, Role::Employee, Role::Customer];

        ALL
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "employee" => Ok(Self::Employee),
            "customer" => Ok(Self::Customer),
            _ => Err(AppError::Validation(format!("unknown role value '{value}'"))),
        }
    }
}

impl Display for Role {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Claims extracted from an already validated identity token.
///
/// Every field is optional at this layer so that a malformed token surfaces
/// as an authentication context error instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityClaims {
    /// Tenant claim.
    pub tenant_id: Option<String>,
    /// Subject user claim.
    pub user_id: Option<String>,
    /// Role claim.
    pub role: Option<String>,
    /// Optional department claim.
    pub department_id: Option<String>,
}

/// Authenticated identity an operation runs under.
///
/// A principal is derived once per request or job and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    tenant_id: TenantId,
    user_id: UserId,
    role: Role,
    department_id: Option<DepartmentId>,
}

impl Principal {
    /// Creates a principal from already typed values.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        user_id: UserId,
        role: Role,
        department_id: Option<DepartmentId>,
    ) -> Self {
        Self {
            tenant_id,
            user_id,
            role,
            department_id,
        }
    }

    /// Creates the automation service principal confined to one tenant.
    #[must_use]
    pub fn service(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            user_id: UserId::service(),
            role: Role::Admin,
            department_id: None,
        }
    }

    /// Derives a principal from identity token claims.
    pub fn from_claims(claims: &IdentityClaims) -> AppResult<Self> {
        let tenant_id = required_claim(claims.tenant_id.as_deref(), "tenant_id")?;
        let user_id = required_claim(claims.user_id.as_deref(), "user_id")?;
        let role = required_claim(claims.role.as_deref(), "role")?;

        let tenant_id = TenantId::parse(tenant_id)
            .map_err(|_| AppError::Unauthorized("claim 'tenant_id' is not a valid id".to_owned()))?;
        let user_id = UserId::parse(user_id)
            .map_err(|_| AppError::Unauthorized("claim 'user_id' is not a valid id".to_owned()))?;
        if user_id.is_service() {
            return Err(AppError::Unauthorized(
                "claim 'user_id' uses a reserved identifier".to_owned(),
            ));
        }

        let role = Role::from_str(role.trim())
            .map_err(|_| AppError::Unauthorized(format!("claim 'role' has unknown value '{role}'")))?;

        let department_id = claims
            .department_id
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                DepartmentId::parse(value).map_err(|_| {
                    AppError::Unauthorized("claim 'department_id' is not a valid id".to_owned())
                })
            })
            .transpose()?;

        Ok(Self {
            tenant_id,
            user_id,
            role,
            department_id,
        })
    }

    /// Returns the tenant the principal is confined to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the acting user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the principal role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the department, when the principal belongs to one.
    #[must_use]
    pub fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    /// Returns whether this is a tenant-scoped service principal.
    #[must_use]
    pub fn is_service(&self) -> bool {
        self.user_id.is_service()
    }

    /// Returns a stable subject label for logs.
    #[must_use]
    pub fn subject(&self) -> String {
        if self.is_service() {
            format!("service@{}", self.tenant_id)
        } else {
            self.user_id.to_string()
        }
    }
}

fn required_claim<'a>(value: Option<&'a str>, name: &str) -> AppResult<&'a str> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Unauthorized(format!("identity claim '{name}' is missing")))
}
