use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bureau_core::{AppError, Role};
use serde::{Deserialize, Serialize};

/// Permissions enforced by application policy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Permission {
    /// Allows creating users.
    UserCreate,
    /// Allows reading user profiles.
    UserRead,
    /// Allows updating users.
    UserUpdate,
    /// Allows deleting users.
    UserDelete,
    /// Allows creating tasks.
    TaskCreate,
    /// Allows reading tasks.
    TaskRead,
    /// Allows updating tasks.
    TaskUpdate,
    /// Allows deleting tasks.
    TaskDelete,
    /// Allows assigning tasks to other users.
    TaskAssign,
    /// Allows creating calendar events.
    EventCreate,
    /// Allows reading calendar events.
    EventRead,
    /// Allows updating calendar events.
    EventUpdate,
    /// Allows deleting calendar events.
    EventDelete,
    /// Allows creating notes.
    NoteCreate,
    /// Allows reading notes.
    NoteRead,
    /// Allows updating notes.
    NoteUpdate,
    /// Allows deleting notes.
    NoteDelete,
    /// Allows requesting AI note summaries.
    NoteSummarize,
    /// Allows AI question answering over notes.
    NoteQa,
    /// Allows creating customers.
    CustomerCreate,
    /// Allows reading customers.
    CustomerRead,
    /// Allows updating customers.
    CustomerUpdate,
    /// Allows deleting customers.
    CustomerDelete,
    /// Allows creating appointments.
    AppointmentCreate,
    /// Allows reading appointments.
    AppointmentRead,
    /// Allows updating appointments.
    AppointmentUpdate,
    /// Allows deleting appointments.
    AppointmentDelete,
    /// Allows creating and toggling workflow templates and automation rules.
    WorkflowManage,
    /// Allows firing manual workflow triggers.
    WorkflowExecute,
    /// Allows reading and verifying the audit trail.
    AdminAudit,
    /// Allows changing tenant settings.
    AdminSettings,
    /// Allows administering users and their grants.
    AdminUsers,
}

impl Permission {
    /// Returns a stable storage value for this permission.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreate => "user:create",
            Self::UserRead => "user:read",
            Self::UserUpdate => "user:update",
            Self::UserDelete => "user:delete",
            Self::TaskCreate => "task:create",
            Self::TaskRead => "task:read",
            Self::TaskUpdate => "task:update",
            Self::TaskDelete => "task:delete",
            Self::TaskAssign => "task:assign",
            Self::EventCreate => "event:create",
            Self::EventRead => "event:read",
            Self::EventUpdate => "event:update",
            Self::EventDelete => "event:delete",
            Self::NoteCreate => "note:create",
            Self::NoteRead => "note:read",
            Self::NoteUpdate => "note:update",
            Self::NoteDelete => "note:delete",
            Self::NoteSummarize => "note:summarize",
            Self::NoteQa => "note:qa",
            Self::CustomerCreate => "customer:create",
            Self::CustomerRead => "customer:read",
            Self::CustomerUpdate => "customer:update",
            Self::CustomerDelete => "customer:delete",
            Self::AppointmentCreate => "appointment:create",
            Self::AppointmentRead => "appointment:read",
            Self::AppointmentUpdate => "appointment:update",
            Self::AppointmentDelete => "appointment:delete",
            Self::WorkflowManage => "workflow:manage",
            Self::WorkflowExecute => "workflow:execute",
            Self::AdminAudit => "admin:audit",
            Self::AdminSettings => "admin:settings",
            Self::AdminUsers => "admin:users",
        }
    }

    /// Returns all known permissions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Permission] = &[
            Permission::UserCreate,
            Permission::UserRead,
            Permission::UserUpdate,
            Permission::UserDelete,
            Permission::TaskCreate,
            Permission::TaskRead,
            Permission::TaskUpdate,
            Permission::TaskDelete,
            Permission::TaskAssign,
            Permission::EventCreate,
            Permission::EventRead,
            Permission::EventUpdate,
            Permission::EventDelete,
            Permission::NoteCreate,
            Permission::NoteRead,
            Permission::NoteUpdate,
            Permission::NoteDelete,
            Permission::NoteSummarize,
            Permission::NoteQa,
            Permission::CustomerCreate,
            Permission::CustomerRead,
            Permission::CustomerUpdate,
            Permission::CustomerDelete,
            Permission::AppointmentCreate,
            Permission::AppointmentRead,
            Permission::AppointmentUpdate,
            Permission::AppointmentDelete,
            Permission::WorkflowManage,
            Permission::WorkflowExecute,
            Permission::AdminAudit,
            Permission::AdminSettings,
            Permission::AdminUsers,
        ];

        ALL
    }

    /// Returns the resource family prefix, e.g. `task` for `task:assign`.
    #[must_use]
    pub fn family(&self) -> &'static str {
        self.as_str()
            .split_once(':')
            .map_or(self.as_str(), |(family, _)| family)
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|permission| permission.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown permission value '{value}'")))
    }
}

impl TryFrom<String> for Permission {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.as_str().to_owned()
    }
}

impl Display for Permission {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

const EMPLOYEE_DEFAULTS: &[Permission] = &[
    Permission::TaskCreate,
    Permission::TaskRead,
    Permission::TaskUpdate,
    Permission::EventRead,
    Permission::NoteCreate,
    Permission::NoteRead,
    Permission::NoteUpdate,
    Permission::NoteSummarize,
    Permission::NoteQa,
    Permission::CustomerRead,
    Permission::AppointmentRead,
];

const MANAGER_DEFAULTS: &[Permission] = &[
    Permission::UserRead,
    Permission::TaskCreate,
    Permission::TaskRead,
    Permission::TaskUpdate,
    Permission::TaskAssign,
    Permission::EventCreate,
    Permission::EventRead,
    Permission::EventUpdate,
    Permission::NoteCreate,
    Permission::NoteRead,
    Permission::NoteUpdate,
    Permission::NoteSummarize,
    Permission::NoteQa,
    Permission::CustomerCreate,
    Permission::CustomerRead,
    Permission::CustomerUpdate,
    Permission::AppointmentCreate,
    Permission::AppointmentRead,
    Permission::AppointmentUpdate,
    Permission::WorkflowExecute,
];

const CUSTOMER_DEFAULTS: &[Permission] = &[Permission::AppointmentRead, Permission::TaskRead];

/// Static role to permission mapping loaded at process start.
pub struct RolePermissionDefaults;

impl RolePermissionDefaults {
    /// Returns the default permissions of one role.
    #[must_use]
    pub fn for_role(role: Role) -> &'static [Permission] {
        match role {
            Role::Admin => Permission::all(),
            Role::Manager => MANAGER_DEFAULTS,
            Role::Employee => EMPLOYEE_DEFAULTS,
            Role::Customer => CUSTOMER_DEFAULTS,
        }
    }

    /// Returns the default permissions of one role as an ordered set.
    #[must_use]
    pub fn permission_set(role: Role) -> BTreeSet<Permission> {
        Self::for_role(role).iter().copied().collect()
    }

    /// Returns whether the role grants the permission by default.
    #[must_use]
    pub fn role_has(role: Role, permission: Permission) -> bool {
        Self::for_role(role).contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bureau_core::Role;
    use proptest::prelude::*;

    use super::{Permission, RolePermissionDefaults};

    #[test]
    fn permission_roundtrip_storage_value() {
        let permission = Permission::TaskAssign;
        let restored = Permission::from_str(permission.as_str());
        assert!(restored.is_ok());
        assert_eq!(restored.unwrap_or(Permission::TaskRead), permission);
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let parsed = Permission::from_str("task:teleport");
        assert!(parsed.is_err());
    }

    #[test]
    fn permission_serializes_as_colon_string() {
        let encoded = serde_json::to_string(&Permission::TaskAssign);
        assert!(matches!(encoded.as_deref(), Ok("\"task:assign\"")));
    }

    #[test]
    fn family_is_prefix_before_colon() {
        assert_eq!(Permission::NoteSummarize.family(), "note");
        assert_eq!(Permission::AdminAudit.family(), "admin");
    }

    #[test]
    fn customer_defaults_are_read_only() {
        let defaults = RolePermissionDefaults::permission_set(Role::Customer);
        assert!(defaults.iter().all(|permission| permission.as_str().ends_with(":read")));
    }

    fn any_permission() -> impl Strategy<Value = Permission> {
        prop::sample::select(Permission::all().to_vec())
    }

    proptest! {
        #[test]
        fn role_defaults_are_ordered_admin_manager_employee(permission in any_permission()) {
            let employee = RolePermissionDefaults::role_has(Role::Employee, permission);
            let manager = RolePermissionDefaults::role_has(Role::Manager, permission);
            let admin = RolePermissionDefaults::role_has(Role::Admin, permission);

            prop_assert!(!employee || manager);
            prop_assert!(!manager || admin);
        }

        #[test]
        fn every_permission_parses_from_its_storage_value(permission in any_permission()) {
            prop_assert_eq!(Permission::from_str(permission.as_str()).ok(), Some(permission));
        }
    }
}
