use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bureau_core::{AppError, DepartmentId, Principal, Role, TenantId, UserId};
use serde::{Deserialize, Serialize};

use crate::Permission;

/// How ownership of one resource type is interpreted by the access filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSemantics {
    /// Records belong to a department.
    Department,
    /// Records are owned by a creator and may be assigned to another user.
    Assigned,
    /// Records are private to their owner.
    Personal,
}

/// Tenant-scoped resource families guarded by the access filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Customer record.
    Customer,
    /// Shared department note.
    Note,
    /// Private note.
    PersonalNote,
    /// Appointment with a customer.
    Appointment,
    /// Task.
    Task,
    /// Time tracking entry.
    TimeEntry,
    /// Calendar event.
    Event,
}

impl ResourceType {
    /// Returns a stable storage value for this resource type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Note => "note",
            Self::PersonalNote => "personal_note",
            Self::Appointment => "appointment",
            Self::Task => "task",
            Self::TimeEntry => "time_entry",
            Self::Event => "event",
        }
    }

    /// Returns all resource types.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[ResourceType] = &[
            ResourceType::Customer,
            ResourceType::Note,
            ResourceType::PersonalNote,
            ResourceType::Appointment,
            ResourceType::Task,
            ResourceType::TimeEntry,
            ResourceType::Event,
        ];

        ALL
    }

    /// Returns the ownership semantics of this resource type.
    #[must_use]
    pub fn semantics(&self) -> ResourceSemantics {
        match self {
            Self::Customer | Self::Note => ResourceSemantics::Department,
            Self::Appointment | Self::Task => ResourceSemantics::Assigned,
            Self::PersonalNote | Self::TimeEntry | Self::Event => ResourceSemantics::Personal,
        }
    }

    /// Returns the permission required to read rows of this type.
    #[must_use]
    pub fn read_permission(&self) -> Permission {
        match self {
            Self::Customer => Permission::CustomerRead,
            Self::Note | Self::PersonalNote => Permission::NoteRead,
            Self::Appointment => Permission::AppointmentRead,
            // Time entries are booked against tasks.
            Self::Task | Self::TimeEntry => Permission::TaskRead,
            Self::Event => Permission::EventRead,
        }
    }
}

impl FromStr for ResourceType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|resource_type| resource_type.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown resource type '{value}'")))
    }
}

impl Display for ResourceType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Projection of a tenant-scoped row needed to decide visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOwnership {
    /// Tenant owning the row.
    pub tenant_id: TenantId,
    /// Creator or owner of the row.
    pub owner_id: UserId,
    /// User the row is assigned to.
    pub assignee_id: Option<UserId>,
    /// Department the row belongs to.
    pub department_id: Option<DepartmentId>,
}

impl RecordOwnership {
    /// Creates an ownership projection for an unassigned row without department.
    #[must_use]
    pub fn owned_by(tenant_id: TenantId, owner_id: UserId) -> Self {
        Self {
            tenant_id,
            owner_id,
            assignee_id: None,
            department_id: None,
        }
    }

    /// Sets the assignee.
    #[must_use]
    pub fn with_assignee(mut self, assignee_id: UserId) -> Self {
        self.assignee_id = Some(assignee_id);
        self
    }

    /// Sets the department.
    #[must_use]
    pub fn with_department(mut self, department_id: DepartmentId) -> Self {
        self.department_id = Some(department_id);
        self
    }
}

/// Rows implementing this trait can be filtered by an access scope.
pub trait OwnedRecord {
    /// Returns the ownership projection of the row.
    fn ownership(&self) -> RecordOwnership;
}

impl OwnedRecord for RecordOwnership {
    fn ownership(&self) -> RecordOwnership {
        self.clone()
    }
}

/// Row-level visibility computed per request. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessScope {
    /// Rows owned by the user.
    OwnOnly {
        /// Tenant boundary.
        tenant_id: TenantId,
        /// Owning user.
        user_id: UserId,
    },
    /// Rows owned by or assigned to the user.
    AssignedOrOwned {
        /// Tenant boundary.
        tenant_id: TenantId,
        /// Owning or assigned user.
        user_id: UserId,
    },
    /// Rows of one department.
    DepartmentScoped {
        /// Tenant boundary.
        tenant_id: TenantId,
        /// Department whose rows are visible.
        department_id: DepartmentId,
    },
    /// Every row of the tenant.
    TenantWide {
        /// Tenant boundary.
        tenant_id: TenantId,
    },
}

impl AccessScope {
    /// Resolves the scope of a principal for one resource type.
    ///
    /// Rules are evaluated in order and the first match wins: admins see the
    /// whole tenant, managers with a department see their department's
    /// department-semantics rows, assigned-semantics rows are visible to owner
    /// and assignee, and everything else is visible to its owner only.
    #[must_use]
    pub fn resolve(principal: &Principal, resource_type: ResourceType) -> Self {
        let tenant_id = principal.tenant_id();
        let user_id = principal.user_id();

        if principal.role() == Role::Admin {
            return Self::TenantWide { tenant_id };
        }

        if principal.role() == Role::Manager
            && resource_type.semantics() == ResourceSemantics::Department
            && let Some(department_id) = principal.department_id()
        {
            return Self::DepartmentScoped {
                tenant_id,
                department_id,
            };
        }

        if resource_type.semantics() == ResourceSemantics::Assigned {
            return Self::AssignedOrOwned { tenant_id, user_id };
        }

        Self::OwnOnly { tenant_id, user_id }
    }

    /// Returns the tenant this scope is confined to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        match self {
            Self::OwnOnly { tenant_id, .. }
            | Self::AssignedOrOwned { tenant_id, .. }
            | Self::DepartmentScoped { tenant_id, .. }
            | Self::TenantWide { tenant_id } => *tenant_id,
        }
    }

    /// Returns a stable label for logs and audit values.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OwnOnly { .. } => "own_only",
            Self::AssignedOrOwned { .. } => "assigned_or_owned",
            Self::DepartmentScoped { .. } => "department_scoped",
            Self::TenantWide { .. } => "tenant_wide",
        }
    }

    /// Returns whether a row with the given ownership is visible in this scope.
    #[must_use]
    pub fn permits(&self, ownership: &RecordOwnership) -> bool {
        self.predicate().matches(ownership)
    }

    /// Keeps only the rows visible in this scope.
    #[must_use]
    pub fn filter_visible<T: OwnedRecord>(&self, rows: Vec<T>) -> Vec<T> {
        rows.into_iter()
            .filter(|row| self.permits(&row.ownership()))
            .collect()
    }

    /// Returns the store-neutral predicate equivalent to this scope.
    #[must_use]
    pub fn predicate(&self) -> ScopePredicate {
        let tenant_id = self.tenant_id();
        let clause = match self {
            Self::OwnOnly { user_id, .. } => ScopeClause::OwnerIs(*user_id),
            Self::AssignedOrOwned { user_id, .. } => ScopeClause::OwnerOrAssigneeIs(*user_id),
            Self::DepartmentScoped { department_id, .. } => {
                ScopeClause::DepartmentIs(*department_id)
            }
            Self::TenantWide { .. } => ScopeClause::Any,
        };

        ScopePredicate { tenant_id, clause }
    }
}

/// Row restriction beyond the mandatory tenant equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeClause {
    /// No further restriction.
    Any,
    /// Owner column equals the user.
    OwnerIs(UserId),
    /// Owner or assignee column equals the user.
    OwnerOrAssigneeIs(UserId),
    /// Department column equals the department.
    DepartmentIs(DepartmentId),
}

/// Store-neutral query predicate derived from an access scope.
///
/// Query layers always render `tenant_id = ?` and then the clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopePredicate {
    tenant_id: TenantId,
    clause: ScopeClause,
}

impl ScopePredicate {
    /// Returns the tenant every matching row must belong to.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the additional row restriction.
    #[must_use]
    pub fn clause(&self) -> ScopeClause {
        self.clause
    }

    /// Evaluates the predicate against one row in memory.
    #[must_use]
    pub fn matches(&self, ownership: &RecordOwnership) -> bool {
        if ownership.tenant_id != self.tenant_id {
            return false;
        }

        match self.clause {
            ScopeClause::Any => true,
            ScopeClause::OwnerIs(user_id) => ownership.owner_id == user_id,
            ScopeClause::OwnerOrAssigneeIs(user_id) => {
                ownership.owner_id == user_id || ownership.assignee_id == Some(user_id)
            }
            ScopeClause::DepartmentIs(department_id) => {
                ownership.department_id == Some(department_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bureau_core::{DepartmentId, Principal, Role, TenantId, UserId};
    use proptest::prelude::*;

    use super::{AccessScope, RecordOwnership, ResourceType, ScopeClause};

    fn principal(role: Role, department_id: Option<DepartmentId>) -> Principal {
        Principal::new(TenantId::new(), UserId::new(), role, department_id)
    }

    #[test]
    fn admin_sees_whole_tenant() {
        let admin = principal(Role::Admin, None);
        let scope = AccessScope::resolve(&admin, ResourceType::PersonalNote);
        assert_eq!(
            scope,
            AccessScope::TenantWide {
                tenant_id: admin.tenant_id()
            }
        );
    }

    #[test]
    fn manager_with_department_gets_department_scope_for_customers() {
        let department_id = DepartmentId::new();
        let manager = principal(Role::Manager, Some(department_id));

        let scope = AccessScope::resolve(&manager, ResourceType::Customer);
        assert!(matches!(
            scope,
            AccessScope::DepartmentScoped { department_id: value, .. } if value == department_id
        ));
    }

    #[test]
    fn manager_without_department_falls_through_to_own_only() {
        let manager = principal(Role::Manager, None);
        let scope = AccessScope::resolve(&manager, ResourceType::Note);
        assert!(matches!(scope, AccessScope::OwnOnly { .. }));
    }

    #[test]
    fn manager_department_rule_does_not_apply_to_tasks() {
        let manager = principal(Role::Manager, Some(DepartmentId::new()));
        let scope = AccessScope::resolve(&manager, ResourceType::Task);
        assert!(matches!(scope, AccessScope::AssignedOrOwned { .. }));
    }

    #[test]
    fn employee_cannot_see_task_assigned_to_someone_else() {
        let employee = principal(Role::Employee, None);
        let scope = AccessScope::resolve(&employee, ResourceType::Task);
        let foreign = RecordOwnership::owned_by(employee.tenant_id(), UserId::new())
            .with_assignee(UserId::new());
        let assigned = RecordOwnership::owned_by(employee.tenant_id(), UserId::new())
            .with_assignee(employee.user_id());

        assert!(!scope.permits(&foreign));
        assert!(scope.permits(&assigned));
    }

    #[test]
    fn filter_visible_keeps_only_permitted_rows() {
        let employee = principal(Role::Employee, None);
        let scope = AccessScope::resolve(&employee, ResourceType::Event);
        let rows = vec![
            RecordOwnership::owned_by(employee.tenant_id(), employee.user_id()),
            RecordOwnership::owned_by(employee.tenant_id(), UserId::new()),
            RecordOwnership::owned_by(TenantId::new(), employee.user_id()),
        ];

        let visible = scope.filter_visible(rows);
        assert_eq!(visible.len(), 1);
    }

    #[test]
    fn predicate_mirrors_scope() {
        let employee = principal(Role::Employee, None);
        let predicate = AccessScope::resolve(&employee, ResourceType::Appointment).predicate();

        assert_eq!(predicate.tenant_id(), employee.tenant_id());
        assert_eq!(
            predicate.clause(),
            ScopeClause::OwnerOrAssigneeIs(employee.user_id())
        );
    }

    fn any_role() -> impl Strategy<Value = Role> {
        prop::sample::select(Role::all().to_vec())
    }

    fn any_resource_type() -> impl Strategy<Value = ResourceType> {
        prop::sample::select(ResourceType::all().to_vec())
    }

    proptest! {
        #[test]
        fn foreign_tenant_rows_are_never_visible(
            role in any_role(),
            resource_type in any_resource_type(),
            with_department in any::<bool>(),
        ) {
            let department_id = DepartmentId::new();
            let caller = principal(role, with_department.then_some(department_id));
            let scope = AccessScope::resolve(&caller, resource_type);
            let foreign = RecordOwnership::owned_by(TenantId::new(), caller.user_id())
                .with_assignee(caller.user_id())
                .with_department(department_id);

            prop_assert!(!scope.permits(&foreign));
        }

        #[test]
        fn predicate_agrees_with_permits(
            role in any_role(),
            resource_type in any_resource_type(),
            owned in any::<bool>(),
            assigned in any::<bool>(),
            same_department in any::<bool>(),
        ) {
            let department_id = DepartmentId::new();
            let caller = principal(role, Some(department_id));
            let scope = AccessScope::resolve(&caller, resource_type);
            let owner_id = if owned { caller.user_id() } else { UserId::new() };
            let mut row = RecordOwnership::owned_by(caller.tenant_id(), owner_id)
                .with_department(if same_department { department_id } else { DepartmentId::new() });
            if assigned {
                row = row.with_assignee(caller.user_id());
            }

            prop_assert_eq!(scope.predicate().matches(&row), scope.permits(&row));
        }
    }
}
