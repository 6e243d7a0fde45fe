use bureau_core::{PermissionGrantId, TenantId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Permission;

/// Additional permission granted to one user, optionally time-boxed.
///
/// Grants are unique per tenant, user and permission. Expired grants stay
/// stored for history but never contribute to effective permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    id: PermissionGrantId,
    tenant_id: TenantId,
    user_id: UserId,
    permission: Permission,
    granted_by: UserId,
    granted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl PermissionGrant {
    /// Creates a new grant.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        user_id: UserId,
        permission: Permission,
        granted_by: UserId,
        granted_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: PermissionGrantId::new(),
            tenant_id,
            user_id,
            permission,
            granted_by,
            granted_at,
            expires_at,
        }
    }

    /// Rebuilds a stored grant.
    #[must_use]
    pub fn from_stored(
        id: PermissionGrantId,
        tenant_id: TenantId,
        user_id: UserId,
        permission: Permission,
        granted_by: UserId,
        granted_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            user_id,
            permission,
            granted_by,
            granted_at,
            expires_at,
        }
    }

    /// Returns the grant id.
    #[must_use]
    pub fn id(&self) -> PermissionGrantId {
        self.id
    }

    /// Returns the tenant.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the grantee.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the granted permission.
    #[must_use]
    pub fn permission(&self) -> Permission {
        self.permission
    }

    /// Returns the granting user.
    #[must_use]
    pub fn granted_by(&self) -> UserId {
        self.granted_by
    }

    /// Returns when the grant was last written.
    #[must_use]
    pub fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }

    /// Returns the optional expiry.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns whether the grant contributes permissions at `now`.
    ///
    /// A grant whose expiry equals `now` is already inert.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }

    /// Replaces the mutable fields when the same permission is granted again.
    pub fn regrant(
        &mut self,
        granted_by: UserId,
        granted_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.granted_by = granted_by;
        self.granted_at = granted_at;
        self.expires_at = expires_at;
    }

    /// Logically revokes the grant by expiring it at `now`.
    pub fn revoke(&mut self, now: DateTime<Utc>) {
        if self.is_active_at(now) {
            self.expires_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use bureau_core::{TenantId, UserId};
    use chrono::{Duration, Utc};

    use super::PermissionGrant;
    use crate::Permission;

    fn grant(expires_in: Option<Duration>) -> PermissionGrant {
        let now = Utc::now();
        PermissionGrant::new(
            TenantId::new(),
            UserId::new(),
            Permission::TaskAssign,
            UserId::new(),
            now,
            expires_in.map(|duration| now + duration),
        )
    }

    #[test]
    fn grant_without_expiry_is_active() {
        assert!(grant(None).is_active_at(Utc::now()));
    }

    #[test]
    fn grant_expired_one_second_ago_is_inert() {
        let grant = grant(Some(Duration::seconds(-1)));
        assert!(!grant.is_active_at(Utc::now()));
    }

    #[test]
    fn grant_expiring_exactly_now_is_inert() {
        let now = Utc::now();
        let grant = PermissionGrant::new(
            TenantId::new(),
            UserId::new(),
            Permission::NoteQa,
            UserId::new(),
            now - Duration::hours(1),
            Some(now),
        );
        assert!(!grant.is_active_at(now));
    }

    #[test]
    fn revoke_sets_expiry_to_now() {
        let mut grant = grant(Some(Duration::days(3)));
        let now = Utc::now();
        grant.revoke(now);

        assert_eq!(grant.expires_at(), Some(now));
        assert!(!grant.is_active_at(now));
    }

    #[test]
    fn regrant_replaces_granter_and_expiry() {
        let mut grant = grant(Some(Duration::seconds(-10)));
        let admin = UserId::new();
        let now = Utc::now();
        grant.regrant(admin, now, None);

        assert_eq!(grant.granted_by(), admin);
        assert!(grant.is_active_at(now));
    }
}
