use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crewdesk_core::{RoleId, TenantId, UserId};

use crate::permissions::Permission;

/// A role: a named bundle of permissions with a hierarchy level.
///
/// `hierarchy_level` is seniority, higher outranks lower. Role definitions are
/// tenant-scoped; an inactive role grants nothing regardless of assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub tenant_id: TenantId,
    pub name: String,
    pub hierarchy_level: u8,
    pub permissions: Vec<Permission>,
    pub active: bool,
}

impl Role {
    pub fn new(
        tenant_id: TenantId,
        name: impl Into<String>,
        hierarchy_level: u8,
        permissions: Vec<Permission>,
    ) -> Self {
        Self {
            id: RoleId::new(),
            tenant_id,
            name: name.into(),
            hierarchy_level,
            permissions,
            active: true,
        }
    }

    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn outranks(&self, other: &Role) -> bool {
        self.hierarchy_level > other.hierarchy_level
    }
}

/// A user's membership in a role.
///
/// Assignments carry their own lifecycle: they can be switched off
/// (`is_active`) or lapse (`expires_at`). Both gates apply; an expired
/// assignment contributes nothing even while `is_active` is still set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub granted_by: UserId,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl RoleAssignment {
    pub fn permanent(user_id: UserId, role_id: RoleId, granted_by: UserId, granted_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            role_id,
            granted_by,
            granted_at,
            expires_at: None,
            is_active: true,
        }
    }

    pub fn temporary(
        user_id: UserId,
        role_id: RoleId,
        granted_by: UserId,
        granted_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            role_id,
            granted_by,
            granted_at,
            expires_at: Some(expires_at),
            is_active: true,
        }
    }

    pub fn active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expires| expires > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn assignment_active_iff_flagged_and_unexpired() {
        let now = Utc::now();
        let user = UserId::new();
        let role = RoleId::new();
        let admin = UserId::new();

        let permanent = RoleAssignment::permanent(user, role, admin, now);
        assert!(permanent.active_at(now));

        let expiring = RoleAssignment::temporary(user, role, admin, now, now + Duration::hours(1));
        assert!(expiring.active_at(now));
        assert!(!expiring.active_at(now + Duration::hours(2)));

        let mut disabled = RoleAssignment::permanent(user, role, admin, now);
        disabled.is_active = false;
        assert!(!disabled.active_at(now));
    }

    #[test]
    fn assignment_expiring_exactly_now_is_inactive() {
        let now = Utc::now();
        let assignment =
            RoleAssignment::temporary(UserId::new(), RoleId::new(), UserId::new(), now, now);
        assert!(!assignment.active_at(now));
    }

    #[test]
    fn hierarchy_level_orders_roles() {
        let tenant = TenantId::new();
        let agent = Role::new(tenant, "agent", 10, vec![]);
        let manager = Role::new(tenant, "manager", 50, vec![]);
        assert!(manager.outranks(&agent));
        assert!(!agent.outranks(&manager));
    }
}
