use serde::{Deserialize, Serialize};

use crewdesk_core::{DepartmentId, GrantId, TenantId, UserId};

use crate::permissions::Permission;
use crate::roles::RoleAssignment;

/// A break-glass grant currently in force for a principal.
///
/// Only redeemed, unrevoked, unexpired grants belong here; the caller resolves
/// them from the grant store before evaluation. A wildcard entry covers every
/// permission name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveGrant {
    pub grant_id: GrantId,
    pub permissions: Vec<Permission>,
}

impl ActiveGrant {
    pub fn covers(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p.is_wildcard() || p.as_str() == permission)
    }
}

/// A fully resolved principal for authorization decisions.
///
/// Construction is intentionally decoupled from storage and transport: the API
/// layer assembles this from verified claims, the directory, and the grant
/// store, then evaluation is a pure function over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrincipal {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub department_id: Option<DepartmentId>,
    pub assignments: Vec<RoleAssignment>,
    pub active_grants: Vec<ActiveGrant>,
}

impl ResolvedPrincipal {
    pub fn new(user_id: UserId, tenant_id: TenantId, department_id: Option<DepartmentId>) -> Self {
        Self {
            user_id,
            tenant_id,
            department_id,
            assignments: Vec::new(),
            active_grants: Vec::new(),
        }
    }

    pub fn with_assignments(mut self, assignments: Vec<RoleAssignment>) -> Self {
        self.assignments = assignments;
        self
    }

    pub fn with_active_grants(mut self, grants: Vec<ActiveGrant>) -> Self {
        self.active_grants = grants;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_coverage_is_exact_or_wildcard() {
        let exact = ActiveGrant {
            grant_id: GrantId::new(),
            permissions: vec![Permission::borrowed("tickets.view_all")],
        };
        assert!(exact.covers("tickets.view_all"));
        assert!(!exact.covers("tickets.delete"));

        let all = ActiveGrant {
            grant_id: GrantId::new(),
            permissions: vec![Permission::borrowed("*")],
        };
        assert!(all.covers("anything.at_all"));
    }
}
