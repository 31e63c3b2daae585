//! Snapshot of a tenant's roles, permission catalog and departments.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crewdesk_core::{DepartmentId, RoleId};

use crate::department::Department;
use crate::permissions::PermissionDef;
use crate::principal::ResolvedPrincipal;
use crate::roles::Role;

/// The permission names a principal effectively holds through roles.
///
/// A wildcard in the set makes `allows` true for every name; callers never
/// need to special-case it.
#[derive(Debug)]
pub struct EffectivePermissions<'g> {
    names: HashSet<&'g str>,
}

impl<'g> EffectivePermissions<'g> {
    pub fn allows(&self, permission: &str) -> bool {
        self.names.contains("*") || self.names.contains(permission)
    }

    pub fn names(&self) -> impl Iterator<Item = &'g str> + '_ {
        self.names.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Immutable view of a tenant's role/permission/department structure.
///
/// Loaded once per request from the directory; evaluation never goes back to
/// storage. Concurrent readers share the snapshot freely.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<String, PermissionDef>,
    departments: HashMap<DepartmentId, Department>,
}

impl RoleGraph {
    pub fn new(
        roles: impl IntoIterator<Item = Role>,
        permissions: impl IntoIterator<Item = PermissionDef>,
        departments: impl IntoIterator<Item = Department>,
    ) -> Self {
        Self {
            roles: roles.into_iter().map(|r| (r.id, r)).collect(),
            permissions: permissions
                .into_iter()
                .map(|p| (p.name.as_str().to_string(), p))
                .collect(),
            departments: departments.into_iter().map(|d| (d.id, d)).collect(),
        }
    }

    pub fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles.get(&id)
    }

    pub fn permission_def(&self, name: &str) -> Option<&PermissionDef> {
        self.permissions.get(name)
    }

    pub fn department(&self, id: DepartmentId) -> Option<&Department> {
        self.departments.get(&id)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// Union of permission names granted by the principal's active
    /// assignments.
    ///
    /// Contributions are filtered at three levels: the assignment must be
    /// active at `now`, the role must be active, and the permission must have
    /// an active catalog definition. The wildcard has no definition and passes
    /// as-is.
    pub fn effective_permissions(
        &self,
        principal: &ResolvedPrincipal,
        now: DateTime<Utc>,
    ) -> EffectivePermissions<'_> {
        let mut names = HashSet::new();

        for assignment in &principal.assignments {
            if !assignment.active_at(now) {
                continue;
            }
            let Some(role) = self.roles.get(&assignment.role_id) else {
                continue;
            };
            if !role.active {
                continue;
            }
            for permission in &role.permissions {
                if permission.is_wildcard() {
                    names.insert("*");
                    continue;
                }
                if let Some(def) = self.permissions.get(permission.as_str()) {
                    if def.active {
                        names.insert(def.name.as_str());
                    }
                }
            }
        }

        EffectivePermissions { names }
    }

    /// The principal's top hierarchy level across active roles, if any.
    pub fn highest_hierarchy_level(
        &self,
        principal: &ResolvedPrincipal,
        now: DateTime<Utc>,
    ) -> Option<u8> {
        principal
            .assignments
            .iter()
            .filter(|a| a.active_at(now))
            .filter_map(|a| self.roles.get(&a.role_id))
            .filter(|r| r.active)
            .map(|r| r.hierarchy_level)
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Permission;
    use crate::roles::RoleAssignment;
    use chrono::Utc;
    use crewdesk_core::{TenantId, UserId};

    #[test]
    fn assignments_to_unknown_roles_contribute_nothing() {
        let tenant = TenantId::new();
        let graph = RoleGraph::new(
            vec![],
            vec![PermissionDef::global("tickets.view_all")],
            vec![],
        );
        let user = UserId::new();
        let principal = ResolvedPrincipal::new(user, tenant, None).with_assignments(vec![
            RoleAssignment::permanent(user, crewdesk_core::RoleId::new(), UserId::new(), Utc::now()),
        ]);

        let effective = graph.effective_permissions(&principal, Utc::now());
        assert!(effective.is_empty());
        assert!(!effective.allows("tickets.view_all"));
    }

    #[test]
    fn highest_level_counts_only_active_roles() {
        let tenant = TenantId::new();
        let now = Utc::now();
        let agent = Role::new(tenant, "agent", 10, vec![Permission::borrowed("*")]);
        let dormant_admin = Role::new(tenant, "old_admin", 90, vec![]).deactivated();
        let graph = RoleGraph::new(vec![agent.clone(), dormant_admin.clone()], vec![], vec![]);

        let user = UserId::new();
        let principal = ResolvedPrincipal::new(user, tenant, None).with_assignments(vec![
            RoleAssignment::permanent(user, agent.id, UserId::new(), now),
            RoleAssignment::permanent(user, dormant_admin.id, UserId::new(), now),
        ]);

        assert_eq!(graph.highest_hierarchy_level(&principal, now), Some(10));

        let unassigned = ResolvedPrincipal::new(UserId::new(), tenant, None);
        assert_eq!(graph.highest_hierarchy_level(&unassigned, now), None);
    }
}
