//! Directory port: who exists, which roles they hold, how the tenant is
//! structured.
//!
//! Reads only. Administration of users/roles/departments happens in an
//! external collaborator; this core consumes the resulting state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crewdesk_core::{DepartmentId, DomainError, DomainResult, RoleId, TenantId, UserId};

use crate::department::Department;
use crate::graph::RoleGraph;
use crate::permissions::PermissionDef;
use crate::roles::{Role, RoleAssignment};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("directory data inconsistent: {0}")]
    Inconsistent(String),
}

/// A user's directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub department_id: Option<DepartmentId>,
    pub display_name: String,
}

/// Read-side directory access, tenant-scoped throughout.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Snapshot of the tenant's roles, permission catalog, and departments.
    async fn role_graph(&self, tenant_id: TenantId) -> Result<RoleGraph, DirectoryError>;

    /// Directory entry for a user, if known.
    async fn user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Option<UserEntry>, DirectoryError>;

    /// All of a user's role assignments; evaluation filters for activity.
    async fn assignments(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<RoleAssignment>, DirectoryError>;
}

#[async_trait]
impl<S> DirectoryStore for Arc<S>
where
    S: DirectoryStore + ?Sized,
{
    async fn role_graph(&self, tenant_id: TenantId) -> Result<RoleGraph, DirectoryError> {
        (**self).role_graph(tenant_id).await
    }

    async fn user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Option<UserEntry>, DirectoryError> {
        (**self).user(tenant_id, user_id).await
    }

    async fn assignments(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<RoleAssignment>, DirectoryError> {
        (**self).assignments(tenant_id, user_id).await
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<(TenantId, UserId), UserEntry>,
    roles: HashMap<TenantId, HashMap<RoleId, Role>>,
    permissions: HashMap<TenantId, Vec<PermissionDef>>,
    departments: HashMap<TenantId, HashMap<DepartmentId, Department>>,
    assignments: HashMap<(TenantId, UserId), Vec<RoleAssignment>>,
}

/// In-memory directory for tests/dev.
///
/// The mutators validate the same invariants the persistent schema enforces
/// (department tree consistency in particular) so dev wiring cannot drift
/// from production shape.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_user(&self, entry: UserEntry) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.users.insert((entry.tenant_id, entry.user_id), entry);
    }

    pub fn upsert_role(&self, role: Role) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state
            .roles
            .entry(role.tenant_id)
            .or_default()
            .insert(role.id, role);
    }

    pub fn upsert_permission(&self, tenant_id: TenantId, def: PermissionDef) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let defs = state.permissions.entry(tenant_id).or_default();
        defs.retain(|d| d.name != def.name);
        defs.push(def);
    }

    /// Insert or replace a department, validating tree shape.
    pub fn upsert_department(&self, department: Department) -> DomainResult<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let tree = state.departments.entry(department.tenant_id).or_default();

        match department.parent_id {
            None => {
                if department.path != format!("/{}", department.id) {
                    return Err(DomainError::invariant("root department path mismatch"));
                }
            }
            Some(parent_id) => {
                let Some(parent) = tree.get(&parent_id) else {
                    return Err(DomainError::validation("parent department does not exist"));
                };
                // Re-parenting under one's own subtree would orphan the chain.
                if let Some(existing) = tree.get(&department.id) {
                    if parent.is_within(existing) {
                        return Err(DomainError::invariant("department cycle"));
                    }
                }
                if department.path != format!("{}/{}", parent.path, department.id) {
                    return Err(DomainError::invariant("department path mismatch"));
                }
            }
        }

        tree.insert(department.id, department);
        Ok(())
    }

    pub fn assign_role(&self, tenant_id: TenantId, assignment: RoleAssignment) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state
            .assignments
            .entry((tenant_id, assignment.user_id))
            .or_default()
            .push(assignment);
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectory {
    async fn role_graph(&self, tenant_id: TenantId) -> Result<RoleGraph, DirectoryError> {
        let state = self
            .state
            .read()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;

        Ok(RoleGraph::new(
            state
                .roles
                .get(&tenant_id)
                .map(|r| r.values().cloned().collect::<Vec<_>>())
                .unwrap_or_default(),
            state.permissions.get(&tenant_id).cloned().unwrap_or_default(),
            state
                .departments
                .get(&tenant_id)
                .map(|d| d.values().cloned().collect::<Vec<_>>())
                .unwrap_or_default(),
        ))
    }

    async fn user(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Option<UserEntry>, DirectoryError> {
        let state = self
            .state
            .read()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;
        Ok(state.users.get(&(tenant_id, user_id)).cloned())
    }

    async fn assignments(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<RoleAssignment>, DirectoryError> {
        let state = self
            .state
            .read()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))?;
        Ok(state
            .assignments
            .get(&(tenant_id, user_id))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::permissions::Permission;

    #[tokio::test]
    async fn graph_reflects_only_requested_tenant() {
        let directory = InMemoryDirectory::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        directory.upsert_role(Role::new(tenant_a, "agent", 10, vec![Permission::borrowed("tickets.view_all")]));
        directory.upsert_role(Role::new(tenant_b, "agent", 10, vec![Permission::borrowed("tickets.view_all")]));
        directory.upsert_permission(tenant_a, PermissionDef::global("tickets.view_all"));

        let graph = directory.role_graph(tenant_a).await.unwrap();
        assert_eq!(graph.roles().count(), 1);
        assert!(graph.permission_def("tickets.view_all").is_some());

        let graph_b = directory.role_graph(tenant_b).await.unwrap();
        assert!(graph_b.permission_def("tickets.view_all").is_none());
    }

    #[tokio::test]
    async fn department_tree_rejects_cycles_and_orphans() {
        let directory = InMemoryDirectory::new();
        let tenant = TenantId::new();

        let support = Department::root(tenant, "Support");
        directory.upsert_department(support.clone()).unwrap();

        let eu = Department::child_of(&support, "Support EU");
        directory.upsert_department(eu.clone()).unwrap();

        // Re-parenting the root under its own child must fail.
        let mut cyclic = support.clone();
        cyclic.parent_id = Some(eu.id);
        cyclic.path = format!("{}/{}", eu.path, support.id);
        assert!(directory.upsert_department(cyclic).is_err());

        // A child of an unknown parent must fail.
        let ghost_parent = Department::root(tenant, "Ghost");
        let orphan = Department::child_of(&ghost_parent, "Orphan");
        assert!(directory.upsert_department(orphan).is_err());
    }

    #[tokio::test]
    async fn assignments_are_keyed_by_tenant_and_user() {
        let directory = InMemoryDirectory::new();
        let tenant = TenantId::new();
        let user = UserId::new();
        let role = Role::new(tenant, "agent", 10, vec![]);
        directory.upsert_role(role.clone());
        directory.assign_role(
            tenant,
            RoleAssignment::permanent(user, role.id, UserId::new(), Utc::now()),
        );

        assert_eq!(directory.assignments(tenant, user).await.unwrap().len(), 1);
        assert!(directory
            .assignments(TenantId::new(), user)
            .await
            .unwrap()
            .is_empty());
    }
}
