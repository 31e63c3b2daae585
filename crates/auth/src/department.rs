use serde::{Deserialize, Serialize};

use crewdesk_core::{DepartmentId, TenantId};

/// An organisational unit.
///
/// Departments form a tree per tenant. `path` is the materialized ancestor
/// chain (slash-joined ids, root first, self last) and is maintained by the
/// directory on write, so ancestry checks are string prefix tests instead of
/// recursive lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub tenant_id: TenantId,
    pub name: String,
    pub parent_id: Option<DepartmentId>,
    pub path: String,
}

impl Department {
    pub fn root(tenant_id: TenantId, name: impl Into<String>) -> Self {
        let id = DepartmentId::new();
        Self {
            id,
            tenant_id,
            name: name.into(),
            parent_id: None,
            path: format!("/{id}"),
        }
    }

    pub fn child_of(parent: &Department, name: impl Into<String>) -> Self {
        let id = DepartmentId::new();
        Self {
            id,
            tenant_id: parent.tenant_id,
            name: name.into(),
            parent_id: Some(parent.id),
            path: format!("{}/{id}", parent.path),
        }
    }

    /// True when `self` sits under `other` (or is `other`).
    pub fn is_within(&self, other: &Department) -> bool {
        self.path == other.path || self.path.starts_with(&format!("{}/", other.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_encodes_ancestry() {
        let tenant = TenantId::new();
        let support = Department::root(tenant, "Support");
        let eu = Department::child_of(&support, "Support EU");
        let billing = Department::root(tenant, "Billing");

        assert!(eu.is_within(&support));
        assert!(support.is_within(&support));
        assert!(!support.is_within(&eu));
        assert!(!eu.is_within(&billing));
    }
}
