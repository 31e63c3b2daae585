use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "tickets.view_all").
/// A special wildcard permission `"*"` can be granted by policy layers (admin
/// roles, break-glass grants) to indicate "allow all" without hardcoding the
/// full catalog into tokens or grants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn borrowed(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Permission {
    fn from(value: &'static str) -> Self {
        Self::borrowed(value)
    }
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

/// Permissions the access-control core itself checks.
///
/// Business-domain permissions (tickets, analytics, ...) live in the directory
/// and are opaque here.
pub mod well_known {
    use super::Permission;

    /// Allow-all. Carried by admin roles and full break-glass grants.
    pub const WILDCARD: Permission = Permission::borrowed("*");

    /// Issue break-glass grants.
    pub const EMERGENCY_GRANT: Permission = Permission::borrowed("emergency.grant");

    /// Revoke and review any break-glass grant, not just one's own.
    pub const EMERGENCY_MANAGE: Permission = Permission::borrowed("emergency.manage");

    /// Read the security metrics surface.
    pub const SECURITY_VIEW_METRICS: Permission = Permission::borrowed("security.view_metrics");
}

/// Definition of a permission in the catalog.
///
/// `department_scoped` permissions only apply within the holder's own
/// department; `global_variant` names the escape hatch (e.g.
/// `analytics.view_all_analytics` for `analytics.view_department_analytics`)
/// that makes scope irrelevant. Inactive definitions grant nothing even if a
/// role still lists them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDef {
    pub name: Permission,
    pub resource: String,
    pub action: String,
    pub department_scoped: bool,
    pub global_variant: Option<Permission>,
    pub active: bool,
}

impl PermissionDef {
    /// A permission with no department scoping.
    pub fn global(name: impl Into<Permission>) -> Self {
        let name = name.into();
        let (resource, action) = split_name(name.as_str());
        Self {
            name,
            resource,
            action,
            department_scoped: false,
            global_variant: None,
            active: true,
        }
    }

    /// A department-scoped permission, optionally paired with its global variant.
    pub fn scoped(name: impl Into<Permission>, global_variant: Option<Permission>) -> Self {
        let name = name.into();
        let (resource, action) = split_name(name.as_str());
        Self {
            name,
            resource,
            action,
            department_scoped: true,
            global_variant,
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

fn split_name(name: &str) -> (String, String) {
    match name.split_once('.') {
        Some((resource, action)) => (resource.to_string(), action.to_string()),
        None => (name.to_string(), name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn def_splits_resource_and_action_from_name() {
        let def = PermissionDef::global("tickets.view_all");
        assert_eq!(def.resource, "tickets");
        assert_eq!(def.action, "view_all");
        assert!(!def.department_scoped);
    }

    #[test]
    fn scoped_def_carries_its_global_variant() {
        let def = PermissionDef::scoped(
            "analytics.view_department_analytics",
            Some(Permission::borrowed("analytics.view_all_analytics")),
        );
        assert!(def.department_scoped);
        assert_eq!(
            def.global_variant.as_ref().map(|p| p.as_str()),
            Some("analytics.view_all_analytics")
        );
    }

    #[test]
    fn wildcard_is_recognised() {
        assert!(well_known::WILDCARD.is_wildcard());
        assert!(!well_known::EMERGENCY_GRANT.is_wildcard());
    }
}
