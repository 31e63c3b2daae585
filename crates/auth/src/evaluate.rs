//! Permission evaluation.
//!
//! Pure functions over a [`RoleGraph`] snapshot and a [`ResolvedPrincipal`]:
//! no IO, no panics, no ambient time. A denial is an ordinary value, never an
//! error. Decisions that deviate from default policy carry an audit draft the
//! caller records after the fact; the evaluator itself never writes anywhere.

use chrono::{DateTime, Utc};

use crewdesk_audit::AuditDraft;
use crewdesk_core::{DepartmentId, GrantId, UserId};

use crate::graph::RoleGraph;
use crate::permissions::Permission;
use crate::principal::ResolvedPrincipal;

/// Narrowing constraint on where a permission applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessScope {
    pub department_id: DepartmentId,
}

impl AccessScope {
    pub fn department(department_id: DepartmentId) -> Self {
        Self { department_id }
    }
}

/// Why a decision came out the way it did. Internal detail for logs and
/// audit; the HTTP layer renders every denial as a generic forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionBasis {
    /// Allowed through a break-glass grant in force.
    EmergencyGrant(GrantId),
    /// Allowed through the role permission union.
    Role,
    /// Allowed because the actor and target are the same principal.
    SelfAction,
    /// Denied: permission absent from the principal's union.
    NotGranted,
    /// Denied: the permission is switched off in the catalog.
    PermissionInactive,
    /// Denied: department-scoped permission used outside own department.
    OutOfDepartment,
}

/// Outcome of a permission evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub basis: DecisionBasis,
    /// Present when the decision deviates from default policy (every denial,
    /// every grant-backed allow). The caller records it via the audit sink.
    pub audit: Option<AuditDraft>,
}

impl AccessDecision {
    fn allow(basis: DecisionBasis) -> Self {
        Self {
            allowed: true,
            basis,
            audit: None,
        }
    }

    fn allow_via_grant(basis: DecisionBasis, audit: AuditDraft) -> Self {
        Self {
            allowed: true,
            basis,
            audit: Some(audit),
        }
    }

    fn deny(basis: DecisionBasis, audit: AuditDraft) -> Self {
        Self {
            allowed: false,
            basis,
            audit: Some(audit),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

/// Can `principal` perform `permission`, optionally narrowed to a scope?
///
/// Decision order:
/// 1. A break-glass grant in force that covers the permission (or carries the
///    wildcard) allows outright, before any catalog or role check.
/// 2. A permission deactivated in the catalog is off for everyone else,
///    wildcard holders included.
/// 3. The permission must appear in the union of the principal's active
///    assignments' active roles.
/// 4. If a scope is supplied and the permission is department-scoped, the
///    principal must sit in the scoped department, unless they also hold the
///    permission's global variant (which makes scope irrelevant).
pub fn evaluate(
    graph: &RoleGraph,
    principal: &ResolvedPrincipal,
    permission: &Permission,
    scope: Option<AccessScope>,
    now: DateTime<Utc>,
) -> AccessDecision {
    if let Some(grant) = principal
        .active_grants
        .iter()
        .find(|g| g.covers(permission.as_str()))
    {
        return AccessDecision::allow_via_grant(
            DecisionBasis::EmergencyGrant(grant.grant_id),
            AuditDraft::emergency_access_used(
                principal.tenant_id,
                grant.grant_id,
                principal.user_id,
                Some(permission.as_str().to_string()),
                None,
            ),
        );
    }

    let denial = || {
        AuditDraft::permission_denied(
            principal.tenant_id,
            principal.user_id,
            permission.as_str(),
            scope.map(|s| s.department_id),
        )
    };

    if graph
        .permission_def(permission.as_str())
        .is_some_and(|def| !def.active)
    {
        return AccessDecision::deny(DecisionBasis::PermissionInactive, denial());
    }

    let effective = graph.effective_permissions(principal, now);

    if !effective.allows(permission.as_str()) {
        return AccessDecision::deny(DecisionBasis::NotGranted, denial());
    }

    if let Some(scope) = scope {
        if let Some(def) = graph.permission_def(permission.as_str()) {
            if def.department_scoped {
                let in_own_department = principal.department_id == Some(scope.department_id);
                let holds_global_variant = def
                    .global_variant
                    .as_ref()
                    .is_some_and(|g| effective.allows(g.as_str()));

                if !in_own_department && !holds_global_variant {
                    return AccessDecision::deny(DecisionBasis::OutOfDepartment, denial());
                }
            }
        }
    }

    AccessDecision::allow(DecisionBasis::Role)
}

/// Can `actor` act on `target_user` under a manage-style permission?
///
/// - every principal may act on themselves;
/// - a global manage permission acts on anyone;
/// - a department-scoped manage permission acts only within the actor's own
///   department (the global variant lifts that, as in [`evaluate`]).
pub fn can_act_on(
    graph: &RoleGraph,
    actor: &ResolvedPrincipal,
    target_user: UserId,
    target_department: Option<DepartmentId>,
    manage_permission: &Permission,
    now: DateTime<Utc>,
) -> AccessDecision {
    if actor.user_id == target_user {
        return AccessDecision::allow(DecisionBasis::SelfAction);
    }

    if let Some(grant) = actor
        .active_grants
        .iter()
        .find(|g| g.covers(manage_permission.as_str()))
    {
        return AccessDecision::allow_via_grant(
            DecisionBasis::EmergencyGrant(grant.grant_id),
            AuditDraft::emergency_access_used(
                actor.tenant_id,
                grant.grant_id,
                actor.user_id,
                Some(manage_permission.as_str().to_string()),
                None,
            ),
        );
    }

    let denial = || {
        AuditDraft::permission_denied(
            actor.tenant_id,
            actor.user_id,
            manage_permission.as_str(),
            target_department,
        )
    };

    if graph
        .permission_def(manage_permission.as_str())
        .is_some_and(|def| !def.active)
    {
        return AccessDecision::deny(DecisionBasis::PermissionInactive, denial());
    }

    let effective = graph.effective_permissions(actor, now);

    if !effective.allows(manage_permission.as_str()) {
        return AccessDecision::deny(DecisionBasis::NotGranted, denial());
    }

    let department_scoped = graph
        .permission_def(manage_permission.as_str())
        .is_some_and(|def| def.department_scoped);

    if department_scoped {
        let holds_global_variant = graph
            .permission_def(manage_permission.as_str())
            .and_then(|def| def.global_variant.as_ref())
            .is_some_and(|g| effective.allows(g.as_str()));

        let same_department =
            actor.department_id.is_some() && actor.department_id == target_department;

        if !holds_global_variant && !same_department {
            return AccessDecision::deny(DecisionBasis::OutOfDepartment, denial());
        }
    }

    AccessDecision::allow(DecisionBasis::Role)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
