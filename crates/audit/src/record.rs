//! Audit trail records.
//!
//! Every decision that deviates from default policy (a denial, a break-glass
//! transition, a network block) leaves exactly one record. Records are
//! append-only facts; there is no mutating API anywhere in this crate.

use core::str::FromStr;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crewdesk_core::{AuditRecordId, DepartmentId, DomainError, GrantId, TenantId, UserId};

/// What was recorded. Closed set; persisted as a stable string label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    PermissionDenied,
    EmergencyAccessGranted,
    EmergencyAccessUsed,
    EmergencyAccessRevoked,
    IpBlocked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::EmergencyAccessGranted => "emergency_access_granted",
            Self::EmergencyAccessUsed => "emergency_access_used",
            Self::EmergencyAccessRevoked => "emergency_access_revoked",
            Self::IpBlocked => "ip_blocked",
        }
    }
}

impl FromStr for AuditAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permission_denied" => Ok(Self::PermissionDenied),
            "emergency_access_granted" => Ok(Self::EmergencyAccessGranted),
            "emergency_access_used" => Ok(Self::EmergencyAccessUsed),
            "emergency_access_revoked" => Ok(Self::EmergencyAccessRevoked),
            "ip_blocked" => Ok(Self::IpBlocked),
            other => Err(DomainError::validation(format!(
                "unknown audit action '{other}'"
            ))),
        }
    }
}

/// A persisted audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditRecordId,
    pub tenant_id: TenantId,
    pub action: AuditAction,

    /// The user the action concerns (denied principal, grant target, ...).
    pub user_id: Option<UserId>,
    /// Who caused it. `None` for system-initiated records (e.g. auto blocks).
    pub performed_by: Option<UserId>,

    pub permission: Option<String>,
    pub grant_id: Option<GrantId>,
    pub ip: Option<IpAddr>,
    pub reason: Option<String>,

    /// State before/after the action, where a before/after exists.
    pub old_values: Option<JsonValue>,
    pub new_values: Option<JsonValue>,

    pub created_at: DateTime<Utc>,
}

/// An audit record minus identity and timestamp.
///
/// Decision logic produces drafts; the sink stamps id + clock time when it
/// records them. Keeps the pure layers free of id generation and ambient time.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditDraft {
    pub tenant_id: TenantId,
    pub action: AuditAction,
    pub user_id: Option<UserId>,
    pub performed_by: Option<UserId>,
    pub permission: Option<String>,
    pub grant_id: Option<GrantId>,
    pub ip: Option<IpAddr>,
    pub reason: Option<String>,
    pub old_values: Option<JsonValue>,
    pub new_values: Option<JsonValue>,
}

impl AuditDraft {
    pub fn into_record(self, id: AuditRecordId, created_at: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id,
            tenant_id: self.tenant_id,
            action: self.action,
            user_id: self.user_id,
            performed_by: self.performed_by,
            permission: self.permission,
            grant_id: self.grant_id,
            ip: self.ip,
            reason: self.reason,
            old_values: self.old_values,
            new_values: self.new_values,
            created_at,
        }
    }

    pub fn permission_denied(
        tenant_id: TenantId,
        user_id: UserId,
        permission: impl Into<String>,
        department: Option<DepartmentId>,
    ) -> Self {
        Self {
            tenant_id,
            action: AuditAction::PermissionDenied,
            user_id: Some(user_id),
            performed_by: Some(user_id),
            permission: Some(permission.into()),
            grant_id: None,
            ip: None,
            reason: None,
            old_values: None,
            new_values: department.map(|d| json!({ "department_id": d })),
        }
    }

    pub fn emergency_access_granted(
        tenant_id: TenantId,
        grant_id: GrantId,
        target_user: UserId,
        granted_by: UserId,
        permissions: &[String],
        reason: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            action: AuditAction::EmergencyAccessGranted,
            user_id: Some(target_user),
            performed_by: Some(granted_by),
            permission: None,
            grant_id: Some(grant_id),
            ip: None,
            reason: Some(reason.into()),
            old_values: None,
            new_values: Some(json!({
                "permissions": permissions,
                "expires_at": expires_at,
            })),
        }
    }

    pub fn emergency_access_used(
        tenant_id: TenantId,
        grant_id: GrantId,
        target_user: UserId,
        permission: Option<String>,
        ip: Option<IpAddr>,
    ) -> Self {
        Self {
            tenant_id,
            action: AuditAction::EmergencyAccessUsed,
            user_id: Some(target_user),
            performed_by: Some(target_user),
            permission,
            grant_id: Some(grant_id),
            ip,
            reason: None,
            old_values: None,
            new_values: None,
        }
    }

    pub fn emergency_access_revoked(
        tenant_id: TenantId,
        grant_id: GrantId,
        target_user: UserId,
        revoked_by: UserId,
    ) -> Self {
        Self {
            tenant_id,
            action: AuditAction::EmergencyAccessRevoked,
            user_id: Some(target_user),
            performed_by: Some(revoked_by),
            permission: None,
            grant_id: Some(grant_id),
            ip: None,
            reason: None,
            old_values: Some(json!({ "status": "active" })),
            new_values: Some(json!({ "status": "revoked" })),
        }
    }

    pub fn ip_blocked(
        tenant_id: TenantId,
        ip: IpAddr,
        points: u32,
        ttl_secs: u64,
        signals: &[String],
    ) -> Self {
        Self {
            tenant_id,
            action: AuditAction::IpBlocked,
            user_id: None,
            performed_by: None,
            permission: None,
            grant_id: None,
            ip: Some(ip),
            reason: Some(format!("threat score {points}")),
            old_values: None,
            new_values: Some(json!({
                "ttl_secs": ttl_secs,
                "signals": signals,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_labels_round_trip() {
        for action in [
            AuditAction::PermissionDenied,
            AuditAction::EmergencyAccessGranted,
            AuditAction::EmergencyAccessUsed,
            AuditAction::EmergencyAccessRevoked,
            AuditAction::IpBlocked,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("rm_rf".parse::<AuditAction>().is_err());
    }

    #[test]
    fn denied_draft_names_the_permission() {
        let tenant = TenantId::new();
        let user = UserId::new();
        let draft = AuditDraft::permission_denied(tenant, user, "tickets.delete", None);

        assert_eq!(draft.action, AuditAction::PermissionDenied);
        assert_eq!(draft.permission.as_deref(), Some("tickets.delete"));
        assert_eq!(draft.user_id, Some(user));
    }
}
