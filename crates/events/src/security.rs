//! Security event model.
//!
//! Security-relevant transitions (break-glass lifecycle, threat verdicts,
//! network blocks) are published on the event bus as a **closed set of
//! variants**. Consumers match exhaustively; adding a variant does not compile
//! until [`SecurityEventKind::severity`] and [`SecurityEventKind::description`]
//! say what it means. There is no string-keyed dispatch anywhere.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crewdesk_core::{GrantId, TenantId, UserId};

/// How urgently an event should reach a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityEventKind {
    /// A break-glass grant was issued for `target_user`.
    EmergencyAccessGranted {
        grant_id: GrantId,
        target_user: UserId,
        permissions: Vec<String>,
    },
    /// A break-glass token was redeemed; elevated access is now live.
    EmergencyAccessUsed {
        grant_id: GrantId,
        target_user: UserId,
    },
    /// A break-glass grant was withdrawn before expiry.
    EmergencyAccessRevoked {
        grant_id: GrantId,
        revoked_by: UserId,
    },
    /// Threat scoring crossed the suspicious threshold.
    SuspiciousActivity {
        user: Option<UserId>,
        ip: IpAddr,
        points: u32,
        signals: Vec<String>,
    },
    /// Threat scoring crossed the critical threshold; the source is blocked.
    IpBlocked {
        ip: IpAddr,
        points: u32,
        ttl_secs: u64,
    },
}

impl SecurityEventKind {
    /// Stable wire/type label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::EmergencyAccessGranted { .. } => "security.emergency_access.granted",
            Self::EmergencyAccessUsed { .. } => "security.emergency_access.used",
            Self::EmergencyAccessRevoked { .. } => "security.emergency_access.revoked",
            Self::SuspiciousActivity { .. } => "security.suspicious_activity",
            Self::IpBlocked { .. } => "security.ip_blocked",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::EmergencyAccessGranted { .. } => Severity::Warning,
            Self::EmergencyAccessUsed { .. } => Severity::Critical,
            Self::EmergencyAccessRevoked { .. } => Severity::Info,
            Self::SuspiciousActivity { .. } => Severity::Warning,
            Self::IpBlocked { .. } => Severity::Critical,
        }
    }

    /// One-line human summary for notification channels.
    pub fn description(&self) -> String {
        match self {
            Self::EmergencyAccessGranted {
                target_user,
                permissions,
                ..
            } => format!(
                "break-glass access granted to user {target_user} ({} permissions)",
                permissions.len()
            ),
            Self::EmergencyAccessUsed { target_user, .. } => {
                format!("break-glass token redeemed by user {target_user}")
            }
            Self::EmergencyAccessRevoked { revoked_by, .. } => {
                format!("break-glass grant revoked by user {revoked_by}")
            }
            Self::SuspiciousActivity {
                ip,
                points,
                signals,
                ..
            } => format!(
                "suspicious activity from {ip} scored {points} [{}]",
                signals.join(", ")
            ),
            Self::IpBlocked {
                ip,
                points,
                ttl_secs,
            } => format!("{ip} blocked for {ttl_secs}s after scoring {points}"),
        }
    }
}

/// A security event as published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub tenant_id: TenantId,
    pub kind: SecurityEventKind,
    pub occurred_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(tenant_id: TenantId, kind: SecurityEventKind, occurred_at: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            kind,
            occurred_at,
        }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered_for_threshold_checks() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn redemption_and_blocks_are_critical() {
        let used = SecurityEventKind::EmergencyAccessUsed {
            grant_id: GrantId::new(),
            target_user: UserId::new(),
        };
        let blocked = SecurityEventKind::IpBlocked {
            ip: "203.0.113.9".parse().unwrap(),
            points: 95,
            ttl_secs: 1800,
        };

        assert_eq!(used.severity(), Severity::Critical);
        assert_eq!(blocked.severity(), Severity::Critical);
    }

    #[test]
    fn labels_are_stable_identifiers() {
        let kind = SecurityEventKind::SuspiciousActivity {
            user: None,
            ip: "198.51.100.4".parse().unwrap(),
            points: 55,
            signals: vec!["unrecognized_ip".into()],
        };

        assert_eq!(kind.label(), "security.suspicious_activity");
        assert!(kind.description().contains("198.51.100.4"));
    }
}
