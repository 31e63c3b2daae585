//! Emergency grant state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crewdesk_auth::{ActiveGrant, Permission};
use crewdesk_core::{GrantId, TenantId, UserId};

use crate::token::TokenHash;

/// Derived lifecycle state of a grant. `Active -> {Redeemed, Expired, Revoked}`;
/// the terminal states are mutually exclusive and never stored, always derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    /// Issued, token not yet redeemed, not expired, not revoked.
    Active,
    /// Token redeemed; elevation runs until expiry or revocation.
    Redeemed,
    /// Expired unredeemed.
    Expired,
    /// Administratively terminated.
    Revoked,
}

/// A break-glass grant as persisted.
///
/// `used_at`/`revoked_at` are the only mutable fields, each writable once;
/// everything else is fixed at issue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyGrant {
    pub id: GrantId,
    pub tenant_id: TenantId,
    pub target_user: UserId,
    pub token_hash: TokenHash,
    pub permissions: Vec<Permission>,
    pub reason: String,
    pub granted_by: UserId,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl EmergencyGrant {
    pub fn status(&self, now: DateTime<Utc>) -> GrantStatus {
        if self.revoked_at.is_some() {
            GrantStatus::Revoked
        } else if self.used_at.is_some() {
            GrantStatus::Redeemed
        } else if now >= self.expires_at {
            GrantStatus::Expired
        } else {
            GrantStatus::Active
        }
    }

    /// Can the token still be redeemed?
    pub fn redeemable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.revoked_at.is_none() && now < self.expires_at
    }

    /// Is the elevation currently live (redeemed, unrevoked, unexpired)?
    pub fn in_force(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_some() && self.revoked_at.is_none() && now < self.expires_at
    }

    /// View for the permission evaluator.
    pub fn as_active_grant(&self) -> ActiveGrant {
        ActiveGrant {
            grant_id: self.id,
            permissions: self.permissions.clone(),
        }
    }

    pub fn permission_names(&self) -> Vec<String> {
        self.permissions.iter().map(|p| p.as_str().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(now: DateTime<Utc>) -> EmergencyGrant {
        EmergencyGrant {
            id: GrantId::new(),
            tenant_id: TenantId::new(),
            target_user: UserId::new(),
            token_hash: TokenHash::of("bg_example"),
            permissions: vec![Permission::borrowed("tickets.view_all")],
            reason: "sev1 outage triage".to_string(),
            granted_by: UserId::new(),
            granted_at: now,
            expires_at: now + Duration::minutes(10),
            used_at: None,
            revoked_at: None,
        }
    }

    #[test]
    fn status_walks_the_lifecycle() {
        let now = Utc::now();
        let mut g = grant(now);

        assert_eq!(g.status(now), GrantStatus::Active);
        assert!(g.redeemable(now));
        assert!(!g.in_force(now));

        g.used_at = Some(now + Duration::minutes(1));
        assert_eq!(g.status(now + Duration::minutes(2)), GrantStatus::Redeemed);
        assert!(!g.redeemable(now + Duration::minutes(2)));
        assert!(g.in_force(now + Duration::minutes(2)));

        // Elevation dies at expiry even though the status stays Redeemed.
        assert!(!g.in_force(now + Duration::minutes(11)));

        g.revoked_at = Some(now + Duration::minutes(3));
        assert_eq!(g.status(now + Duration::minutes(4)), GrantStatus::Revoked);
        assert!(!g.in_force(now + Duration::minutes(4)));
    }

    #[test]
    fn unredeemed_grant_expires() {
        let now = Utc::now();
        let g = grant(now);

        assert_eq!(g.status(now + Duration::minutes(10)), GrantStatus::Expired);
        assert!(!g.redeemable(now + Duration::minutes(10)));
    }
}
