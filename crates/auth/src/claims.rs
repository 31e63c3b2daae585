use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crewdesk_core::{TenantId, UserId};

/// JWT claims model (transport-agnostic).
///
/// The token asserts identity and tenant context only. Roles and
/// permissions are resolved from the directory per request, so assignment
/// expiry and revocation take effect without waiting out a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    /// Tenant context for the token.
    pub tenant_id: TenantId,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("session token expired")]
    Expired,

    #[error("session token issued in the future")]
    NotYetValid,

    #[error("session token window is inverted")]
    InvalidTimeWindow,
}

impl JwtClaims {
    /// Deterministic claims validation against a caller-supplied `now`.
    ///
    /// Signature verification and decoding happen at the transport edge;
    /// this checks only the time window the token asserts about itself.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
        if self.expires_at <= self.issued_at {
            Err(TokenValidationError::InvalidTimeWindow)
        } else if now < self.issued_at {
            Err(TokenValidationError::NotYetValid)
        } else if now >= self.expires_at {
            Err(TokenValidationError::Expired)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: UserId::new(),
            tenant_id: TenantId::new(),
            issued_at,
            expires_at,
        }
    }

    #[test]
    fn claims_validate_within_window() {
        let now = Utc::now();
        let c = claims(now - Duration::minutes(5), now + Duration::minutes(5));
        assert!(c.validate(now).is_ok());
    }

    #[test]
    fn expired_and_premature_claims_are_rejected() {
        let now = Utc::now();

        let expired = claims(now - Duration::hours(2), now - Duration::hours(1));
        assert_eq!(expired.validate(now), Err(TokenValidationError::Expired));

        let premature = claims(now + Duration::minutes(1), now + Duration::hours(1));
        assert_eq!(premature.validate(now), Err(TokenValidationError::NotYetValid));

        let inverted = claims(now, now - Duration::minutes(1));
        assert_eq!(
            inverted.validate(now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }
}
