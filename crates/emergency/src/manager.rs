//! Break-glass grant lifecycle orchestration.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;

use crewdesk_audit::{AuditDraft, AuditRecord, AuditSink, AuditStore, AuditStoreError};
use crewdesk_auth::{Permission, ResolvedPrincipal, RoleGraph, evaluate, well_known};
use crewdesk_core::{Clock, GrantId, TenantId, UserId};
use crewdesk_events::{SecurityEvent, SecurityEventKind, SecurityEventPublisher};

use crate::grant::EmergencyGrant;
use crate::store::{GrantStore, GrantStoreError};
use crate::token::BreakGlassToken;

/// Issuance bounds.
#[derive(Debug, Clone, Copy)]
pub struct EmergencyConfig {
    /// Hard ceiling for grant lifetime. Requested durations are clamped down
    /// to this, never rejected for being too long.
    pub max_duration_minutes: u32,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            max_duration_minutes: 60,
        }
    }
}

#[derive(Debug, Error)]
pub enum EmergencyError {
    /// The one redemption failure the outside world ever sees. Unknown,
    /// expired, already-used, revoked and lost-race tokens are deliberately
    /// indistinguishable so callers cannot probe for grant existence.
    #[error("Invalid or expired break-glass token")]
    InvalidOrExpiredToken,

    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("issuer lacks the emergency grant permission")]
    IssuerNotAuthorized,

    #[error("performer may not revoke this grant")]
    RevokeNotAuthorized,

    #[error("grant not found")]
    GrantNotFound,

    #[error("grant already revoked")]
    AlreadyRevoked,

    #[error("grant store error: {0}")]
    Store(#[from] GrantStoreError),

    #[error("audit store error: {0}")]
    Audit(#[from] AuditStoreError),
}

impl EmergencyError {
    fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Request to issue a grant.
#[derive(Debug, Clone)]
pub struct IssueCommand {
    pub target_user: UserId,
    pub permissions: Vec<Permission>,
    pub reason: String,
    pub duration_minutes: u32,
}

/// Result of a successful issuance. The token exists only here, in memory,
/// until the caller hands it to the operator.
#[derive(Debug)]
pub struct IssuedGrant {
    pub grant: EmergencyGrant,
    pub token: BreakGlassToken,
}

/// Issues, redeems and retires break-glass grants.
///
/// Every state transition lands exactly one audit record and one security
/// event. Audit recording is fail-open (the sink absorbs failures); grant
/// store failures are real errors and propagate.
pub struct EmergencyAccessManager {
    grants: Arc<dyn GrantStore>,
    audit: AuditSink,
    audit_store: Arc<dyn AuditStore>,
    events: Arc<dyn SecurityEventPublisher>,
    clock: Arc<dyn Clock>,
    config: EmergencyConfig,
}

impl EmergencyAccessManager {
    pub fn new(
        grants: Arc<dyn GrantStore>,
        audit: AuditSink,
        audit_store: Arc<dyn AuditStore>,
        events: Arc<dyn SecurityEventPublisher>,
        clock: Arc<dyn Clock>,
        config: EmergencyConfig,
    ) -> Self {
        Self {
            grants,
            audit,
            audit_store,
            events,
            clock,
            config,
        }
    }

    /// Issue a grant for `cmd.target_user`, authorized against `issuer`.
    ///
    /// The issuer needs `emergency.grant`; the denial is audited like any
    /// other. Duration is clamped to the configured maximum.
    pub async fn issue(
        &self,
        cmd: IssueCommand,
        graph: &RoleGraph,
        issuer: &ResolvedPrincipal,
    ) -> Result<IssuedGrant, EmergencyError> {
        let now = self.clock.now();

        let decision = evaluate(graph, issuer, &well_known::EMERGENCY_GRANT, None, now);
        if let Some(draft) = decision.audit.clone() {
            self.audit.record(draft).await;
        }
        if !decision.is_allowed() {
            return Err(EmergencyError::IssuerNotAuthorized);
        }

        if cmd.permissions.is_empty() {
            return Err(EmergencyError::validation(
                "permissions",
                "at least one permission is required",
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(EmergencyError::validation("reason", "a reason is required"));
        }
        if cmd.duration_minutes == 0 {
            return Err(EmergencyError::validation(
                "duration_minutes",
                "duration must be at least one minute",
            ));
        }

        let minutes = cmd.duration_minutes.min(self.config.max_duration_minutes);
        let token = BreakGlassToken::generate();
        let grant = EmergencyGrant {
            id: GrantId::new(),
            tenant_id: issuer.tenant_id,
            target_user: cmd.target_user,
            token_hash: token.hash(),
            permissions: cmd.permissions,
            reason: cmd.reason.trim().to_string(),
            granted_by: issuer.user_id,
            granted_at: now,
            expires_at: now + Duration::minutes(i64::from(minutes)),
            used_at: None,
            revoked_at: None,
        };

        self.grants.insert(grant.clone()).await?;

        self.audit
            .record(AuditDraft::emergency_access_granted(
                grant.tenant_id,
                grant.id,
                grant.target_user,
                grant.granted_by,
                &grant.permission_names(),
                grant.reason.clone(),
                grant.expires_at,
            ))
            .await;
        self.events.publish(SecurityEvent::new(
            grant.tenant_id,
            SecurityEventKind::EmergencyAccessGranted {
                grant_id: grant.id,
                target_user: grant.target_user,
                permissions: grant.permission_names(),
            },
            now,
        ));
        tracing::warn!(
            grant = %grant.id,
            target_user = %grant.target_user,
            granted_by = %grant.granted_by,
            expires_at = %grant.expires_at,
            "break-glass grant issued"
        );

        Ok(IssuedGrant { grant, token })
    }

    /// Redeem a presented token.
    ///
    /// Exactly one concurrent redemption can succeed; the winner gets the
    /// updated grant for session authentication, everyone else gets the
    /// uniform error. An expired grant is never marked used.
    pub async fn redeem(
        &self,
        raw_token: &str,
        ip: Option<IpAddr>,
    ) -> Result<EmergencyGrant, EmergencyError> {
        let now = self.clock.now();
        let hash = crate::token::TokenHash::of(raw_token);

        let Some(grant) = self.grants.find_by_token_hash(&hash).await? else {
            return Err(EmergencyError::InvalidOrExpiredToken);
        };
        if !grant.redeemable(now) {
            return Err(EmergencyError::InvalidOrExpiredToken);
        }
        let Some(updated) = self.grants.mark_used(grant.id, now).await? else {
            // Lost the race, or state moved under us. Same answer either way.
            return Err(EmergencyError::InvalidOrExpiredToken);
        };

        self.audit
            .record(AuditDraft::emergency_access_used(
                updated.tenant_id,
                updated.id,
                updated.target_user,
                None,
                ip,
            ))
            .await;
        self.events.publish(SecurityEvent::new(
            updated.tenant_id,
            SecurityEventKind::EmergencyAccessUsed {
                grant_id: updated.id,
                target_user: updated.target_user,
            },
            now,
        ));
        tracing::warn!(
            grant = %updated.id,
            target_user = %updated.target_user,
            "break-glass token redeemed"
        );

        Ok(updated)
    }

    /// Administratively terminate a grant before expiry.
    ///
    /// Allowed to the original issuer and to holders of `emergency.manage`.
    /// Revoking a redeemed grant kills the live elevation.
    pub async fn revoke(
        &self,
        tenant_id: TenantId,
        grant_id: GrantId,
        graph: &RoleGraph,
        performer: &ResolvedPrincipal,
    ) -> Result<EmergencyGrant, EmergencyError> {
        let now = self.clock.now();

        let Some(grant) = self.grants.get(tenant_id, grant_id).await? else {
            return Err(EmergencyError::GrantNotFound);
        };

        let permitted = if performer.user_id == grant.granted_by {
            true
        } else {
            let decision = evaluate(graph, performer, &well_known::EMERGENCY_MANAGE, None, now);
            if let Some(draft) = decision.audit.clone() {
                self.audit.record(draft).await;
            }
            decision.is_allowed()
        };
        if !permitted {
            return Err(EmergencyError::RevokeNotAuthorized);
        }

        let Some(updated) = self.grants.mark_revoked(tenant_id, grant_id, now).await? else {
            return Err(EmergencyError::AlreadyRevoked);
        };

        self.audit
            .record(AuditDraft::emergency_access_revoked(
                updated.tenant_id,
                updated.id,
                updated.target_user,
                performer.user_id,
            ))
            .await;
        self.events.publish(SecurityEvent::new(
            updated.tenant_id,
            SecurityEventKind::EmergencyAccessRevoked {
                grant_id: updated.id,
                revoked_by: performer.user_id,
            },
            now,
        ));
        tracing::warn!(
            grant = %updated.id,
            revoked_by = %performer.user_id,
            "break-glass grant revoked"
        );

        Ok(updated)
    }

    /// Every audit record tied to a grant: issuance, redemption, and each
    /// permission check the grant backed. Post-incident review input.
    pub async fn usage_events(
        &self,
        tenant_id: TenantId,
        grant_id: GrantId,
    ) -> Result<Vec<AuditRecord>, EmergencyError> {
        if self.grants.get(tenant_id, grant_id).await?.is_none() {
            return Err(EmergencyError::GrantNotFound);
        }
        Ok(self.audit_store.for_grant(tenant_id, grant_id).await?)
    }

    /// Live elevations for a user, in evaluator form.
    pub async fn active_grants_for(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<crewdesk_auth::ActiveGrant>, EmergencyError> {
        let now = self.clock.now();
        Ok(self
            .grants
            .in_force_for_user(tenant_id, user_id, now)
            .await?
            .iter()
            .map(EmergencyGrant::as_active_grant)
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGrantStore;
    use chrono::{TimeZone, Utc};
    use crewdesk_audit::{AuditAction, InMemoryAuditStore};
    use crewdesk_auth::{PermissionDef, Role, RoleAssignment};
    use crewdesk_core::FixedClock;
    use crewdesk_events::{EventBus, InMemoryEventBus, Subscription};

    struct Harness {
        manager: EmergencyAccessManager,
        grants: Arc<InMemoryGrantStore>,
        audit_store: Arc<InMemoryAuditStore>,
        clock: FixedClock,
        events: Subscription<SecurityEvent>,
        graph: RoleGraph,
        issuer: ResolvedPrincipal,
        bystander: ResolvedPrincipal,
    }

    fn harness() -> Harness {
        let tenant = TenantId::new();
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
        let grants = Arc::new(InMemoryGrantStore::new());
        let audit_store = Arc::new(InMemoryAuditStore::new());
        let bus = Arc::new(InMemoryEventBus::<SecurityEvent>::new());
        let events = bus.subscribe();

        let security_role = Role::new(
            tenant,
            "security_admin",
            80,
            vec![
                well_known::EMERGENCY_GRANT,
                well_known::EMERGENCY_MANAGE,
            ],
        );
        let graph = RoleGraph::new(
            vec![security_role.clone()],
            vec![
                PermissionDef::global("emergency.grant"),
                PermissionDef::global("emergency.manage"),
                PermissionDef::global("tickets.view_all"),
            ],
            vec![],
        );

        let issuer_id = UserId::new();
        let issuer = ResolvedPrincipal::new(issuer_id, tenant, None).with_assignments(vec![
            RoleAssignment::permanent(issuer_id, security_role.id, UserId::new(), clock.now()),
        ]);
        let bystander = ResolvedPrincipal::new(UserId::new(), tenant, None);

        let manager = EmergencyAccessManager::new(
            grants.clone(),
            AuditSink::new(audit_store.clone(), Arc::new(clock.clone())),
            audit_store.clone(),
            bus,
            Arc::new(clock.clone()),
            EmergencyConfig::default(),
        );

        Harness {
            manager,
            grants,
            audit_store,
            clock,
            events,
            graph,
            issuer,
            bystander,
        }
    }

    fn issue_cmd(target: UserId) -> IssueCommand {
        IssueCommand {
            target_user: target,
            permissions: vec![Permission::borrowed("tickets.view_all")],
            reason: "sev1 incident triage".to_string(),
            duration_minutes: 10,
        }
    }

    #[tokio::test]
    async fn issue_then_redeem_round_trip() {
        let h = harness();
        let target = UserId::new();

        let issued = h
            .manager
            .issue(issue_cmd(target), &h.graph, &h.issuer)
            .await
            .unwrap();
        assert_eq!(issued.grant.target_user, target);
        assert_eq!(
            issued.grant.expires_at,
            h.clock.now() + Duration::minutes(10)
        );

        let redeemed = h.manager.redeem(issued.token.as_str(), None).await.unwrap();
        assert_eq!(redeemed.used_at, Some(h.clock.now()));

        let trail = h
            .audit_store
            .for_grant(issued.grant.tenant_id, issued.grant.id)
            .await
            .unwrap();
        let granted = trail
            .iter()
            .filter(|r| r.action == AuditAction::EmergencyAccessGranted)
            .count();
        let used = trail
            .iter()
            .filter(|r| r.action == AuditAction::EmergencyAccessUsed)
            .count();
        assert_eq!((granted, used), (1, 1));

        assert_eq!(
            h.events.try_recv().unwrap().kind.label(),
            "security.emergency_access.granted"
        );
        assert_eq!(
            h.events.try_recv().unwrap().kind.label(),
            "security.emergency_access.used"
        );
    }

    #[tokio::test]
    async fn second_redemption_gets_the_uniform_error() {
        let h = harness();
        let issued = h
            .manager
            .issue(issue_cmd(UserId::new()), &h.graph, &h.issuer)
            .await
            .unwrap();

        h.manager.redeem(issued.token.as_str(), None).await.unwrap();
        let err = h.manager.redeem(issued.token.as_str(), None).await.unwrap_err();
        assert!(matches!(err, EmergencyError::InvalidOrExpiredToken));
        assert_eq!(err.to_string(), "Invalid or expired break-glass token");
    }

    #[tokio::test]
    async fn expired_token_never_redeems_and_used_at_stays_null() {
        let h = harness();
        let mut cmd = issue_cmd(UserId::new());
        cmd.duration_minutes = 1;
        let issued = h.manager.issue(cmd, &h.graph, &h.issuer).await.unwrap();

        h.clock.advance(Duration::seconds(61));

        let err = h.manager.redeem(issued.token.as_str(), None).await.unwrap_err();
        assert!(matches!(err, EmergencyError::InvalidOrExpiredToken));

        let stored = h
            .grants
            .get(issued.grant.tenant_id, issued.grant.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.used_at.is_none());
    }

    #[tokio::test]
    async fn unknown_and_revoked_tokens_are_indistinguishable() {
        let h = harness();
        let issued = h
            .manager
            .issue(issue_cmd(UserId::new()), &h.graph, &h.issuer)
            .await
            .unwrap();
        h.manager
            .revoke(issued.grant.tenant_id, issued.grant.id, &h.graph, &h.issuer)
            .await
            .unwrap();

        let revoked = h.manager.redeem(issued.token.as_str(), None).await.unwrap_err();
        let unknown = h.manager.redeem("bg_not_a_real_token", None).await.unwrap_err();

        assert_eq!(revoked.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn concurrent_redemption_has_exactly_one_winner() {
        let h = harness();
        let issued = h
            .manager
            .issue(issue_cmd(UserId::new()), &h.graph, &h.issuer)
            .await
            .unwrap();
        let token = issued.token.as_str().to_string();

        let (a, b) = tokio::join!(
            h.manager.redeem(&token, None),
            h.manager.redeem(&token, None)
        );

        let winners = [a.is_ok(), b.is_ok()].iter().filter(|w| **w).count();
        assert_eq!(winners, 1);

        let used = h
            .audit_store
            .for_grant(issued.grant.tenant_id, issued.grant.id)
            .await
            .unwrap()
            .iter()
            .filter(|r| r.action == AuditAction::EmergencyAccessUsed)
            .count();
        assert_eq!(used, 1);
    }

    #[tokio::test]
    async fn duration_is_clamped_to_the_configured_maximum() {
        let h = harness();
        let mut cmd = issue_cmd(UserId::new());
        cmd.duration_minutes = 24 * 60;

        let issued = h.manager.issue(cmd, &h.graph, &h.issuer).await.unwrap();

        assert_eq!(
            issued.grant.expires_at,
            h.clock.now() + Duration::minutes(60)
        );
    }

    #[tokio::test]
    async fn issuance_validates_fields_after_authorization() {
        let h = harness();

        let mut no_perms = issue_cmd(UserId::new());
        no_perms.permissions.clear();
        let err = h.manager.issue(no_perms, &h.graph, &h.issuer).await.unwrap_err();
        assert!(matches!(err, EmergencyError::Validation { field: "permissions", .. }));

        let mut blank_reason = issue_cmd(UserId::new());
        blank_reason.reason = "   ".to_string();
        let err = h
            .manager
            .issue(blank_reason, &h.graph, &h.issuer)
            .await
            .unwrap_err();
        assert!(matches!(err, EmergencyError::Validation { field: "reason", .. }));

        let mut zero = issue_cmd(UserId::new());
        zero.duration_minutes = 0;
        let err = h.manager.issue(zero, &h.graph, &h.issuer).await.unwrap_err();
        assert!(matches!(err, EmergencyError::Validation { field: "duration_minutes", .. }));
    }

    #[tokio::test]
    async fn unauthorized_issuer_is_denied_and_audited() {
        let h = harness();

        let err = h
            .manager
            .issue(issue_cmd(UserId::new()), &h.graph, &h.bystander)
            .await
            .unwrap_err();
        assert!(matches!(err, EmergencyError::IssuerNotAuthorized));

        let denials = h
            .audit_store
            .for_user(h.bystander.tenant_id, h.bystander.user_id, 10)
            .await
            .unwrap();
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].action, AuditAction::PermissionDenied);
        assert_eq!(denials[0].permission.as_deref(), Some("emergency.grant"));
    }

    #[tokio::test]
    async fn revoke_rules_issuer_manager_and_bystander() {
        let h = harness();
        let issued = h
            .manager
            .issue(issue_cmd(UserId::new()), &h.graph, &h.issuer)
            .await
            .unwrap();

        // A principal with neither issuer identity nor emergency.manage.
        let err = h
            .manager
            .revoke(issued.grant.tenant_id, issued.grant.id, &h.graph, &h.bystander)
            .await
            .unwrap_err();
        assert!(matches!(err, EmergencyError::RevokeNotAuthorized));

        // The issuer may revoke their own grant.
        let revoked = h
            .manager
            .revoke(issued.grant.tenant_id, issued.grant.id, &h.graph, &h.issuer)
            .await
            .unwrap();
        assert_eq!(revoked.revoked_at, Some(h.clock.now()));

        // Revoking again conflicts.
        let err = h
            .manager
            .revoke(issued.grant.tenant_id, issued.grant.id, &h.graph, &h.issuer)
            .await
            .unwrap_err();
        assert!(matches!(err, EmergencyError::AlreadyRevoked));
    }

    #[tokio::test]
    async fn revocation_kills_live_elevation() {
        let h = harness();
        let target = UserId::new();
        let issued = h
            .manager
            .issue(issue_cmd(target), &h.graph, &h.issuer)
            .await
            .unwrap();
        h.manager.redeem(issued.token.as_str(), None).await.unwrap();

        assert_eq!(
            h.manager
                .active_grants_for(issued.grant.tenant_id, target)
                .await
                .unwrap()
                .len(),
            1
        );

        h.manager
            .revoke(issued.grant.tenant_id, issued.grant.id, &h.graph, &h.issuer)
            .await
            .unwrap();

        assert!(h
            .manager
            .active_grants_for(issued.grant.tenant_id, target)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn usage_events_cover_the_whole_grant_trail() {
        let h = harness();
        let issued = h
            .manager
            .issue(issue_cmd(UserId::new()), &h.graph, &h.issuer)
            .await
            .unwrap();
        h.manager.redeem(issued.token.as_str(), None).await.unwrap();

        let trail = h
            .manager
            .usage_events(issued.grant.tenant_id, issued.grant.id)
            .await
            .unwrap();
        assert_eq!(trail.len(), 2);
        assert!(trail.iter().all(|r| r.grant_id == Some(issued.grant.id)));

        let err = h
            .manager
            .usage_events(issued.grant.tenant_id, GrantId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EmergencyError::GrantNotFound));
    }
}
