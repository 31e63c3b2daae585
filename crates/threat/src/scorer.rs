//! Composite threat scoring over request context plus recent history.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crewdesk_audit::{AuditDraft, AuditSink};
use crewdesk_core::{Clock, SecurityLogId, TenantId, UserId};
use crewdesk_events::{SecurityEvent, SecurityEventKind, SecurityEventPublisher};

use crate::blocklist::BlockStore;
use crate::context::{GeoPoint, RequestContext};
use crate::counters::{CounterStore, CounterStoreError};
use crate::log::{SecurityLogEntry, SecurityLogStore};
use crate::signal::{self, ThreatConfig, ThreatSignal, Verdict, score_signals};
use crate::throttle::NotificationThrottle;

/// Reputation entries outlive most attack campaigns but do age out.
const BAD_REPUTATION_TTL_SECS: u64 = 7 * 24 * 3600;

/// Outcome of one scoring pass. The scorer records its own side effects
/// (log, block, audit, events); the caller acts on the verdict only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub points: u32,
    pub signals: Vec<ThreatSignal>,
    pub verdict: Verdict,
}

impl Assessment {
    fn clear() -> Self {
        Self {
            points: 0,
            signals: Vec::new(),
            verdict: Verdict::Clear,
        }
    }

    /// Whether admission should reject the current request.
    pub fn should_reject(&self) -> bool {
        self.verdict == Verdict::Critical
    }
}

/// Location and time of the user's last observed request, kept in the
/// counter store for the travel-velocity heuristic.
#[derive(Debug, Serialize, Deserialize)]
struct LastSeen {
    geo: GeoPoint,
    at: DateTime<Utc>,
}

mod keys {
    use std::net::IpAddr;

    use crewdesk_core::{TenantId, UserId};

    pub fn failed_logins(tenant: TenantId, ip: IpAddr) -> String {
        format!("threat:{tenant}:failed_logins:{ip}")
    }

    pub fn known_ips(tenant: TenantId, user: UserId) -> String {
        format!("threat:{tenant}:known_ips:{user}")
    }

    pub fn last_seen(tenant: TenantId, user: UserId) -> String {
        format!("threat:{tenant}:last_seen:{user}")
    }

    // Reputation is shared across tenants; an IP hostile to one is hostile
    // to all.
    pub const BAD_REPUTATION: &str = "threat:reputation:bad_ips";

    pub fn throttle(tenant: TenantId, source: &str) -> String {
        format!("throttle:{tenant}:suspicious:{source}")
    }
}

/// Scores requests and quarantines hostile sources.
///
/// Threat detection is defense-in-depth, not the primary gate: when the
/// counter store is unreachable the scorer fails open with a clear verdict
/// and a warning, and authorization proper still runs.
pub struct ThreatScorer {
    counters: Arc<dyn CounterStore>,
    blocks: Arc<dyn BlockStore>,
    log: Arc<dyn SecurityLogStore>,
    audit: AuditSink,
    events: Arc<dyn SecurityEventPublisher>,
    throttle: NotificationThrottle,
    clock: Arc<dyn Clock>,
    config: ThreatConfig,
}

impl ThreatScorer {
    pub fn new(
        counters: Arc<dyn CounterStore>,
        blocks: Arc<dyn BlockStore>,
        log: Arc<dyn SecurityLogStore>,
        audit: AuditSink,
        events: Arc<dyn SecurityEventPublisher>,
        clock: Arc<dyn Clock>,
        config: ThreatConfig,
    ) -> Self {
        let throttle = NotificationThrottle::new(
            counters.clone(),
            Duration::from_secs(config.rate_limit_window_secs),
        );
        Self {
            counters,
            blocks,
            log,
            audit,
            events,
            throttle,
            clock,
            config,
        }
    }

    /// Score one request and carry out the consequences.
    ///
    /// Suspicious: one security log entry plus a rate-limited notification.
    /// Critical: additionally block the source IP and audit the block. The
    /// caller rejects the current request on a critical verdict.
    pub async fn assess(&self, ctx: &RequestContext) -> Assessment {
        let now = self.clock.now();

        let signals = match self.collect_signals(ctx, now).await {
            Ok(signals) => signals,
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    ip = %ctx.ip,
                    "threat signal collection failed; failing open"
                );
                return Assessment::clear();
            }
        };

        let points = score_signals(&signals, &self.config.weights);
        let verdict = Verdict::from_points(points, &self.config);

        if verdict >= Verdict::Suspicious {
            self.raise_alarm(ctx, points, &signals, now).await;
        }
        if verdict == Verdict::Critical {
            self.quarantine(ctx, points, &signals, now).await;
        }

        Assessment {
            points,
            signals,
            verdict,
        }
    }

    async fn collect_signals(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<ThreatSignal>, CounterStoreError> {
        let mut signals = Vec::new();

        let failures = self
            .counters
            .get(&keys::failed_logins(ctx.tenant_id, ctx.ip))
            .await?;
        if failures >= u64::from(self.config.failed_login_threshold) {
            signals.push(ThreatSignal::RepeatedLoginFailures {
                count: u32::try_from(failures).unwrap_or(u32::MAX),
            });
        }

        if let Some(user) = ctx.user {
            let known = self
                .counters
                .has_member(&keys::known_ips(ctx.tenant_id, user), &ctx.ip.to_string())
                .await?;
            if !known {
                signals.push(ThreatSignal::UnrecognizedIp);
            }

            if let Some(geo) = ctx.geo {
                if let Some(speed) = self.travel_speed(ctx.tenant_id, user, geo, now).await? {
                    if speed > self.config.impossible_travel_kmh {
                        signals.push(ThreatSignal::ImpossibleTravel {
                            speed_kmh: speed as u32,
                        });
                    }
                }
            }
        }

        let bad_reputation = self
            .counters
            .has_member(keys::BAD_REPUTATION, &ctx.ip.to_string())
            .await?;
        if bad_reputation {
            signals.push(ThreatSignal::BadIpReputation);
        }

        Ok(signals)
    }

    /// Implied km/h between the last seen location and this request. `None`
    /// when there is no usable previous observation.
    async fn travel_speed(
        &self,
        tenant: TenantId,
        user: UserId,
        geo: GeoPoint,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>, CounterStoreError> {
        let Some(raw) = self
            .counters
            .get_value(&keys::last_seen(tenant, user))
            .await?
        else {
            return Ok(None);
        };
        let last: LastSeen = match serde_json::from_str(&raw) {
            Ok(last) => last,
            Err(error) => {
                tracing::debug!(error = %error, "discarding unreadable last-seen payload");
                return Ok(None);
            }
        };

        let elapsed_secs = (now - last.at).num_seconds();
        if elapsed_secs < 0 {
            // Clock skew between writers; no velocity claim possible.
            return Ok(None);
        }
        let hours = (elapsed_secs.max(1)) as f64 / 3600.0;
        Ok(Some(last.geo.distance_km(&geo) / hours))
    }

    async fn raise_alarm(
        &self,
        ctx: &RequestContext,
        points: u32,
        signals: &[ThreatSignal],
        now: DateTime<Utc>,
    ) {
        let entry = SecurityLogEntry {
            id: SecurityLogId::new(),
            tenant_id: ctx.tenant_id,
            user_id: ctx.user,
            ip: ctx.ip,
            points,
            signals: signals.to_vec(),
            user_agent: ctx.user_agent.clone(),
            created_at: now,
        };
        if let Err(error) = self.log.append(entry).await {
            tracing::warn!(error = %error, ip = %ctx.ip, "security log append failed");
        }

        let source = ctx
            .user
            .map(|u| u.to_string())
            .unwrap_or_else(|| ctx.ip.to_string());
        let notify = match self.throttle.try_acquire(&keys::throttle(ctx.tenant_id, &source)).await {
            Ok(notify) => notify,
            Err(error) => {
                // Better to over-notify during an outage than to go silent.
                tracing::warn!(error = %error, "notification throttle unavailable");
                true
            }
        };
        if notify {
            self.events.publish(SecurityEvent::new(
                ctx.tenant_id,
                SecurityEventKind::SuspiciousActivity {
                    user: ctx.user,
                    ip: ctx.ip,
                    points,
                    signals: signal::labels(signals),
                },
                now,
            ));
        } else {
            tracing::debug!(ip = %ctx.ip, points, "suspicious activity notification suppressed");
        }
    }

    async fn quarantine(
        &self,
        ctx: &RequestContext,
        points: u32,
        signals: &[ThreatSignal],
        now: DateTime<Utc>,
    ) {
        let ttl = Duration::from_secs(self.config.ip_block_ttl_secs);
        let reason = format!("threat score {points}");

        match self.blocks.block(ctx.ip, ttl, &reason, now).await {
            Ok(entry) => {
                self.audit
                    .record(AuditDraft::ip_blocked(
                        ctx.tenant_id,
                        ctx.ip,
                        points,
                        self.config.ip_block_ttl_secs,
                        &signal::labels(signals),
                    ))
                    .await;
                self.events.publish(SecurityEvent::new(
                    ctx.tenant_id,
                    SecurityEventKind::IpBlocked {
                        ip: ctx.ip,
                        points,
                        ttl_secs: self.config.ip_block_ttl_secs,
                    },
                    now,
                ));
                tracing::warn!(ip = %ctx.ip, points, expires_at = %entry.expires_at, "source ip blocked");
            }
            Err(error) => {
                // The critical verdict still rejects this request even when
                // the block write is lost.
                tracing::warn!(error = %error, ip = %ctx.ip, "block write failed");
            }
        }
    }

    /// Count a failed authentication attempt against the source IP.
    /// Returns the count within the current window; 0 when the store is
    /// unreachable (fail open).
    pub async fn record_login_failure(&self, ctx: &RequestContext) -> u64 {
        let key = keys::failed_logins(ctx.tenant_id, ctx.ip);
        let ttl = Duration::from_secs(self.config.failed_login_window_secs);
        match self.counters.incr(&key, ttl).await {
            Ok(count) => {
                if count >= u64::from(self.config.failed_login_threshold) {
                    tracing::warn!(ip = %ctx.ip, count, "repeated login failures");
                }
                count
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed-login counter unavailable");
                0
            }
        }
    }

    /// Clear the failure counter for the source and mark it recognised.
    pub async fn record_login_success(&self, ctx: &RequestContext) {
        if let Err(error) = self
            .counters
            .remove(&keys::failed_logins(ctx.tenant_id, ctx.ip))
            .await
        {
            tracing::warn!(error = %error, "failed-login counter unavailable");
        }
        self.observe(ctx).await;
    }

    /// Record that the authenticated user is legitimately at this IP and
    /// location. Call after successful authentication; the next request from
    /// the same place then scores clean.
    pub async fn observe(&self, ctx: &RequestContext) {
        let Some(user) = ctx.user else { return };
        let ttl = Duration::from_secs(self.config.known_ip_ttl_secs);

        if let Err(error) = self
            .counters
            .add_member(
                &keys::known_ips(ctx.tenant_id, user),
                &ctx.ip.to_string(),
                ttl,
            )
            .await
        {
            tracing::warn!(error = %error, "known-ip set unavailable");
        }

        if let Some(geo) = ctx.geo {
            let last = LastSeen {
                geo,
                at: self.clock.now(),
            };
            match serde_json::to_string(&last) {
                Ok(raw) => {
                    if let Err(error) = self
                        .counters
                        .put_value(&keys::last_seen(ctx.tenant_id, user), &raw, ttl)
                        .await
                    {
                        tracing::warn!(error = %error, "last-seen store unavailable");
                    }
                }
                Err(error) => tracing::debug!(error = %error, "last-seen serialization failed"),
            }
        }
    }

    /// Put an IP on the shared bad-reputation list (feed ingestion, manual
    /// operator action).
    pub async fn mark_bad_reputation(&self, ip: IpAddr) -> Result<(), CounterStoreError> {
        self.counters
            .add_member(
                keys::BAD_REPUTATION,
                &ip.to_string(),
                Duration::from_secs(BAD_REPUTATION_TTL_SECS),
            )
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
