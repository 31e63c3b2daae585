use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Duration;

use crewdesk_auth::well_known;
use crewdesk_threat::{SecurityLogEntry, Verdict};

use crate::app::routes::common;
use crate::app::services::{self, AppServices};
use crate::app::errors;

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/stream", get(stream))
}

/// Security dashboard snapshot: threat counts over the last 24 hours,
/// currently blocked sources, and the effective configuration.
pub async fn metrics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
) -> axum::response::Response {
    let graph = match common::load_graph(&services, tenant.tenant_id()).await {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    if let Err(resp) = common::require(
        &services,
        &graph,
        principal.principal(),
        &well_known::SECURITY_VIEW_METRICS,
    )
    .await
    {
        return resp;
    }

    let now = services.clock.now();
    let since = now - Duration::hours(24);

    let mut entries = match services.security_log.recent(tenant.tenant_id(), since).await {
        Ok(v) => v,
        Err(error) => {
            tracing::error!(%error, "security log read failed");
            return errors::unavailable();
        }
    };
    // Pre-auth traffic is logged under the edge tenant; fold it in so the
    // dashboard sees redemption abuse too.
    match services.security_log.recent(services::edge_tenant(), since).await {
        Ok(mut edge) => entries.append(&mut edge),
        Err(error) => {
            tracing::error!(%error, "security log read failed");
            return errors::unavailable();
        }
    }

    let (suspicious, critical) = verdict_counts(&entries, &services);

    let blocked = match services.blocks.active(now).await {
        Ok(v) => v,
        Err(error) => {
            tracing::error!(%error, "block store read failed");
            return errors::unavailable();
        }
    };
    let blocked_ips = blocked
        .iter()
        .map(|entry| {
            serde_json::json!({
                "ip": entry.ip.to_string(),
                "reason": entry.reason,
                "created_at": entry.created_at,
                "expires_at": entry.expires_at,
            })
        })
        .collect::<Vec<_>>();

    let config = &services.config;
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "threats_24h": {
                "total": entries.len(),
                "suspicious": suspicious,
                "critical": critical,
            },
            "blocked_ips": blocked_ips,
            "config": {
                "failed_login_threshold": config.threat.failed_login_threshold,
                "suspicious_activity_threshold": config.threat.suspicious_threshold,
                "critical_threat_threshold": config.threat.critical_threshold,
                "ip_block_ttl_secs": config.threat.ip_block_ttl_secs,
                "notification_rate_limit_window_secs": config.threat.rate_limit_window_secs,
                "audit_retention_days": config.audit_retention_days,
                "two_factor_confirmation_ttl_secs": config.two_factor_confirmation_ttl_secs,
            },
            "health": "ok",
        })),
    )
        .into_response()
}

fn verdict_counts(entries: &[SecurityLogEntry], services: &AppServices) -> (usize, usize) {
    let mut suspicious = 0;
    let mut critical = 0;
    for entry in entries {
        match Verdict::from_points(entry.points, &services.config.threat) {
            Verdict::Critical => critical += 1,
            Verdict::Suspicious => suspicious += 1,
            Verdict::Clear => {}
        }
    }
    (suspicious, critical)
}

/// Live tenant-filtered feed of security events.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
) -> axum::response::Response {
    let graph = match common::load_graph(&services, tenant.tenant_id()).await {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    if let Err(resp) = common::require(
        &services,
        &graph,
        principal.principal(),
        &well_known::SECURITY_VIEW_METRICS,
    )
    .await
    {
        return resp;
    }

    services::tenant_sse_stream(services, tenant.tenant_id()).into_response()
}
