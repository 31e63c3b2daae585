use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};

use crewdesk_auth::{JwtClaims, Permission, well_known};
use crewdesk_core::GrantId;
use crewdesk_emergency::{EmergencyError, IssueCommand};
use crewdesk_threat::RequestContext;

use crate::app::routes::common;
use crate::app::services::{self, AppServices};
use crate::app::{dto, errors};
use crate::context::ClientIp;

pub fn router() -> Router {
    Router::new()
        .route("/break-glass", post(issue))
        .route("/:id/revoke", post(revoke))
        .route("/:id/usage", get(usage))
}

pub async fn issue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::IssueBreakGlassRequest>,
) -> axum::response::Response {
    let graph = match common::load_graph(&services, tenant.tenant_id()).await {
        Ok(g) => g,
        Err(resp) => return resp,
    };

    let cmd = IssueCommand {
        target_user: body.user_id,
        permissions: body.permissions.into_iter().map(Permission::new).collect(),
        reason: body.reason,
        duration_minutes: body.duration_minutes,
    };

    // Issuer authorization happens inside the manager, against the graph.
    match services.emergency.issue(cmd, &graph, principal.principal()).await {
        Ok(issued) => (
            StatusCode::OK,
            Json(dto::IssueBreakGlassResponse {
                emergency_access_id: issued.grant.id,
                token: issued.token.as_str().to_string(),
                expires_at: issued.grant.expires_at,
            }),
        )
            .into_response(),
        Err(err) => errors::emergency_error_to_response(err),
    }
}

pub async fn revoke(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let grant_id: GrantId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid grant id");
        }
    };

    let graph = match common::load_graph(&services, tenant.tenant_id()).await {
        Ok(g) => g,
        Err(resp) => return resp,
    };

    match services
        .emergency
        .revoke(tenant.tenant_id(), grant_id, &graph, principal.principal())
        .await
    {
        Ok(grant) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": grant.id.to_string(),
                "revoked_at": grant.revoked_at,
            })),
        )
            .into_response(),
        Err(err) => errors::emergency_error_to_response(err),
    }
}

pub async fn usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let grant_id: GrantId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid grant id");
        }
    };

    let graph = match common::load_graph(&services, tenant.tenant_id()).await {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    if let Err(resp) = common::require(
        &services,
        &graph,
        principal.principal(),
        &well_known::EMERGENCY_MANAGE,
    )
    .await
    {
        return resp;
    }

    match services
        .emergency
        .usage_events(tenant.tenant_id(), grant_id)
        .await
    {
        Ok(records) => {
            (StatusCode::OK, Json(serde_json::json!({ "items": records }))).into_response()
        }
        Err(err) => errors::emergency_error_to_response(err),
    }
}

/// Token redemption. No authentication: the operator holding the token may
/// have no working session. Admission has already run.
pub async fn redeem(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(client_ip): Extension<ClientIp>,
    Json(body): Json<dto::RedeemRequest>,
) -> axum::response::Response {
    let ip = client_ip.0;

    match services.emergency.redeem(&body.token, Some(ip)).await {
        Ok(grant) => {
            // A good token counts as a successful login for the edge
            // counters, and seeds the user's per-tenant baselines.
            services
                .scorer
                .record_login_success(&RequestContext::new(services::edge_tenant(), ip))
                .await;
            services
                .scorer
                .observe(&RequestContext::new(grant.tenant_id, ip).for_user(grant.target_user))
                .await;

            let claims = JwtClaims {
                sub: grant.target_user,
                tenant_id: grant.tenant_id,
                issued_at: services.clock.now(),
                expires_at: grant.expires_at,
            };
            let session_token = match jsonwebtoken::encode(
                &Header::new(Algorithm::HS256),
                &claims,
                &EncodingKey::from_secret(services.config.jwt_secret.as_bytes()),
            ) {
                Ok(token) => token,
                Err(error) => {
                    tracing::error!(%error, "session token encoding failed");
                    return errors::json_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        "internal error",
                    );
                }
            };

            (
                StatusCode::OK,
                Json(dto::RedeemResponse {
                    success: true,
                    user_id: grant.target_user,
                    permissions: grant.permission_names(),
                    expires_at: grant.expires_at,
                    session_token,
                }),
            )
                .into_response()
        }
        Err(err @ EmergencyError::InvalidOrExpiredToken) => {
            let failures = services
                .scorer
                .record_login_failure(&RequestContext::new(services::edge_tenant(), ip))
                .await;
            tracing::warn!(%ip, failures, "break-glass redemption failed");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "success": false,
                    "message": err.to_string(),
                })),
            )
                .into_response()
        }
        Err(err) => errors::emergency_error_to_response(err),
    }
}
