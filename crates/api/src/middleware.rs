use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crewdesk_auth::{JwtClaims, ResolvedPrincipal};
use crewdesk_threat::RequestContext;

use crate::app::{errors, services};
use crate::app::services::AppServices;
use crate::context::{ClientIp, PrincipalContext, TenantContext};

/// Pre-auth admission gate, applied to every route including `/health`.
///
/// Resolves the client address, rejects blocked sources, and runs one threat
/// assessment under the edge tenant. A critical verdict rejects the request;
/// anything milder is logged by the scorer and admitted.
pub async fn admission_middleware(
    State(services): State<Arc<AppServices>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = client_ip(req.headers(), addr);
    req.extensions_mut().insert(ClientIp(ip));

    match services.blocks.is_blocked(ip, services.clock.now()).await {
        Ok(true) => return errors::restricted(),
        Ok(false) => {}
        Err(error) => {
            // Admission fails open; authorization proper still runs.
            tracing::warn!(%error, %ip, "block lookup failed, admitting");
        }
    }

    let mut ctx = RequestContext::new(services::edge_tenant(), ip);
    if let Some(ua) = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    {
        ctx = ctx.with_user_agent(ua);
    }

    let assessment = services.scorer.assess(&ctx).await;
    if assessment.should_reject() {
        return errors::restricted();
    }

    next.run(req).await
}

pub async fn auth_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    let claims = decode_claims(token, services.config.jwt_secret.as_bytes())
        .map_err(|_e| StatusCode::UNAUTHORIZED)?;
    claims
        .validate(services.clock.now())
        .map_err(|_e| StatusCode::UNAUTHORIZED)?;

    let user = services
        .directory
        .user(claims.tenant_id, claims.sub)
        .await
        .map_err(|error| {
            tracing::error!(%error, "directory user lookup failed");
            StatusCode::SERVICE_UNAVAILABLE
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let assignments = services
        .directory
        .assignments(claims.tenant_id, claims.sub)
        .await
        .map_err(|error| {
            tracing::error!(%error, "role assignment lookup failed");
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    let grants = services
        .emergency
        .active_grants_for(claims.tenant_id, claims.sub)
        .await
        .map_err(|error| {
            tracing::error!(%error, "active grant lookup failed");
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    let principal = ResolvedPrincipal::new(claims.sub, claims.tenant_id, user.department_id)
        .with_assignments(assignments)
        .with_active_grants(grants);

    req.extensions_mut()
        .insert(TenantContext::new(claims.tenant_id));
    req.extensions_mut()
        .insert(PrincipalContext::new(principal, user.display_name));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

fn decode_claims(token: &str, secret: &[u8]) -> Result<JwtClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry lives in `expires_at` and is checked against the injected clock.
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<JwtClaims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(data.claims)
}

fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_else(|| addr.ip())
}
