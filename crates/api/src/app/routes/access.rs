use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use crewdesk_auth::{AccessScope, Permission, evaluate};

use crate::app::routes::common;
use crate::app::services::AppServices;
use crate::app::dto;

pub fn router() -> Router {
    Router::new().route("/check", post(check))
}

/// Self-service permission probe. The response is the bare outcome; the
/// basis and any denial detail stay in the audit trail.
pub async fn check(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
    Json(body): Json<dto::AccessCheckRequest>,
) -> axum::response::Response {
    let graph = match common::load_graph(&services, tenant.tenant_id()).await {
        Ok(g) => g,
        Err(resp) => return resp,
    };

    let permission = Permission::new(body.permission);
    let scope = body.department_id.map(AccessScope::department);

    let decision = evaluate(
        &graph,
        principal.principal(),
        &permission,
        scope,
        services.clock.now(),
    );
    let allowed = decision.is_allowed();
    if let Some(draft) = decision.audit {
        services.audit.record(draft).await;
    }

    (StatusCode::OK, Json(dto::AccessCheckResponse { allowed })).into_response()
}
