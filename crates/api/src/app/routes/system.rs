use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(tenant): Extension<crate::context::TenantContext>,
    Extension(principal): Extension<crate::context::PrincipalContext>,
) -> impl IntoResponse {
    let resolved = principal.principal();
    Json(serde_json::json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "user_id": resolved.user_id.to_string(),
        "department_id": resolved.department_id.map(|d| d.to_string()),
        "display_name": principal.display_name(),
        "active_grants": resolved.active_grants.len(),
    }))
}
