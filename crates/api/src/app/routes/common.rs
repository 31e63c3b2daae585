use crewdesk_auth::{Permission, ResolvedPrincipal, RoleGraph, evaluate};
use crewdesk_core::TenantId;

use crate::app::errors;
use crate::app::services::AppServices;

/// Load the tenant's role graph, mapping store trouble to a generic 503.
pub async fn load_graph(
    services: &AppServices,
    tenant_id: TenantId,
) -> Result<RoleGraph, axum::response::Response> {
    services.directory.role_graph(tenant_id).await.map_err(|error| {
        tracing::error!(%error, "role graph load failed");
        errors::unavailable()
    })
}

/// Gate a handler on one permission, recording the decision's audit trail.
/// Denials come back as the uniform 403.
pub async fn require(
    services: &AppServices,
    graph: &RoleGraph,
    principal: &ResolvedPrincipal,
    permission: &Permission,
) -> Result<(), axum::response::Response> {
    let decision = evaluate(graph, principal, permission, None, services.clock.now());
    let allowed = decision.is_allowed();
    if let Some(draft) = decision.audit {
        services.audit.record(draft).await;
    }
    if allowed {
        Ok(())
    } else {
        Err(errors::forbidden())
    }
}
