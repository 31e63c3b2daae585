use std::net::IpAddr;

use crewdesk_auth::ResolvedPrincipal;
use crewdesk_core::TenantId;

/// Tenant context for a request.
///
/// This is immutable and must be present for all authenticated routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Principal context for a request: the fully resolved identity the
/// evaluator works with, plus the directory display name for echo routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: ResolvedPrincipal,
    display_name: String,
}

impl PrincipalContext {
    pub fn new(principal: ResolvedPrincipal, display_name: String) -> Self {
        Self {
            principal,
            display_name,
        }
    }

    pub fn principal(&self) -> &ResolvedPrincipal {
        &self.principal
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Client address as resolved by the admission middleware: first
/// `X-Forwarded-For` hop when present, socket peer address otherwise.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);
