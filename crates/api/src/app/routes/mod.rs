use axum::{Router, routing::get};

pub mod access;
pub mod common;
pub mod emergency;
pub mod security;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/access", access::router())
        .nest("/admin/emergency", emergency::router())
        .nest("/admin/security", security::router())
}
