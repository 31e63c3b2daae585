//! HTTP API application wiring (Axum router + service wiring).
//!
//! Layout:
//! - `services.rs`: store wiring (in-memory or Postgres/Redis) and shared state
//! - `routes/`: HTTP routes + handlers (one file per surface area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses
//! - `config.rs`: env-loaded runtime configuration

use std::sync::Arc;

use axum::{Extension, Router, routing::{get, post}};
use tower::ServiceBuilder;

use crate::middleware;

pub mod config;
pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
///
/// Layering, outermost first: admission gate, then shared services, then the
/// per-route stack. Authentication wraps only the protected subtree, so
/// `/health` and `/break-glass` stay reachable without a token while still
/// passing admission.
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        services.clone(),
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/break-glass", post(routes::emergency::redeem))
        .merge(protected)
        .layer(Extension(services.clone()))
        .layer(axum::middleware::from_fn_with_state(
            services,
            middleware::admission_middleware,
        ))
        .layer(ServiceBuilder::new())
}
