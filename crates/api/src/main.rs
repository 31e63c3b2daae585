use std::net::SocketAddr;
use std::sync::Arc;

use crewdesk_api::app::{build_app, config::AppConfig, services::build_services};

#[tokio::main]
async fn main() {
    crewdesk_observability::init();

    let config = AppConfig::from_env();
    let bind_addr = config.bind_addr.clone();

    let services = Arc::new(build_services(config).await);
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind listen address");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    // Connect info feeds the admission middleware's fallback client address.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
