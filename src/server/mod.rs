mod handlers;
mod state;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::ResolverConfig;

pub use handlers::ApiError;
pub use state::AppState;

pub fn build_router(config: ResolverConfig) -> Router {
    let state = Arc::new(AppState::new(config));

    Router::new()
        .route("/api/resolve", get(handlers::resolve))
        .route("/api/soil", get(handlers::soil))
        .route("/api/soil-types", get(handlers::soil_types))
        .route("/api/places", get(handlers::place_list))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(config: ResolverConfig, host: &str, port: u16) -> std::io::Result<()> {
    tracing::info!(
        forward = ?config.build_chain().forward_names(),
        reverse = ?config.build_chain().reverse_names(),
        "provider chains"
    );
    let app = build_router(config);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Terroir server listening on http://{}", addr);
    axum::serve(listener, app).await
}
