//! HTTP surface of the service
//!
//! - `POST /data` ingestion
//! - `GET /`, `GET /health` liveness
//! - `GET /stats` table and ingestion counters
//! - `/clients`, `/tags` client listing, history, features and labels
//! - `GET /export`, `GET /clients/:client_id/export` full per-client history

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

pub mod routes;
pub mod state;

use state::AppState;

/// Create the main application router. Ingestion sits outside the request
/// timeout; the gateway bounds each store call itself.
pub fn create_app(state: AppState) -> Router {
    let timeout_duration = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .merge(routes::create_router())
        .layer(TimeoutLayer::new(timeout_duration))
        .merge(routes::ingest_router())
        .layer(TraceLayer::new_for_http())
        // Mobile loggers post from arbitrary origins
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "shakestream",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// Serve until `shutdown` resolves.
pub async fn start_server(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_app(state);

    info!("Starting shakestream server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}
