//! HTTP server implementation using Axum.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use notiflow_core::config::ServerConfig;
use notiflow_scheduler::NotificationService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NotificationService>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self {
            service,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/", get(super::routes::root))
        .route("/health", get(super::routes::health_check))
        .route(
            "/schedule-notification",
            post(super::routes::schedule_notification),
        )
        .route("/notifications", get(super::routes::list_notifications))
        .route("/notifications/{id}", get(super::routes::get_notification))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind and serve until `shutdown` resolves.
pub async fn start<F>(config: &ServerConfig, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Gateway listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("Gateway stopped");
    Ok(())
}
