use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{SnapshotError, SnapshotResult};
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                handlers::metrics_auth_middleware,
            )),
        )
        .nest("/api/v1/assignments", assignment_routes())
        .nest("/api/v1/topics", topic_routes())
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn assignment_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/{id}/snapshots",
            get(handlers::snapshots::list_snapshots)
                .delete(handlers::snapshots::invalidate_snapshots),
        )
        .route(
            "/{id}/snapshots/regenerate",
            post(handlers::snapshots::regenerate_snapshots),
        )
        .route(
            "/{id}/snapshots/{variant}",
            get(handlers::snapshots::get_snapshot),
        )
        .route(
            "/{id}/snapshots/{variant}/export",
            post(handlers::snapshots::export_snapshot),
        )
        .route("/{id}/exports", post(handlers::snapshots::export_all_variants))
        .route("/{id}/pool-report", get(handlers::pool::get_pool_report))
}

fn topic_routes() -> Router<Arc<AppState>> {
    Router::new().route("/{id}/pool-stats", get(handlers::pool::get_pool_stats))
}
