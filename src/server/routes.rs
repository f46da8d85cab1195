use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers::{backup, health, instances, metrics, search, vectors};
use super::middleware;
use super::AppState;

/// Builds the axum router with all routes, middleware, and shared state.
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let body_limit = state.config.server.max_request_body_mb * 1024 * 1024;

    Router::new()
        .route("/healthz", get(health::health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .route(
            "/v1/instances",
            get(instances::list_instances).post(instances::create_instance),
        )
        .route(
            "/v1/instances/:name",
            get(instances::get_instance).delete(instances::delete_instance),
        )
        .route("/v1/instances/:name/build", post(vectors::build_instance))
        .route(
            "/v1/instances/:name/vectors",
            post(vectors::insert_vectors)
                .put(vectors::update_vectors)
                .delete(vectors::remove_vectors),
        )
        .route("/v1/instances/:name/search", post(search::search_instance))
        .route("/v1/instances/:name/backup", post(backup::backup_instance))
        .layer(axum::middleware::from_fn(middleware::http_metrics))
        .layer(TimeoutLayer::new(timeout))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(state)
}
