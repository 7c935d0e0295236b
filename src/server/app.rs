//! Router assembly: mounts V1 (`/v1`), V2 (`/v2`), and `/health`, and layers
//! the identity/quota gate in front of everything but health.
//!
//! Layers are applied in reverse order — the last `.layer()`/`.route_layer()`
//! call runs first.

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::middleware;
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::domains::auth::{auth_middleware, quota_middleware, QuotaClass};
use crate::domains::{hierarchy, tasks};
use crate::server::routes::health_handler;
use crate::server::state::AppState;

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);

    let standard = tasks::routes::router()
        .merge(hierarchy::routes::router())
        .route_layer(middleware::from_fn(quota_middleware(None)))
        .route_layer(middleware::from_fn(auth_middleware));

    // Batch-create always meters at the batch quota class regardless of
    // principal tier, so it is layered independently.
    let batch = tasks::routes::batch_router()
        .route_layer(middleware::from_fn(quota_middleware(Some(QuotaClass::Batch))))
        .route_layer(middleware::from_fn(auth_middleware));

    Router::new()
        .route("/health", axum::routing::get(health_handler))
        .merge(standard)
        .merge(batch)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
