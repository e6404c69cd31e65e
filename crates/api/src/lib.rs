//! HTTP API server for the marketplace order engine.
//!
//! Exposes checkout, order queries, vendor preparation, courier delivery and
//! the payment gateway webhook as REST endpoints, with structured logging
//! (tracing) and Prometheus metrics. Caller identity is taken from headers
//! set by the upstream gateway, see [`auth`].

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod seed;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/vendor/orders", get(routes::vendor::list::<S>))
        .route(
            "/vendor/orders/{id}/prepare",
            post(routes::vendor::prepare::<S>),
        )
        .route("/vendor/orders/{id}/ready", post(routes::vendor::ready::<S>))
        .route("/courier/orders", get(routes::courier::list::<S>))
        .route(
            "/courier/orders/{id}/claim",
            post(routes::courier::claim::<S>),
        )
        .route(
            "/courier/orders/{id}/complete",
            post(routes::courier::complete::<S>),
        )
        .route("/payments/webhook", post(routes::webhooks::receive::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
