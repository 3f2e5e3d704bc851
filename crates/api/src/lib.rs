//! HTTP API server for the bookstore checkout backend.
//!
//! Provides REST endpoints for carts, checkout, payment confirmation and
//! order history, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use domain::Notifier;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, CheckoutStore};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CheckoutStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/cart",
            get(routes::cart::get::<S>).delete(routes::cart::clear::<S>),
        )
        .route(
            "/cart/items",
            post(routes::cart::add_item::<S>).put(routes::cart::update_item::<S>),
        )
        .route("/cart/items/{book_id}", delete(routes::cart::remove_item::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/all", get(routes::orders::list_all::<S>))
        .route("/orders/checkout", post(routes::orders::checkout::<S>))
        .route("/orders/payment", post(routes::orders::confirm_payment::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
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

/// Creates the application state over `store`, publishing notifications to `notifier`.
pub fn create_state<S: CheckoutStore>(store: S, notifier: Arc<dyn Notifier>) -> Arc<AppState<S>> {
    Arc::new(AppState::new(store, notifier))
}
