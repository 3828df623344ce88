//! HTTP surface for the order saga coordinator.
//!
//! Exposes order commands, inventory administration, health and
//! Prometheus metrics, with structured logging on every handler.

pub mod config;
pub mod dto;
pub mod error;
pub mod routes;
mod service;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use bus::EventBus;
use inventory::InventoryEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{IdempotencyStore, OrderStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use service::OrderService;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orders: OrderService,
    pub inventory: Arc<InventoryEngine>,
}

impl AppState {
    /// Builds the state over the given backends.
    pub fn new(
        orders: Arc<dyn OrderStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        bus: Arc<dyn EventBus>,
        inventory: Arc<InventoryEngine>,
    ) -> Self {
        Self {
            orders: OrderService::new(orders, idempotency, bus),
            inventory,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/cancel", put(routes::orders::cancel))
        .route("/orders/{id}/ship", put(routes::orders::ship))
        .route("/orders/{id}/deliver", put(routes::orders::deliver))
        .route("/orders/{id}/retry", post(routes::orders::retry))
        .route("/inventory/bulk", post(routes::inventory::bulk_set))
        .route("/inventory/flash-sale", put(routes::inventory::set_flash_sale))
        .route("/inventory/availability", post(routes::inventory::availability))
        .route(
            "/inventory/{product}",
            get(routes::inventory::get_stock).put(routes::inventory::set_stock),
        )
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
