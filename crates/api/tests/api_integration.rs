//! Integration tests for the HTTP surface.
//!
//! Consumers are not started here; these tests cover the edge contract
//! (status codes, idempotency header, admin endpoints) over in-memory
//! backends.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bus::InMemoryEventBus;
use inventory::InventoryEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryIdempotencyStore, InMemoryOrderStore};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    bus: InMemoryEventBus,
    inventory: Arc<InventoryEngine>,
}

fn setup() -> TestApp {
    let bus = InMemoryEventBus::new();
    let inventory = Arc::new(InventoryEngine::new());
    let state = Arc::new(api::AppState::new(
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(InMemoryIdempotencyStore::new()),
        Arc::new(bus.clone()),
        inventory.clone(),
    ));
    let app = api::create_app(state, get_metrics_handle());
    TestApp {
        app,
        bus,
        inventory,
    }
}

fn order_body() -> String {
    serde_json::json!({
        "items": [
            { "productId": "P1", "quantity": 2, "unitPrice": 60 }
        ]
    })
    .to_string()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check() {
    let TestApp { app, .. } = setup();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn create_order_returns_created_dto() {
    let TestApp { app, bus, .. } = setup();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(order_body()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["status"], "Pending");
    assert_eq!(json["totalAmount"]["currency"], "TRY");
    assert!(json["id"].as_str().is_some());
    assert_eq!(bus.published_count(bus::events::ORDER_CREATED), 1);
}

#[tokio::test]
async fn idempotency_key_replays_the_same_order() {
    let TestApp { app, bus, .. } = setup();

    let request = || {
        Request::builder()
            .method("POST")
            .uri("/orders")
            .header("content-type", "application/json")
            .header("Idempotency-Key", "K-1")
            .body(Body::from(order_body()))
            .unwrap()
    };

    let first = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_json = json_body(first).await;

    let second = app.oneshot(request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_json = json_body(second).await;

    assert_eq!(first_json["id"], second_json["id"]);
    assert_eq!(bus.published_count(bus::events::ORDER_CREATED), 1);
}

#[tokio::test]
async fn invalid_order_is_rejected_with_400() {
    let TestApp { app, .. } = setup();

    // Total below the 100 minimum.
    let body = serde_json::json!({
        "items": [{ "productId": "P1", "quantity": 1, "unitPrice": 10 }]
    })
    .to_string();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancelling_twice_is_a_conflict() {
    let TestApp { app, .. } = setup();

    let created = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(order_body()))
                .unwrap(),
        )
        .await
        .unwrap();
    let id = json_body(created).await["id"].as_str().unwrap().to_string();

    let cancel = |reason: &str| {
        Request::builder()
            .method("PUT")
            .uri(format!("/orders/{id}/cancel"))
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "reason": reason }).to_string(),
            ))
            .unwrap()
    };

    let first = app.clone().oneshot(cancel("changed my mind")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let json = json_body(first).await;
    assert_eq!(json["status"], "Cancelled");
    assert_eq!(json["cancelReason"], "changed my mind");

    let second = app.oneshot(cancel("again")).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn shipping_a_pending_order_is_a_conflict() {
    let TestApp { app, .. } = setup();

    let created = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(order_body()))
                .unwrap(),
        )
        .await
        .unwrap();
    let id = json_body(created).await["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/orders/{id}/ship"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_order_is_404() {
    let TestApp { app, .. } = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/orders/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inventory_set_and_get_stock() {
    let TestApp { app, inventory, .. } = setup();

    let put = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/inventory/P1")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::json!({ "quantity": 25 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::OK);

    let get = app
        .oneshot(
            Request::builder()
                .uri("/inventory/P1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    let json = json_body(get).await;
    assert_eq!(json["available"], 25);
    assert_eq!(inventory.get_stock(&common::ProductId::new("P1")), 25);
}

#[tokio::test]
async fn inventory_availability_reports_requested_products() {
    let TestApp { app, inventory, .. } = setup();
    inventory.set_stock(common::ProductId::new("P1"), 7);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/inventory/availability")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "products": ["P1", "P2"] }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["P1"], 7);
    assert_eq!(json["P2"], 0);
}

#[tokio::test]
async fn flash_sale_set_replacement_returns_no_content() {
    let TestApp { app, .. } = setup();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/inventory/flash-sale")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "products": ["HOT-1"] }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
