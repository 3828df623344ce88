//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{Currency, CustomerId, Money, OrderId};
use domain::OrderItem;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::dto::OrderDto;
use crate::error::ApiError;

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: Option<Uuid>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Three-letter code; defaults to TRY.
    pub currency: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// POST /orders — create an order, optionally under an `Idempotency-Key`.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDto>), ApiError> {
    let customer_id = req
        .customer_id
        .map(CustomerId::from_uuid)
        .unwrap_or_default();

    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut items = Vec::with_capacity(req.items.len());
    for item in req.items {
        let currency = match item.currency {
            Some(code) => Currency::parse(&code)
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
            None => Currency::TRY,
        };
        items.push(OrderItem::new(
            item.product_id,
            item.quantity,
            Money::new(item.unit_price, currency),
        ));
    }

    let (dto, created) = state.orders.create(customer_id, items, idempotency_key).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(dto)))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDto>, ApiError> {
    let dto = state.orders.get(OrderId::from_uuid(id)).await?;
    Ok(Json(dto))
}

/// PUT /orders/{id}/cancel
#[tracing::instrument(skip(state, req))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<OrderDto>, ApiError> {
    let reason = req.reason.unwrap_or_else(|| "customer_request".to_string());
    let dto = state.orders.cancel(OrderId::from_uuid(id), reason).await?;
    Ok(Json(dto))
}

/// PUT /orders/{id}/ship
#[tracing::instrument(skip(state))]
pub async fn ship(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDto>, ApiError> {
    let dto = state.orders.ship(OrderId::from_uuid(id)).await?;
    Ok(Json(dto))
}

/// PUT /orders/{id}/deliver
#[tracing::instrument(skip(state))]
pub async fn deliver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDto>, ApiError> {
    let dto = state.orders.deliver(OrderId::from_uuid(id)).await?;
    Ok(Json(dto))
}

/// POST /orders/{id}/retry — admin re-publish of `order.created`.
#[tracing::instrument(skip(state))]
pub async fn retry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDto>, ApiError> {
    let dto = state.orders.retry_publish(OrderId::from_uuid(id)).await?;
    Ok(Json(dto))
}
