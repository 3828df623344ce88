//! Inventory admin endpoints.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockResponse {
    pub product_id: ProductId,
    pub available: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStockRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSetRequest {
    pub levels: HashMap<String, u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashSaleRequest {
    pub products: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub products: Vec<String>,
}

/// GET /inventory/{product}
pub async fn get_stock(
    State(state): State<Arc<AppState>>,
    Path(product): Path<String>,
) -> Json<StockResponse> {
    let product_id = ProductId::new(product);
    let available = state.inventory.get_stock(&product_id);
    Json(StockResponse {
        product_id,
        available,
    })
}

/// PUT /inventory/{product}
pub async fn set_stock(
    State(state): State<Arc<AppState>>,
    Path(product): Path<String>,
    Json(req): Json<SetStockRequest>,
) -> Json<StockResponse> {
    let product_id = ProductId::new(product);
    state.inventory.set_stock(product_id.clone(), req.quantity);
    tracing::info!(%product_id, quantity = req.quantity, "stock level set");
    Json(StockResponse {
        product_id,
        available: req.quantity,
    })
}

/// POST /inventory/bulk
pub async fn bulk_set(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkSetRequest>,
) -> StatusCode {
    let levels: HashMap<ProductId, u32> = req
        .levels
        .into_iter()
        .map(|(product, quantity)| (ProductId::new(product), quantity))
        .collect();
    tracing::info!(products = levels.len(), "bulk stock update");
    state.inventory.bulk_set(levels);
    StatusCode::NO_CONTENT
}

/// PUT /inventory/flash-sale — atomic replacement of the flash-sale set.
pub async fn set_flash_sale(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FlashSaleRequest>,
) -> StatusCode {
    let products: HashSet<ProductId> = req.products.into_iter().map(ProductId::new).collect();
    tracing::info!(products = products.len(), "flash-sale set replaced");
    state.inventory.set_flash_sale_products(products);
    StatusCode::NO_CONTENT
}

/// POST /inventory/availability
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<HashMap<String, u32>>, ApiError> {
    let products: Vec<ProductId> = req.products.into_iter().map(ProductId::new).collect();
    let availability = state
        .inventory
        .check_availability(&products)
        .into_iter()
        .map(|(product, quantity)| (product.to_string(), quantity))
        .collect();
    Ok(Json(availability))
}
