//! Liveness endpoint.

use axum::Json;

/// GET /health
pub async fn check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
