//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bus::BusError;
use domain::OrderError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
///
/// Guard violations (illegal transitions, cancellation window,
/// optimistic conflicts) surface as `409 Conflict`; validation failures
/// as `400 Bad Request`.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Request conflicts with current resource state.
    Conflict(String),
    /// Domain rule error.
    Domain(OrderError),
    /// Storage error.
    Store(StoreError),
    /// Event bus error.
    Bus(BusError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Domain(err) => {
                let status = if err.is_validation() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::CONFLICT
                };
                (status, err.to_string())
            }
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Bus(err) => {
                tracing::error!(error = %err, "event bus failure");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::Conflict { .. } => (StatusCode::CONFLICT, err.to_string()),
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        _ => {
            tracing::error!(error = %err, "storage failure");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<BusError> for ApiError {
    fn from(err: BusError) -> Self {
        ApiError::Bus(err)
    }
}
