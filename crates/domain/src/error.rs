//! Domain rule errors.

use common::ProductId;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::status::OrderStatus;

/// Errors raised by the order aggregate.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order must contain between 1 and 20 items.
    #[error("order must contain between 1 and 20 items, got {count}")]
    ItemCountOutOfRange { count: usize },

    /// Item quantity must be positive.
    #[error("quantity must be positive for product {product_id}")]
    InvalidQuantity { product_id: ProductId },

    /// Item unit price must be positive.
    #[error("unit price must be positive for product {product_id}")]
    InvalidPrice { product_id: ProductId },

    /// All items of an order must share a single currency.
    #[error("order items must share a single currency")]
    MixedCurrencies,

    /// Order total outside the accepted range.
    #[error("order total {total} is outside the allowed range 100..=50000")]
    TotalOutOfRange { total: Decimal },

    /// Cancellation reason is limited to 200 characters.
    #[error("cancel reason exceeds 200 characters")]
    CancelReasonTooLong,

    /// The requested transition is not legal from the current status.
    #[error("cannot {action} a {status} order")]
    IllegalTransition {
        status: OrderStatus,
        action: &'static str,
    },

    /// Orders may only be cancelled within two hours of creation.
    #[error("cancellation window exceeded")]
    CancellationWindowExceeded,
}

impl OrderError {
    /// True for errors that reject the input itself (HTTP 400), as opposed
    /// to state conflicts (HTTP 409).
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            OrderError::IllegalTransition { .. } | OrderError::CancellationWindowExceeded
        )
    }
}
