use common::OrderId;
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row version compared on UPDATE did not match; another writer
    /// got there first. Callers retry with a fresh load.
    #[error("optimistic conflict for order {order_id}: row_version {expected} is stale")]
    Conflict { order_id: OrderId, expected: i64 },

    /// The order does not exist.
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// A stored row could not be mapped back to the domain model.
    #[error("corrupt row for order {order_id}: {reason}")]
    CorruptRow { order_id: OrderId, reason: String },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
