//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Legal transitions:
/// ```text
/// Pending ──► Confirmed ──► Shipped ──► Delivered
///    │            │
///    └────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order accepted, inventory and payment pending.
    #[default]
    Pending,

    /// Payment confirmed, awaiting shipment.
    Confirmed,

    /// Order was cancelled (terminal).
    Cancelled,

    /// Order has left the warehouse.
    Shipped,

    /// Order reached the customer (terminal).
    Delivered,
}

impl OrderStatus {
    /// Returns true if the order can be confirmed from this status.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be cancelled from this status.
    ///
    /// The cancellation time window is enforced by the aggregate, not here.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Returns true if the order can be shipped from this status.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Confirmed)
    }

    /// Returns true if the order can be delivered from this status.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Delivered)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
        }
    }

    /// Integer representation used by the relational store.
    pub fn as_i32(&self) -> i32 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::Cancelled => 2,
            OrderStatus::Shipped => 3,
            OrderStatus::Delivered => 4,
        }
    }

    /// Inverse of [`OrderStatus::as_i32`].
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(OrderStatus::Pending),
            1 => Some(OrderStatus::Confirmed),
            2 => Some(OrderStatus::Cancelled),
            3 => Some(OrderStatus::Shipped),
            4 => Some(OrderStatus::Delivered),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
