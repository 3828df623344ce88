//! Order aggregate root.

use chrono::{DateTime, Duration, Utc};
use common::{CustomerId, Money, OrderId};
use rust_decimal::Decimal;

use crate::error::OrderError;
use crate::item::OrderItem;
use crate::status::OrderStatus;

/// Maximum number of line items per order.
pub const MAX_ITEMS: usize = 20;

/// Orders may only be cancelled within this many hours of creation.
pub const CANCELLATION_WINDOW_HOURS: i64 = 2;

const MAX_CANCEL_REASON_LEN: usize = 200;

fn min_total() -> Decimal {
    Decimal::from(100)
}

fn max_total() -> Decimal {
    Decimal::from(50_000)
}

/// Order aggregate root.
///
/// Construction validates all creation invariants; transition methods
/// validate the source status and stamp the corresponding timestamp.
/// `row_version` is the optimistic concurrency token maintained by the
/// store on every successful update.
#[derive(Debug, Clone)]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    total_amount: Money,
    row_version: i64,
    items: Vec<OrderItem>,
}

/// Raw field set used by storage adapters to rehydrate an [`Order`]
/// without re-running creation validation.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub total_amount: Money,
    pub row_version: i64,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Places a new order for a customer.
    ///
    /// Validates the item set (1..=20 items, positive quantities and
    /// prices, a single currency) and the total range, then assigns a
    /// fresh server-side id. The order starts in `Pending`.
    pub fn place(
        customer_id: CustomerId,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() || items.len() > MAX_ITEMS {
            return Err(OrderError::ItemCountOutOfRange { count: items.len() });
        }

        let currency = items[0].unit_price.currency();
        let mut total = Money::zero(currency);
        for item in &items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                });
            }
            if !item.unit_price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.clone(),
                });
            }
            total = total
                .plus(item.line_total())
                .ok_or(OrderError::MixedCurrencies)?;
        }

        if total.amount() < min_total() || total.amount() > max_total() {
            return Err(OrderError::TotalOutOfRange {
                total: total.amount(),
            });
        }

        Ok(Self {
            id: OrderId::new(),
            customer_id,
            status: OrderStatus::Pending,
            created_at: now,
            confirmed_at: None,
            cancelled_at: None,
            shipped_at: None,
            delivered_at: None,
            cancel_reason: None,
            total_amount: total,
            row_version: 1,
            items,
        })
    }

    /// Rehydrates an order from stored fields.
    pub fn from_record(record: OrderRecord) -> Self {
        Self {
            id: record.id,
            customer_id: record.customer_id,
            status: record.status,
            created_at: record.created_at,
            confirmed_at: record.confirmed_at,
            cancelled_at: record.cancelled_at,
            shipped_at: record.shipped_at,
            delivered_at: record.delivered_at,
            cancel_reason: record.cancel_reason,
            total_amount: record.total_amount,
            row_version: record.row_version,
            items: record.items,
        }
    }
}

// Transitions
impl Order {
    /// Pending → Confirmed.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_confirm() {
            return Err(OrderError::IllegalTransition {
                status: self.status,
                action: "confirm",
            });
        }
        self.status = OrderStatus::Confirmed;
        self.confirmed_at = Some(now);
        Ok(())
    }

    /// Pending|Confirmed → Cancelled, within the cancellation window.
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::IllegalTransition {
                status: self.status,
                action: "cancel",
            });
        }
        if now - self.created_at > Duration::hours(CANCELLATION_WINDOW_HOURS) {
            return Err(OrderError::CancellationWindowExceeded);
        }
        if reason.chars().count() > MAX_CANCEL_REASON_LEN {
            return Err(OrderError::CancelReasonTooLong);
        }
        self.status = OrderStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.cancel_reason = Some(reason.to_string());
        Ok(())
    }

    /// Confirmed → Shipped.
    pub fn mark_shipped(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_ship() {
            return Err(OrderError::IllegalTransition {
                status: self.status,
                action: "ship",
            });
        }
        self.status = OrderStatus::Shipped;
        self.shipped_at = Some(now);
        Ok(())
    }

    /// Shipped → Delivered.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_deliver() {
            return Err(OrderError::IllegalTransition {
                status: self.status,
                action: "deliver",
            });
        }
        self.status = OrderStatus::Delivered;
        self.delivered_at = Some(now);
        Ok(())
    }
}

// Queries
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Optimistic concurrency token; bumped by the store on update.
    pub fn row_version(&self) -> i64 {
        self.row_version
    }

    /// Used by storage adapters after a successful versioned update.
    pub fn set_row_version(&mut self, version: i64) {
        self.row_version = version;
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }
}
