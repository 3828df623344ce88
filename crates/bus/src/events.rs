//! Saga event payloads, one per fanout exchange.
//!
//! Wire format is JSON with lowerCamelCase keys; every body carries
//! `orderId` as its first field.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::traits::Event;

pub const ORDER_CREATED: &str = "order.created";
pub const STOCK_RESERVED: &str = "stock.reserved";
pub const STOCK_FAILED: &str = "stock.failed";
pub const STOCK_RELEASED: &str = "stock.released";
pub const PAYMENT_PROCESSED: &str = "payment.processed";
pub const PAYMENT_FAILED: &str = "payment.failed";
pub const ORDER_CANCELLED: &str = "order.cancelled";
pub const ORDER_SHIPPED: &str = "order.shipped";
pub const ORDER_DELIVERED: &str = "order.delivered";
pub const REFUND_PROCESSED: &str = "refund.processed";
pub const REFUND_FAILED: &str = "refund.failed";

/// Every exchange the coordinator publishes to, for topology declaration.
pub const ALL_EXCHANGES: [&str; 11] = [
    ORDER_CREATED,
    STOCK_RESERVED,
    STOCK_FAILED,
    STOCK_RELEASED,
    PAYMENT_PROCESSED,
    PAYMENT_FAILED,
    ORDER_CANCELLED,
    ORDER_SHIPPED,
    ORDER_DELIVERED,
    REFUND_PROCESSED,
    REFUND_FAILED,
];

/// A line item as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Published once per order, after the aggregate is durably committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub total: Money,
    pub items: Vec<EventItem>,
    pub created_at: DateTime<Utc>,
}

impl Event for OrderCreated {
    const EXCHANGE: &'static str = ORDER_CREATED;
}

/// All items of the order are reserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReserved {
    pub order_id: OrderId,
    pub total: Money,
    pub reserved_at: DateTime<Utc>,
}

impl Event for StockReserved {
    const EXCHANGE: &'static str = STOCK_RESERVED;
}

/// Reservation was rejected for at least one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockFailed {
    pub order_id: OrderId,
    pub reason: String,
}

impl Event for StockFailed {
    const EXCHANGE: &'static str = STOCK_FAILED;
}

/// Request to return all stock held for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReleased {
    pub order_id: OrderId,
    pub reason: String,
}

impl Event for StockReleased {
    const EXCHANGE: &'static str = STOCK_RELEASED;
}

/// Payment succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProcessed {
    pub order_id: OrderId,
    pub amount: Money,
    pub processed_at: DateTime<Utc>,
}

impl Event for PaymentProcessed {
    const EXCHANGE: &'static str = PAYMENT_PROCESSED;
}

/// Payment terminally failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
    pub order_id: OrderId,
    pub reason: String,
}

impl Event for PaymentFailed {
    const EXCHANGE: &'static str = PAYMENT_FAILED;
}

/// Order reached the Cancelled status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Event for OrderCancelled {
    const EXCHANGE: &'static str = ORDER_CANCELLED;
}

/// Order reached the Shipped status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderShipped {
    pub order_id: OrderId,
    pub at: DateTime<Utc>,
}

impl Event for OrderShipped {
    const EXCHANGE: &'static str = ORDER_SHIPPED;
}

/// Order reached the Delivered status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDelivered {
    pub order_id: OrderId,
    pub at: DateTime<Utc>,
}

impl Event for OrderDelivered {
    const EXCHANGE: &'static str = ORDER_DELIVERED;
}

/// Refund completed for a cancelled order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundProcessed {
    pub order_id: OrderId,
    pub at: DateTime<Utc>,
}

impl Event for RefundProcessed {
    const EXCHANGE: &'static str = REFUND_PROCESSED;
}

/// Refund attempts exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundFailed {
    pub order_id: OrderId,
    pub reason: String,
}

impl Event for RefundFailed {
    const EXCHANGE: &'static str = REFUND_FAILED;
}
