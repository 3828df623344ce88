//! Response DTOs.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ProductId};
use domain::Order;
use serde::Serialize;
use uuid::Uuid;

/// Order representation returned by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    pub total_amount: Money,
    pub items: Vec<OrderItemDto>,
}

/// Line item representation inside [`OrderDto`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDto {
    pub id: Uuid,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl From<&Order> for OrderDto {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            customer_id: order.customer_id(),
            status: order.status().to_string(),
            created_at: order.created_at(),
            confirmed_at: order.confirmed_at(),
            cancelled_at: order.cancelled_at(),
            shipped_at: order.shipped_at(),
            delivered_at: order.delivered_at(),
            cancel_reason: order.cancel_reason().map(str::to_string),
            total_amount: order.total_amount(),
            items: order
                .items()
                .iter()
                .map(|item| OrderItemDto {
                    id: item.id,
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total(),
                })
                .collect(),
        }
    }
}
