//! Order line items.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A line item owned by exactly one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Row identifier.
    pub id: Uuid,

    /// The product being ordered.
    pub product_id: ProductId,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit.
    pub unit_price: Money,
}

impl OrderItem {
    /// Creates a new line item with a fresh identifier.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: product_id.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns `round(unit_price * quantity, 2)`.
    pub fn line_total(&self) -> Money {
        self.unit_price.line_total(self.quantity)
    }
}
