//! Reservation consumer: holds stock for new orders and returns it when
//! a release is requested.

use std::sync::Arc;

use async_trait::async_trait;
use bus::events::{OrderCreated, StockFailed, StockReleased, StockReserved};
use bus::{EventBus, EventBusExt, EventHandler, Outcome, decode};
use chrono::{Duration, Utc};
use common::{ProductId, ReservationId};
use inventory::{InventoryEngine, ReserveRequest};

/// Consumes `order.created` and attempts to reserve every line item.
///
/// Items are reserved one at a time, stopping at the first rejection;
/// partial holds are released before `stock.failed` is emitted.
pub struct ReservationConsumer {
    inventory: Arc<InventoryEngine>,
    bus: Arc<dyn EventBus>,
    ttl: Duration,
}

impl ReservationConsumer {
    pub fn new(inventory: Arc<InventoryEngine>, bus: Arc<dyn EventBus>, ttl: Duration) -> Self {
        Self { inventory, bus, ttl }
    }
}

#[async_trait]
impl EventHandler for ReservationConsumer {
    async fn handle(&self, body: &[u8]) -> Outcome {
        let event: OrderCreated = match decode(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed order.created payload");
                return Outcome::DeadLetter;
            }
        };

        let mut held: Vec<ReservationId> = Vec::new();
        let mut rejected: Option<ProductId> = None;

        for item in &event.items {
            let reservation_id = ReservationId::new();
            let reserved = self.inventory.try_reserve(ReserveRequest {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                reservation_id,
                customer_id: Some(event.customer_id),
                order_id: Some(event.order_id),
                ttl: self.ttl,
            });

            if reserved {
                held.push(reservation_id);
            } else {
                rejected = Some(item.product_id.clone());
                break;
            }
        }

        let published = match rejected {
            None => {
                tracing::info!(order_id = %event.order_id, items = event.items.len(), "stock reserved");
                self.bus
                    .publish(&StockReserved {
                        order_id: event.order_id,
                        total: event.total,
                        reserved_at: Utc::now(),
                    })
                    .await
            }
            Some(product_id) => {
                for reservation_id in held {
                    self.inventory.release(reservation_id);
                }
                tracing::info!(order_id = %event.order_id, %product_id, "reservation rejected");
                self.bus
                    .publish(&StockFailed {
                        order_id: event.order_id,
                        reason: format!("insufficient stock for {product_id}"),
                    })
                    .await
            }
        };

        match published {
            Ok(()) => Outcome::Ack,
            Err(e) => {
                tracing::error!(order_id = %event.order_id, error = %e, "failed to publish reservation outcome");
                Outcome::DeadLetter
            }
        }
    }
}

/// Consumes `stock.released` and returns everything held for the order.
pub struct StockReleaseConsumer {
    inventory: Arc<InventoryEngine>,
}

impl StockReleaseConsumer {
    pub fn new(inventory: Arc<InventoryEngine>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl EventHandler for StockReleaseConsumer {
    async fn handle(&self, body: &[u8]) -> Outcome {
        let event: StockReleased = match decode(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed stock.released payload");
                return Outcome::DeadLetter;
            }
        };

        let released = self.inventory.release_by_order(event.order_id);
        tracing::info!(
            order_id = %event.order_id,
            released,
            reason = %event.reason,
            "released reservations for order"
        );
        Outcome::Ack
    }
}
