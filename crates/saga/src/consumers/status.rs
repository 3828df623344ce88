//! Status updater: folds payment and reservation outcomes back into the
//! order aggregate.
//!
//! Each handler is idempotent with respect to the order's current
//! status, and tolerant of unknown orders (warn + ack). Optimistic
//! conflicts are retried with a fresh load.

use std::sync::Arc;

use async_trait::async_trait;
use bus::events::{PaymentFailed, PaymentProcessed, StockFailed, StockReleased};
use bus::{EventBus, EventBusExt, EventHandler, Outcome, decode};
use chrono::Utc;
use common::OrderId;
use domain::{Order, OrderError, OrderStatus};
use store::{OrderStore, StoreError};

const MAX_CONFLICT_RETRIES: u32 = 3;

enum Applied {
    /// The mutation was applied and saved.
    Updated,
    /// The order was already in the target status, or the guard refused
    /// the transition; nothing was written.
    NoChange,
    /// No such order.
    Unknown,
}

/// Loads, mutates and saves the order, retrying on optimistic conflicts.
///
/// `apply` returns `Ok(false)` when the order is already in the desired
/// state. A guard refusal is logged and treated as no change.
async fn mutate_order<F>(
    orders: &Arc<dyn OrderStore>,
    order_id: OrderId,
    mut apply: F,
) -> Result<Applied, StoreError>
where
    F: FnMut(&mut Order) -> Result<bool, OrderError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;

        let Some(mut order) = orders.get(order_id).await? else {
            return Ok(Applied::Unknown);
        };

        match apply(&mut order) {
            Ok(false) => return Ok(Applied::NoChange),
            Ok(true) => match orders.update(&order).await {
                Ok(_) => return Ok(Applied::Updated),
                Err(StoreError::Conflict { .. }) if attempt < MAX_CONFLICT_RETRIES => {
                    tracing::debug!(%order_id, attempt, "optimistic conflict, reloading");
                }
                Err(e) => return Err(e),
            },
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "skipping status mutation");
                return Ok(Applied::NoChange);
            }
        }
    }
}

/// Consumes `payment.processed`: Pending → Confirmed.
pub struct PaymentProcessedHandler {
    orders: Arc<dyn OrderStore>,
}

impl PaymentProcessedHandler {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl EventHandler for PaymentProcessedHandler {
    async fn handle(&self, body: &[u8]) -> Outcome {
        let event: PaymentProcessed = match decode(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed payment.processed payload");
                return Outcome::DeadLetter;
            }
        };

        let applied = mutate_order(&self.orders, event.order_id, |order| {
            if order.status() == OrderStatus::Confirmed {
                Ok(false)
            } else {
                order.confirm(Utc::now()).map(|()| true)
            }
        })
        .await;

        match applied {
            Ok(Applied::Updated) => {
                metrics::counter!("orders_confirmed_total").increment(1);
                tracing::info!(order_id = %event.order_id, "order confirmed");
                Outcome::Ack
            }
            Ok(Applied::NoChange) => Outcome::Ack,
            Ok(Applied::Unknown) => {
                tracing::warn!(order_id = %event.order_id, "payment processed for unknown order");
                Outcome::Ack
            }
            Err(e) => {
                tracing::error!(order_id = %event.order_id, error = %e, "failed to confirm order");
                Outcome::DeadLetter
            }
        }
    }
}

/// Consumes `payment.failed`: cancels the order and asks the
/// reservation consumer to return the stock.
pub struct PaymentFailedHandler {
    orders: Arc<dyn OrderStore>,
    bus: Arc<dyn EventBus>,
}

impl PaymentFailedHandler {
    pub fn new(orders: Arc<dyn OrderStore>, bus: Arc<dyn EventBus>) -> Self {
        Self { orders, bus }
    }
}

#[async_trait]
impl EventHandler for PaymentFailedHandler {
    async fn handle(&self, body: &[u8]) -> Outcome {
        let event: PaymentFailed = match decode(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed payment.failed payload");
                return Outcome::DeadLetter;
            }
        };

        let applied = mutate_order(&self.orders, event.order_id, |order| {
            if order.status() == OrderStatus::Cancelled {
                Ok(false)
            } else {
                order.cancel("payment_failed", Utc::now()).map(|()| true)
            }
        })
        .await;

        match applied {
            Ok(Applied::Updated) => {
                metrics::counter!("orders_cancelled_total", "reason" => "payment_failed")
                    .increment(1);
                tracing::info!(
                    order_id = %event.order_id,
                    reason = %event.reason,
                    "order cancelled after payment failure"
                );
                let released = self
                    .bus
                    .publish(&StockReleased {
                        order_id: event.order_id,
                        reason: "payment_failed".to_string(),
                    })
                    .await;
                match released {
                    Ok(()) => Outcome::Ack,
                    Err(e) => {
                        tracing::error!(order_id = %event.order_id, error = %e, "failed to publish stock.released");
                        Outcome::DeadLetter
                    }
                }
            }
            Ok(Applied::NoChange) => Outcome::Ack,
            Ok(Applied::Unknown) => {
                tracing::warn!(order_id = %event.order_id, "payment failed for unknown order");
                Outcome::Ack
            }
            Err(e) => {
                tracing::error!(order_id = %event.order_id, error = %e, "failed to cancel order");
                Outcome::DeadLetter
            }
        }
    }
}

/// Consumes `stock.failed`: cancels the order unless payment already
/// confirmed it or it is cancelled.
pub struct StockFailedHandler {
    orders: Arc<dyn OrderStore>,
}

impl StockFailedHandler {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl EventHandler for StockFailedHandler {
    async fn handle(&self, body: &[u8]) -> Outcome {
        let event: StockFailed = match decode(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed stock.failed payload");
                return Outcome::DeadLetter;
            }
        };

        let applied = mutate_order(&self.orders, event.order_id, |order| {
            if matches!(
                order.status(),
                OrderStatus::Confirmed | OrderStatus::Cancelled
            ) {
                Ok(false)
            } else {
                order.cancel("inventory_failed", Utc::now()).map(|()| true)
            }
        })
        .await;

        match applied {
            Ok(Applied::Updated) => {
                metrics::counter!("orders_cancelled_total", "reason" => "inventory_failed")
                    .increment(1);
                tracing::info!(
                    order_id = %event.order_id,
                    reason = %event.reason,
                    "order cancelled after reservation failure"
                );
                Outcome::Ack
            }
            Ok(Applied::NoChange) => Outcome::Ack,
            Ok(Applied::Unknown) => {
                tracing::warn!(order_id = %event.order_id, "stock failed for unknown order");
                Outcome::Ack
            }
            Err(e) => {
                tracing::error!(order_id = %event.order_id, error = %e, "failed to cancel order");
                Outcome::DeadLetter
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus::InMemoryEventBus;
    use common::{Currency, CustomerId, Money};
    use domain::OrderItem;
    use rust_decimal::Decimal;
    use store::InMemoryOrderStore;

    fn money(amount: i64) -> Money {
        Money::new(Decimal::from(amount), Currency::TRY)
    }

    async fn seed_order(store: &InMemoryOrderStore) -> Order {
        let item = OrderItem::new("P1", 2, money(60));
        let order = Order::place(CustomerId::new(), vec![item], Utc::now()).unwrap();
        store.insert(&order).await.unwrap();
        order
    }

    fn processed_body(order_id: OrderId) -> Vec<u8> {
        serde_json::to_vec(&PaymentProcessed {
            order_id,
            amount: money(120),
            processed_at: Utc::now(),
        })
        .unwrap()
    }

    fn failed_body(order_id: OrderId) -> Vec<u8> {
        serde_json::to_vec(&PaymentFailed {
            order_id,
            reason: "payment_declined".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn payment_processed_confirms_pending_order() {
        let store = InMemoryOrderStore::new();
        let order = seed_order(&store).await;
        let handler = PaymentProcessedHandler::new(Arc::new(store.clone()));

        let outcome = handler.handle(&processed_body(order.id())).await;

        assert_eq!(outcome, Outcome::Ack);
        let loaded = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.status(), OrderStatus::Confirmed);
        assert!(loaded.confirmed_at().is_some());
    }

    #[tokio::test]
    async fn payment_processed_is_idempotent() {
        let store = InMemoryOrderStore::new();
        let order = seed_order(&store).await;
        let handler = PaymentProcessedHandler::new(Arc::new(store.clone()));

        handler.handle(&processed_body(order.id())).await;
        let version_after_first = store.get(order.id()).await.unwrap().unwrap().row_version();

        let outcome = handler.handle(&processed_body(order.id())).await;
        assert_eq!(outcome, Outcome::Ack);

        let loaded = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.row_version(), version_after_first);
    }

    #[tokio::test]
    async fn unknown_order_is_acked() {
        let store = InMemoryOrderStore::new();
        let handler = PaymentProcessedHandler::new(Arc::new(store));
        let outcome = handler.handle(&processed_body(OrderId::new())).await;
        assert_eq!(outcome, Outcome::Ack);
    }

    #[tokio::test]
    async fn payment_failed_cancels_and_releases_stock() {
        let store = InMemoryOrderStore::new();
        let bus = InMemoryEventBus::new();
        let order = seed_order(&store).await;
        let handler = PaymentFailedHandler::new(Arc::new(store.clone()), Arc::new(bus.clone()));

        let outcome = handler.handle(&failed_body(order.id())).await;

        assert_eq!(outcome, Outcome::Ack);
        let loaded = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.status(), OrderStatus::Cancelled);
        assert_eq!(loaded.cancel_reason(), Some("payment_failed"));

        let released = bus.published_on(bus::events::STOCK_RELEASED);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0]["reason"], "payment_failed");
    }

    #[tokio::test]
    async fn payment_failed_redelivery_does_not_release_twice() {
        let store = InMemoryOrderStore::new();
        let bus = InMemoryEventBus::new();
        let order = seed_order(&store).await;
        let handler = PaymentFailedHandler::new(Arc::new(store.clone()), Arc::new(bus.clone()));

        handler.handle(&failed_body(order.id())).await;
        handler.handle(&failed_body(order.id())).await;

        assert_eq!(bus.published_count(bus::events::STOCK_RELEASED), 1);
    }

    #[tokio::test]
    async fn stock_failed_cancels_pending_order() {
        let store = InMemoryOrderStore::new();
        let order = seed_order(&store).await;
        let handler = StockFailedHandler::new(Arc::new(store.clone()));

        let body = serde_json::to_vec(&StockFailed {
            order_id: order.id(),
            reason: "insufficient stock for P1".to_string(),
        })
        .unwrap();
        let outcome = handler.handle(&body).await;

        assert_eq!(outcome, Outcome::Ack);
        let loaded = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.status(), OrderStatus::Cancelled);
        assert_eq!(loaded.cancel_reason(), Some("inventory_failed"));
    }

    #[tokio::test]
    async fn stock_failed_leaves_confirmed_order_alone() {
        let store = InMemoryOrderStore::new();
        let mut order = seed_order(&store).await;
        order.confirm(Utc::now()).unwrap();
        store.update(&order).await.unwrap();

        let handler = StockFailedHandler::new(Arc::new(store.clone()));
        let body = serde_json::to_vec(&StockFailed {
            order_id: order.id(),
            reason: "late failure".to_string(),
        })
        .unwrap();
        let outcome = handler.handle(&body).await;

        assert_eq!(outcome, Outcome::Ack);
        let loaded = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn malformed_payloads_are_dead_lettered() {
        let store = InMemoryOrderStore::new();
        let handler = PaymentProcessedHandler::new(Arc::new(store));
        assert_eq!(handler.handle(b"{}").await, Outcome::DeadLetter);
    }
}
