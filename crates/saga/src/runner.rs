//! Wires every consumer group onto the bus.

use std::sync::Arc;

use bus::EventBus;
use chrono::Duration;
use inventory::InventoryEngine;
use store::OrderStore;

use crate::consumers::{
    PaymentConsumer, PaymentFailedHandler, PaymentProcessedHandler, RefundConsumer,
    ReservationConsumer, StockFailedHandler, StockReleaseConsumer, bindings,
};
use crate::payment::PaymentProcessor;
use crate::refund::RefundGateway;

/// Everything the consumer fleet needs.
pub struct ConsumerDeps {
    pub orders: Arc<dyn OrderStore>,
    pub inventory: Arc<InventoryEngine>,
    pub bus: Arc<dyn EventBus>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub refunds: Arc<dyn RefundGateway>,
    /// Reservation hold time, from `INVENTORY_TTL_SECONDS`.
    pub reservation_ttl: Duration,
}

/// Subscribes all seven consumer queues. Each consumer runs on its own
/// long-lived task with exclusive bus resources.
pub async fn start_consumers(deps: ConsumerDeps) -> bus::Result<()> {
    let ConsumerDeps {
        orders,
        inventory,
        bus,
        payments,
        refunds,
        reservation_ttl,
    } = deps;

    bus.subscribe(
        bindings::RESERVE_STOCK,
        Arc::new(ReservationConsumer::new(
            inventory.clone(),
            bus.clone(),
            reservation_ttl,
        )),
    )
    .await?;

    bus.subscribe(
        bindings::RELEASE_STOCK,
        Arc::new(StockReleaseConsumer::new(inventory)),
    )
    .await?;

    bus.subscribe(
        bindings::CHARGE_PAYMENT,
        Arc::new(PaymentConsumer::new(orders.clone(), payments, bus.clone())),
    )
    .await?;

    bus.subscribe(
        bindings::STATUS_PAYMENT_PROCESSED,
        Arc::new(PaymentProcessedHandler::new(orders.clone())),
    )
    .await?;

    bus.subscribe(
        bindings::STATUS_PAYMENT_FAILED,
        Arc::new(PaymentFailedHandler::new(orders.clone(), bus.clone())),
    )
    .await?;

    bus.subscribe(
        bindings::STATUS_STOCK_FAILED,
        Arc::new(StockFailedHandler::new(orders)),
    )
    .await?;

    bus.subscribe(
        bindings::REFUND,
        Arc::new(RefundConsumer::new(refunds, bus.clone())),
    )
    .await?;

    tracing::info!("saga consumers started");
    Ok(())
}
