//! Payment consumer: charges reserved orders with a fraud gate and a
//! retry loop around the processor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bus::events::{PaymentFailed, PaymentProcessed, StockReserved};
use bus::{EventBus, EventBusExt, EventHandler, Outcome, decode};
use chrono::Utc;
use common::OrderId;
use rust_decimal::Decimal;
use store::OrderStore;

use crate::payment::{PaymentError, PaymentProcessor};
use crate::retry::{Backoff, retry};

fn fraud_threshold() -> Decimal {
    Decimal::from(10_000)
}

fn charge_backoff() -> Backoff {
    Backoff {
        max_attempts: 3,
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(4),
        jitter: None,
    }
}

/// Consumes `stock.reserved` and drives the payment step.
///
/// Totals above the fraud threshold fail immediately without touching
/// the processor; timeouts are retried with exponential backoff.
pub struct PaymentConsumer {
    orders: Arc<dyn OrderStore>,
    processor: Arc<dyn PaymentProcessor>,
    bus: Arc<dyn EventBus>,
}

impl PaymentConsumer {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        processor: Arc<dyn PaymentProcessor>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            orders,
            processor,
            bus,
        }
    }

    async fn publish_failed(&self, order_id: OrderId, reason: &str) -> Outcome {
        metrics::counter!("payments_failed_total", "reason" => reason.to_string()).increment(1);
        let result = self
            .bus
            .publish(&PaymentFailed {
                order_id,
                reason: reason.to_string(),
            })
            .await;

        match result {
            Ok(()) => Outcome::Ack,
            Err(e) => {
                tracing::error!(%order_id, error = %e, "failed to publish payment.failed");
                Outcome::DeadLetter
            }
        }
    }
}

#[async_trait]
impl EventHandler for PaymentConsumer {
    async fn handle(&self, body: &[u8]) -> Outcome {
        let event: StockReserved = match decode(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed stock.reserved payload");
                return Outcome::DeadLetter;
            }
        };

        let order = match self.orders.get(event.order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                tracing::warn!(order_id = %event.order_id, "stock reserved for unknown order");
                return Outcome::Ack;
            }
            Err(e) => {
                tracing::error!(order_id = %event.order_id, error = %e, "failed to load order");
                return Outcome::DeadLetter;
            }
        };

        let amount = order.total_amount();
        if amount.amount() > fraud_threshold() {
            tracing::warn!(
                order_id = %event.order_id,
                total = %amount,
                "total exceeds fraud threshold, manual verification required"
            );
            return self
                .publish_failed(event.order_id, "fraud_verification_required")
                .await;
        }

        let charge = retry(&charge_backoff(), PaymentError::is_transient, |attempt| {
            tracing::debug!(order_id = %event.order_id, attempt, "charging payment processor");
            self.processor.charge(event.order_id, amount)
        })
        .await;

        match charge {
            Ok(()) => {
                metrics::counter!("payments_processed_total").increment(1);
                tracing::info!(order_id = %event.order_id, total = %amount, "payment processed");
                let published = self
                    .bus
                    .publish(&PaymentProcessed {
                        order_id: event.order_id,
                        amount,
                        processed_at: Utc::now(),
                    })
                    .await;
                match published {
                    Ok(()) => Outcome::Ack,
                    Err(e) => {
                        tracing::error!(order_id = %event.order_id, error = %e, "failed to publish payment.processed");
                        Outcome::DeadLetter
                    }
                }
            }
            Err(PaymentError::Timeout) => {
                self.publish_failed(event.order_id, "processor_error").await
            }
            Err(PaymentError::Declined) => {
                self.publish_failed(event.order_id, "payment_declined").await
            }
        }
    }
}
