//! Refund consumer: compensates cancelled orders.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bus::events::{OrderCancelled, RefundFailed, RefundProcessed, StockReleased};
use bus::{EventBus, EventBusExt, EventHandler, Outcome, decode};
use chrono::Utc;

use crate::refund::RefundGateway;
use crate::retry::{Backoff, retry};

fn refund_backoff() -> Backoff {
    Backoff {
        max_attempts: 3,
        initial_delay: Duration::from_millis(200),
        max_delay: Duration::from_secs(2),
        jitter: Some(Duration::from_millis(100)),
    }
}

/// Consumes `order.cancelled` and runs the retrying refund.
///
/// Both timeouts and declines are retried; on success the held stock is
/// released, on exhaustion `refund.failed` is emitted instead.
pub struct RefundConsumer {
    gateway: Arc<dyn RefundGateway>,
    bus: Arc<dyn EventBus>,
}

impl RefundConsumer {
    pub fn new(gateway: Arc<dyn RefundGateway>, bus: Arc<dyn EventBus>) -> Self {
        Self { gateway, bus }
    }
}

#[async_trait]
impl EventHandler for RefundConsumer {
    async fn handle(&self, body: &[u8]) -> Outcome {
        let event: OrderCancelled = match decode(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed order.cancelled payload");
                return Outcome::DeadLetter;
            }
        };

        let refunded = retry(&refund_backoff(), |_| true, |attempt| {
            tracing::debug!(order_id = %event.order_id, attempt, "attempting refund");
            self.gateway.refund(event.order_id)
        })
        .await;

        let published = match refunded {
            Ok(()) => {
                metrics::counter!("refunds_processed_total").increment(1);
                tracing::info!(order_id = %event.order_id, "refund processed");
                let processed = self
                    .bus
                    .publish(&RefundProcessed {
                        order_id: event.order_id,
                        at: Utc::now(),
                    })
                    .await;
                match processed {
                    Ok(()) => {
                        self.bus
                            .publish(&StockReleased {
                                order_id: event.order_id,
                                reason: "order_cancelled".to_string(),
                            })
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => {
                metrics::counter!("refunds_failed_total").increment(1);
                tracing::warn!(order_id = %event.order_id, error = %e, "refund attempts exhausted");
                self.bus
                    .publish(&RefundFailed {
                        order_id: event.order_id,
                        reason: e.to_string(),
                    })
                    .await
            }
        };

        match published {
            Ok(()) => Outcome::Ack,
            Err(e) => {
                tracing::error!(order_id = %event.order_id, error = %e, "failed to publish refund outcome");
                Outcome::DeadLetter
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus::InMemoryEventBus;
    use common::OrderId;

    use crate::refund::{RefundError, ScriptedRefundGateway};

    fn cancelled_body(order_id: OrderId) -> Vec<u8> {
        serde_json::to_vec(&OrderCancelled {
            order_id,
            at: Utc::now(),
            reason: Some("changed my mind".to_string()),
        })
        .unwrap()
    }

    fn consumer(gateway: &ScriptedRefundGateway, bus: &InMemoryEventBus) -> RefundConsumer {
        RefundConsumer::new(Arc::new(gateway.clone()), Arc::new(bus.clone()))
    }

    #[tokio::test]
    async fn successful_refund_emits_processed_and_release() {
        let gateway = ScriptedRefundGateway::new();
        let bus = InMemoryEventBus::new();
        let order_id = OrderId::new();

        let outcome = consumer(&gateway, &bus).handle(&cancelled_body(order_id)).await;

        assert_eq!(outcome, Outcome::Ack);
        assert_eq!(gateway.call_count(), 1);
        assert_eq!(bus.published_count(bus::events::REFUND_PROCESSED), 1);

        let released = bus.published_on(bus::events::STOCK_RELEASED);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0]["reason"], "order_cancelled");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let gateway = ScriptedRefundGateway::new();
        gateway.push_outcome(Err(RefundError::Timeout));
        gateway.push_outcome(Err(RefundError::Declined));
        gateway.push_outcome(Ok(()));
        let bus = InMemoryEventBus::new();

        let outcome = consumer(&gateway, &bus)
            .handle(&cancelled_body(OrderId::new()))
            .await;

        assert_eq!(outcome, Outcome::Ack);
        assert_eq!(gateway.call_count(), 3);
        assert_eq!(bus.published_count(bus::events::REFUND_PROCESSED), 1);
        assert_eq!(bus.published_count(bus::events::REFUND_FAILED), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_emit_refund_failed() {
        let gateway = ScriptedRefundGateway::new();
        for _ in 0..3 {
            gateway.push_outcome(Err(RefundError::Declined));
        }
        let bus = InMemoryEventBus::new();

        let outcome = consumer(&gateway, &bus)
            .handle(&cancelled_body(OrderId::new()))
            .await;

        assert_eq!(outcome, Outcome::Ack);
        assert_eq!(gateway.call_count(), 3);
        assert_eq!(bus.published_count(bus::events::REFUND_PROCESSED), 0);
        // No stock release on a failed refund.
        assert_eq!(bus.published_count(bus::events::STOCK_RELEASED), 0);

        let failed = bus.published_on(bus::events::REFUND_FAILED);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["reason"], "refund declined");
    }

    #[tokio::test]
    async fn malformed_payload_is_dead_lettered() {
        let gateway = ScriptedRefundGateway::new();
        let bus = InMemoryEventBus::new();
        let outcome = consumer(&gateway, &bus).handle(b"[]").await;
        assert_eq!(outcome, Outcome::DeadLetter);
        assert_eq!(gateway.call_count(), 0);
    }
}
