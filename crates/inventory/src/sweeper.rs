//! Background TTL sweep for expired reservations.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::InventoryEngine;

/// Interval between TTL sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the TTL sweep loop until the token is cancelled.
///
/// Spawn this on its own task at startup.
pub async fn run(engine: Arc<InventoryEngine>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!("TTL sweeper shutting down");
                return;
            }
            _ = ticker.tick() => {
                let released = engine.release_expired();
                if released > 0 {
                    tracing::info!(released, "released expired reservations");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use common::{OrderId, ProductId, ReservationId};

    use crate::engine::ReserveRequest;

    #[tokio::test]
    async fn sweeper_stops_on_cancellation() {
        let engine = Arc::new(InventoryEngine::new());
        let token = CancellationToken::new();

        let handle = tokio::spawn(run(engine, token.clone()));
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_releases_expired_reservations() {
        let engine = Arc::new(InventoryEngine::new());
        engine.set_stock(ProductId::new("P1"), 10);
        assert!(engine.try_reserve(ReserveRequest {
            product_id: ProductId::new("P1"),
            quantity: 5,
            reservation_id: ReservationId::new(),
            customer_id: None,
            order_id: Some(OrderId::new()),
            ttl: ChronoDuration::seconds(-1),
        }));
        assert_eq!(engine.get_stock(&ProductId::new("P1")), 5);

        let token = CancellationToken::new();
        let handle = tokio::spawn(run(engine.clone(), token.clone()));

        // First tick fires immediately under the paused clock.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.get_stock(&ProductId::new("P1")), 10);

        token.cancel();
        handle.await.unwrap();
    }
}
