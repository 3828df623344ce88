//! In-memory event bus for tests and local development.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::traits::{Binding, EventBus, EventHandler, Outcome};

#[derive(Default)]
struct BusInner {
    /// Fanout: every queue bound to an exchange receives each message.
    subscribers: RwLock<HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>>,
    published: RwLock<Vec<(String, serde_json::Value)>>,
    dead_letters: RwLock<Vec<(String, Vec<u8>)>>,
}

/// In-memory bus mirroring the broker's fanout semantics.
///
/// Also records every publish and every dead-lettered delivery so tests
/// can assert on emissions.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    inner: Arc<BusInner>,
}

impl InMemoryEventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bodies published to the exchange, in order.
    pub fn published_on(&self, exchange: &str) -> Vec<serde_json::Value> {
        self.inner
            .published
            .read()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == exchange)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Number of messages published to the exchange.
    pub fn published_count(&self, exchange: &str) -> usize {
        self.published_on(exchange).len()
    }

    /// Deliveries rejected to the dead-letter queue, per live queue name.
    pub fn dead_letter_count(&self, queue: &str) -> usize {
        self.inner
            .dead_letters
            .read()
            .unwrap()
            .iter()
            .filter(|(q, _)| q == queue)
            .count()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish_raw(&self, exchange: &str, body: Vec<u8>) -> Result<()> {
        let json = serde_json::from_slice(&body)?;
        self.inner
            .published
            .write()
            .unwrap()
            .push((exchange.to_string(), json));

        let mut subscribers = self.inner.subscribers.write().unwrap();
        if let Some(senders) = subscribers.get_mut(exchange) {
            // Drop queues whose consumer task has gone away.
            senders.retain(|tx| tx.send(body.clone()).is_ok());
        }

        metrics::counter!("bus_published_total", "exchange" => exchange.to_string()).increment(1);
        Ok(())
    }

    async fn subscribe(&self, binding: Binding, handler: Arc<dyn EventHandler>) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.inner
            .subscribers
            .write()
            .unwrap()
            .entry(binding.exchange.to_string())
            .or_default()
            .push(tx);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(body) = rx.recv().await {
                match handler.handle(&body).await {
                    Outcome::Ack => {}
                    Outcome::DeadLetter => {
                        metrics::counter!(
                            "bus_dead_lettered_total",
                            "queue" => binding.queue.to_string()
                        )
                        .increment(1);
                        tracing::warn!(queue = binding.queue, "delivery dead-lettered");
                        inner
                            .dead_letters
                            .write()
                            .unwrap()
                            .push((binding.queue.to_string(), body));
                    }
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
        outcome: Outcome,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _body: &[u8]) -> Outcome {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }
    }

    async fn wait_for(check: impl Fn() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    const TEST_BINDING: Binding = Binding {
        exchange: "test.event",
        queue: "test.queue",
    };

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = InMemoryEventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            TEST_BINDING,
            Arc::new(CountingHandler {
                count: count.clone(),
                outcome: Outcome::Ack,
            }),
        )
        .await
        .unwrap();

        bus.publish_raw("test.event", b"{\"orderId\":1}".to_vec())
            .await
            .unwrap();

        wait_for(|| count.load(Ordering::SeqCst) == 1).await;
        assert_eq!(bus.published_count("test.event"), 1);
        assert_eq!(bus.dead_letter_count("test.queue"), 0);
    }

    #[tokio::test]
    async fn fanout_delivers_to_every_queue() {
        let bus = InMemoryEventBus::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        bus.subscribe(
            Binding { exchange: "test.event", queue: "q1" },
            Arc::new(CountingHandler { count: first.clone(), outcome: Outcome::Ack }),
        )
        .await
        .unwrap();
        bus.subscribe(
            Binding { exchange: "test.event", queue: "q2" },
            Arc::new(CountingHandler { count: second.clone(), outcome: Outcome::Ack }),
        )
        .await
        .unwrap();

        bus.publish_raw("test.event", b"{}".to_vec()).await.unwrap();

        wait_for(|| first.load(Ordering::SeqCst) == 1 && second.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn dead_letters_are_recorded() {
        let bus = InMemoryEventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(
            TEST_BINDING,
            Arc::new(CountingHandler {
                count: count.clone(),
                outcome: Outcome::DeadLetter,
            }),
        )
        .await
        .unwrap();

        bus.publish_raw("test.event", b"{}".to_vec()).await.unwrap();

        wait_for(|| bus.dead_letter_count("test.queue") == 1).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_recorded() {
        let bus = InMemoryEventBus::new();
        bus.publish_raw("lonely.event", b"{}".to_vec()).await.unwrap();
        assert_eq!(bus.published_count("lonely.event"), 1);
    }
}
