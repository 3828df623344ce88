//! Bus traits and the handler contract.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::error::{BusError, Result};

/// A typed event payload bound to its fanout exchange.
pub trait Event: Serialize + DeserializeOwned + Send {
    /// Name of the durable fanout exchange this event is published to.
    const EXCHANGE: &'static str;
}

/// What a handler decided about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processed successfully, or deliberately ignored.
    Ack,

    /// Reject without requeue; the broker routes the message to the DLQ.
    /// Used for unexpected failures and permanently bad payloads.
    DeadLetter,
}

/// A consumer callback. The bus may redeliver, so implementations must
/// be idempotent.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, body: &[u8]) -> Outcome;
}

/// A consumer group's queue and the exchange it is bound to.
///
/// For a queue `X` the bus also maintains the dead-letter pair: a direct
/// exchange `X.dlx` bound to queue `X.dlq` with routing key `X`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub exchange: &'static str,
    pub queue: &'static str,
}

/// Publish/subscribe over durable fanout exchanges.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a persistent JSON message and synchronously awaits the
    /// broker confirm.
    async fn publish_raw(&self, exchange: &str, body: Vec<u8>) -> Result<()>;

    /// Spawns a long-lived consumer task that declares the binding's
    /// topology and feeds deliveries to the handler.
    async fn subscribe(&self, binding: Binding, handler: Arc<dyn EventHandler>) -> Result<()>;
}

/// Extension trait providing typed publishing.
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Serializes the event and publishes it to its exchange.
    async fn publish<E: Event + Sync>(&self, event: &E) -> Result<()> {
        let body = serde_json::to_vec(event)?;
        self.publish_raw(E::EXCHANGE, body).await
    }
}

// Blanket implementation for all EventBus implementations.
impl<T: EventBus + ?Sized> EventBusExt for T {}

/// Decodes a delivery body into a typed event.
pub fn decode<E: Event>(body: &[u8]) -> std::result::Result<E, BusError> {
    Ok(serde_json::from_slice(body)?)
}
