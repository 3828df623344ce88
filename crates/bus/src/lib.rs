//! Event bus abstraction over an AMQP-style broker.
//!
//! One durable fanout exchange per logical event; each consumer group
//! owns a durable queue bound to one exchange plus a companion DLX/DLQ
//! pair. Delivery is at-least-once; handlers must be idempotent.
//!
//! Two implementations: [`InMemoryEventBus`] for tests and local
//! development, and [`AmqpEventBus`] (RabbitMQ via lapin) for
//! production.

mod amqp;
mod error;
pub mod events;
mod memory;
mod traits;

pub use amqp::{AmqpConfig, AmqpEventBus};
pub use error::{BusError, Result};
pub use memory::InMemoryEventBus;
pub use traits::{Binding, Event, EventBus, EventBusExt, EventHandler, Outcome, decode};
