//! Saga consumers for the order lifecycle.
//!
//! Four consumer groups cooperate over the event bus: reservation
//! (`order.created` / `stock.released`), payment (`stock.reserved`),
//! status updates (`payment.*`, `stock.failed`) and refunds
//! (`order.cancelled`). Handlers are idempotent; the bus delivers
//! at-least-once.

pub mod consumers;
mod payment;
mod refund;
pub mod retry;
mod runner;

pub use payment::{PaymentError, PaymentProcessor, ScriptedPaymentProcessor, SimulatedPaymentProcessor};
pub use refund::{RefundError, RefundGateway, ScriptedRefundGateway, SimulatedRefundGateway};
pub use runner::{ConsumerDeps, start_consumers};
