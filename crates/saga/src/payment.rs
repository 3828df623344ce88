//! Payment processor contract and simulator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{Money, OrderId};
use rand::Rng;
use thiserror::Error;

/// Outcomes of a single charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// The processor did not answer in time; worth retrying.
    #[error("payment processor timed out")]
    Timeout,

    /// The charge was rejected outright.
    #[error("payment declined")]
    Declined,
}

impl PaymentError {
    /// True for errors the retry loop should attempt again.
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::Timeout)
    }
}

/// External payment processor, specified as a contract only.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Charges the order amount against the customer's payment method.
    async fn charge(&self, order_id: OrderId, amount: Money) -> Result<(), PaymentError>;
}

/// Simulated processor with a fixed outcome distribution:
/// 85% success, 10% timeout, 5% decline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedPaymentProcessor;

impl SimulatedPaymentProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedPaymentProcessor {
    async fn charge(&self, order_id: OrderId, amount: Money) -> Result<(), PaymentError> {
        let roll: f64 = rand::thread_rng().r#gen();
        tracing::debug!(%order_id, %amount, roll, "simulated charge attempt");
        if roll < 0.85 {
            Ok(())
        } else if roll < 0.95 {
            Err(PaymentError::Timeout)
        } else {
            Err(PaymentError::Declined)
        }
    }
}

/// Test processor replaying pre-programmed outcomes in order; succeeds
/// once the script is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPaymentProcessor {
    outcomes: Arc<Mutex<VecDeque<Result<(), PaymentError>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome for the next charge call.
    pub fn push_outcome(&self, outcome: Result<(), PaymentError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Number of charge attempts observed.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedPaymentProcessor {
    async fn charge(&self, _order_id: OrderId, _amount: Money) -> Result<(), PaymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
