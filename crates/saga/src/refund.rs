//! Refund gateway contract and simulator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::OrderId;
use rand::Rng;
use thiserror::Error;

/// Outcomes of a single refund attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RefundError {
    /// The gateway did not answer in time.
    #[error("refund timed out")]
    Timeout,

    /// The gateway refused the refund.
    #[error("refund declined")]
    Declined,
}

/// External refund gateway, specified as a contract only.
#[async_trait]
pub trait RefundGateway: Send + Sync {
    /// Refunds whatever was charged for the order.
    async fn refund(&self, order_id: OrderId) -> Result<(), RefundError>;
}

/// Simulated gateway with a fixed outcome distribution:
/// 95% success, 3% timeout, 2% decline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedRefundGateway;

impl SimulatedRefundGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RefundGateway for SimulatedRefundGateway {
    async fn refund(&self, order_id: OrderId) -> Result<(), RefundError> {
        let roll: f64 = rand::thread_rng().r#gen();
        tracing::debug!(%order_id, roll, "simulated refund attempt");
        if roll < 0.95 {
            Ok(())
        } else if roll < 0.98 {
            Err(RefundError::Timeout)
        } else {
            Err(RefundError::Declined)
        }
    }
}

/// Test gateway replaying pre-programmed outcomes in order; succeeds
/// once the script is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRefundGateway {
    outcomes: Arc<Mutex<VecDeque<Result<(), RefundError>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedRefundGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome for the next refund call.
    pub fn push_outcome(&self, outcome: Result<(), RefundError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Number of refund attempts observed.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefundGateway for ScriptedRefundGateway {
    async fn refund(&self, _order_id: OrderId) -> Result<(), RefundError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
