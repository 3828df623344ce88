//! Consumer groups and their queue bindings.

mod payment;
mod refund;
mod reservation;
mod status;

pub use payment::PaymentConsumer;
pub use refund::RefundConsumer;
pub use reservation::{ReservationConsumer, StockReleaseConsumer};
pub use status::{PaymentFailedHandler, PaymentProcessedHandler, StockFailedHandler};

/// Queue bindings for every consumer group.
///
/// Each queue `X` gets a companion `X.dlx`/`X.dlq` pair declared by the
/// bus implementation.
pub mod bindings {
    use bus::{Binding, events};

    pub const RESERVE_STOCK: Binding = Binding {
        exchange: events::ORDER_CREATED,
        queue: "inventory.reserve",
    };

    pub const RELEASE_STOCK: Binding = Binding {
        exchange: events::STOCK_RELEASED,
        queue: "inventory.release",
    };

    pub const CHARGE_PAYMENT: Binding = Binding {
        exchange: events::STOCK_RESERVED,
        queue: "payments.charge",
    };

    pub const STATUS_PAYMENT_PROCESSED: Binding = Binding {
        exchange: events::PAYMENT_PROCESSED,
        queue: "orders.status.payment-processed",
    };

    pub const STATUS_PAYMENT_FAILED: Binding = Binding {
        exchange: events::PAYMENT_FAILED,
        queue: "orders.status.payment-failed",
    };

    pub const STATUS_STOCK_FAILED: Binding = Binding {
        exchange: events::STOCK_FAILED,
        queue: "orders.status.stock-failed",
    };

    pub const REFUND: Binding = Binding {
        exchange: events::ORDER_CANCELLED,
        queue: "payments.refund",
    };
}
