//! In-memory inventory reservation engine.
//!
//! Stock levels, reservations and the policy state (flash-sale set,
//! per-customer ledger, idempotent reservation keys) live process-wide;
//! all read-modify-write sequences for a product run inside that
//! product's critical section. Reservations expire after a TTL and are
//! reaped by the [`sweeper`] background task.

mod engine;
pub mod sweeper;

pub use engine::{
    FLASH_SALE_CAP, InventoryEngine, LOW_STOCK_THRESHOLD, Reservation, ReserveRequest,
};
