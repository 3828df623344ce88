//! Durable storage for orders and idempotency keys.
//!
//! Two backends are provided for each trait: an in-memory implementation
//! for tests and local development, and a PostgreSQL implementation for
//! production. Optimistic locking on orders uses the `row_version` column
//! compared on every UPDATE.

mod error;
mod idempotency;
mod orders;
mod postgres;

pub use error::{Result, StoreError};
pub use idempotency::{IdempotencyStore, InMemoryIdempotencyStore};
pub use orders::{InMemoryOrderStore, OrderStore};
pub use postgres::{PostgresIdempotencyStore, PostgresOrderStore, connect_pool};
