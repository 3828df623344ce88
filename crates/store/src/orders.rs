//! Order store trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::Order;

use crate::error::{Result, StoreError};

/// Durable storage for order aggregates.
///
/// Implementations must be thread-safe. Concurrent writers to the same
/// order are mediated by optimistic locking: `update` compares the
/// aggregate's `row_version` against the stored one and fails with
/// [`StoreError::Conflict`] on mismatch.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order together with its items in one transaction.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Updates the mutable order fields (status, timestamps, reason).
    ///
    /// The stored `row_version` must equal `order.row_version()`; on
    /// success it is incremented and the new value returned.
    async fn update(&self, order: &Order) -> Result<i64>;

    /// Loads an order by id; `None` if it does not exist.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;
}

/// In-memory order store for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub fn order_count(&self) -> usize {
        self.orders.read().unwrap().len()
    }

    /// Replaces a stored order verbatim, bypassing the version check.
    ///
    /// Test helper for seeding aggregates in arbitrary states.
    pub fn put_unchecked(&self, order: Order) {
        self.orders.write().unwrap().insert(order.id(), order);
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        self.orders
            .write()
            .unwrap()
            .insert(order.id(), order.clone());
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<i64> {
        let mut orders = self.orders.write().unwrap();
        let stored = orders
            .get_mut(&order.id())
            .ok_or(StoreError::NotFound(order.id()))?;

        if stored.row_version() != order.row_version() {
            return Err(StoreError::Conflict {
                order_id: order.id(),
                expected: order.row_version(),
            });
        }

        let new_version = order.row_version() + 1;
        let mut updated = order.clone();
        updated.set_row_version(new_version);
        *stored = updated;
        Ok(new_version)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().unwrap().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Currency, CustomerId, Money};
    use domain::OrderItem;
    use rust_decimal::Decimal;

    fn sample_order() -> Order {
        let item = OrderItem::new("P1", 2, Money::new(Decimal::from(60), Currency::TRY));
        Order::place(CustomerId::new(), vec![item], Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = InMemoryOrderStore::new();
        let order = sample_order();

        store.insert(&order).await.unwrap();

        let loaded = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.id(), order.id());
        assert_eq!(loaded.row_version(), 1);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = InMemoryOrderStore::new();
        assert!(store.get(OrderId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_bumps_row_version() {
        let store = InMemoryOrderStore::new();
        let mut order = sample_order();
        store.insert(&order).await.unwrap();

        order.confirm(Utc::now()).unwrap();
        let new_version = store.update(&order).await.unwrap();
        assert_eq!(new_version, 2);

        let loaded = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(loaded.row_version(), 2);
        assert_eq!(loaded.status(), domain::OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = InMemoryOrderStore::new();
        let order = sample_order();
        store.insert(&order).await.unwrap();

        // First writer wins.
        let mut first = store.get(order.id()).await.unwrap().unwrap();
        first.confirm(Utc::now()).unwrap();
        store.update(&first).await.unwrap();

        // Second writer still holds row_version 1.
        let mut second = order.clone();
        second.confirm(Utc::now()).unwrap();
        let result = store.update(&second).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn update_missing_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let order = sample_order();
        let result = store.update(&order).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
