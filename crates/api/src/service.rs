//! Application-level order handlers: create, cancel, ship, deliver.
//!
//! Each transition loads the aggregate, invokes the domain method, saves
//! under optimistic locking, and publishes the matching event only after
//! the write committed.

use std::sync::Arc;

use bus::events::{EventItem, OrderCancelled, OrderCreated, OrderDelivered, OrderShipped};
use bus::{EventBus, EventBusExt};
use chrono::Utc;
use common::{CustomerId, OrderId};
use domain::{Order, OrderError, OrderItem, OrderStatus};
use store::{IdempotencyStore, OrderStore, StoreError};

use crate::dto::OrderDto;
use crate::error::ApiError;

const MAX_CONFLICT_RETRIES: u32 = 3;

/// Order command service shared by the HTTP handlers.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    bus: Arc<dyn EventBus>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            orders,
            idempotency,
            bus,
        }
    }

    /// Creates an order.
    ///
    /// With an idempotency key, a retried request returns the original
    /// order's DTO without persisting or publishing again. A new order
    /// is persisted first; `order.created` goes out exactly once, after
    /// the commit.
    ///
    /// Returns the DTO and whether a new order was created.
    #[tracing::instrument(skip(self, items))]
    pub async fn create(
        &self,
        customer_id: CustomerId,
        items: Vec<OrderItem>,
        idempotency_key: Option<String>,
    ) -> Result<(OrderDto, bool), ApiError> {
        let order = Order::place(customer_id, items, Utc::now())?;

        if let Some(key) = idempotency_key {
            let assigned = self.idempotency.try_insert(&key, order.id()).await?;
            if assigned != order.id() {
                tracing::info!(order_id = %assigned, key, "idempotency replay, returning existing order");
                let existing = self.orders.get(assigned).await?.ok_or_else(|| {
                    ApiError::Internal(format!("idempotency key maps to missing order {assigned}"))
                })?;
                return Ok((OrderDto::from(&existing), false));
            }
        }

        self.orders.insert(&order).await?;
        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id(), total = %order.total_amount(), "order created");

        // Publish failure after the commit leaves the order in place;
        // the admin retry path re-emits.
        self.publish_created(&order).await?;

        Ok((OrderDto::from(&order), true))
    }

    /// Cancels an order at the customer's request.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId, reason: String) -> Result<OrderDto, ApiError> {
        let order = self
            .mutate(order_id, |order| order.cancel(&reason, Utc::now()))
            .await?;

        metrics::counter!("orders_cancelled_total", "reason" => "customer_request").increment(1);
        self.bus
            .publish(&OrderCancelled {
                order_id,
                at: order.cancelled_at().unwrap_or_else(Utc::now),
                reason: order.cancel_reason().map(str::to_string),
            })
            .await?;

        Ok(OrderDto::from(&order))
    }

    /// Marks a confirmed order as shipped.
    #[tracing::instrument(skip(self))]
    pub async fn ship(&self, order_id: OrderId) -> Result<OrderDto, ApiError> {
        let order = self
            .mutate(order_id, |order| order.mark_shipped(Utc::now()))
            .await?;

        metrics::counter!("orders_shipped_total").increment(1);
        self.bus
            .publish(&OrderShipped {
                order_id,
                at: order.shipped_at().unwrap_or_else(Utc::now),
            })
            .await?;

        Ok(OrderDto::from(&order))
    }

    /// Marks a shipped order as delivered.
    #[tracing::instrument(skip(self))]
    pub async fn deliver(&self, order_id: OrderId) -> Result<OrderDto, ApiError> {
        let order = self
            .mutate(order_id, |order| order.mark_delivered(Utc::now()))
            .await?;

        metrics::counter!("orders_delivered_total").increment(1);
        self.bus
            .publish(&OrderDelivered {
                order_id,
                at: order.delivered_at().unwrap_or_else(Utc::now),
            })
            .await?;

        Ok(OrderDto::from(&order))
    }

    /// Loads an order's DTO.
    pub async fn get(&self, order_id: OrderId) -> Result<OrderDto, ApiError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("order {order_id} not found")))?;
        Ok(OrderDto::from(&order))
    }

    /// Admin path: re-emits `order.created` for a pending order whose
    /// original publish failed after commit. Idempotent consumers make a
    /// duplicate emission harmless.
    #[tracing::instrument(skip(self))]
    pub async fn retry_publish(&self, order_id: OrderId) -> Result<OrderDto, ApiError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("order {order_id} not found")))?;

        if order.status() != OrderStatus::Pending {
            return Err(ApiError::Conflict(format!(
                "order {order_id} is {}, only pending orders can be re-published",
                order.status()
            )));
        }

        self.publish_created(&order).await?;
        Ok(OrderDto::from(&order))
    }

    async fn publish_created(&self, order: &Order) -> Result<(), ApiError> {
        let event = OrderCreated {
            order_id: order.id(),
            customer_id: order.customer_id(),
            total: order.total_amount(),
            items: order
                .items()
                .iter()
                .map(|item| EventItem {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            created_at: order.created_at(),
        };
        self.bus.publish(&event).await?;
        Ok(())
    }

    /// Load-mutate-save with a bounded retry on optimistic conflicts.
    async fn mutate<F>(&self, order_id: OrderId, mut apply: F) -> Result<Order, ApiError>
    where
        F: FnMut(&mut Order) -> Result<(), OrderError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut order = self
                .orders
                .get(order_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("order {order_id} not found")))?;

            apply(&mut order)?;

            match self.orders.update(&order).await {
                Ok(version) => {
                    order.set_row_version(version);
                    return Ok(order);
                }
                Err(StoreError::Conflict { .. }) if attempt < MAX_CONFLICT_RETRIES => {
                    tracing::debug!(%order_id, attempt, "optimistic conflict, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus::InMemoryEventBus;
    use common::{Currency, Money};
    use domain::OrderRecord;
    use rust_decimal::Decimal;
    use store::{InMemoryIdempotencyStore, InMemoryOrderStore};

    struct Setup {
        service: OrderService,
        orders: InMemoryOrderStore,
        bus: InMemoryEventBus,
    }

    fn setup() -> Setup {
        let orders = InMemoryOrderStore::new();
        let bus = InMemoryEventBus::new();
        let service = OrderService::new(
            Arc::new(orders.clone()),
            Arc::new(InMemoryIdempotencyStore::new()),
            Arc::new(bus.clone()),
        );
        Setup {
            service,
            orders,
            bus,
        }
    }

    fn items() -> Vec<OrderItem> {
        vec![OrderItem::new(
            "P1",
            2,
            Money::new(Decimal::from(60), Currency::TRY),
        )]
    }

    #[tokio::test]
    async fn create_persists_then_publishes_once() {
        let Setup {
            service,
            orders,
            bus,
        } = setup();

        let (dto, created) = service
            .create(CustomerId::new(), items(), None)
            .await
            .unwrap();

        assert!(created);
        assert_eq!(dto.status, "Pending");
        assert_eq!(dto.total_amount.amount(), Decimal::from(120));
        assert_eq!(orders.order_count(), 1);

        let published = bus.published_on(bus::events::ORDER_CREATED);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0]["orderId"], serde_json::json!(dto.id));
    }

    #[tokio::test]
    async fn idempotent_create_returns_same_order_without_republishing() {
        let Setup {
            service,
            orders,
            bus,
        } = setup();
        let customer = CustomerId::new();

        let (first, created_first) = service
            .create(customer, items(), Some("K".to_string()))
            .await
            .unwrap();
        let (second, created_second) = service
            .create(customer, items(), Some("K".to_string()))
            .await
            .unwrap();

        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first.id, second.id);
        assert_eq!(orders.order_count(), 1);
        assert_eq!(bus.published_count(bus::events::ORDER_CREATED), 1);
    }

    #[tokio::test]
    async fn different_keys_create_different_orders() {
        let Setup {
            service, orders, ..
        } = setup();
        let customer = CustomerId::new();

        let (first, _) = service
            .create(customer, items(), Some("K1".to_string()))
            .await
            .unwrap();
        let (second, _) = service
            .create(customer, items(), Some("K2".to_string()))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(orders.order_count(), 2);
    }

    #[tokio::test]
    async fn invalid_order_has_no_side_effects() {
        let Setup {
            service,
            orders,
            bus,
        } = setup();

        let result = service.create(CustomerId::new(), vec![], None).await;

        assert!(matches!(result, Err(ApiError::Domain(_))));
        assert_eq!(orders.order_count(), 0);
        assert_eq!(bus.published_count(bus::events::ORDER_CREATED), 0);
    }

    #[tokio::test]
    async fn cancel_publishes_order_cancelled() {
        let Setup { service, bus, .. } = setup();
        let (dto, _) = service
            .create(CustomerId::new(), items(), None)
            .await
            .unwrap();

        let cancelled = service
            .cancel(dto.id, "changed my mind".to_string())
            .await
            .unwrap();

        assert_eq!(cancelled.status, "Cancelled");
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("changed my mind"));

        let published = bus.published_on(bus::events::ORDER_CANCELLED);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0]["reason"], "changed my mind");
    }

    #[tokio::test]
    async fn cancel_outside_window_is_a_conflict() {
        let Setup {
            service, orders, ..
        } = setup();
        let (dto, _) = service
            .create(CustomerId::new(), items(), None)
            .await
            .unwrap();

        // Age the order past the window.
        let stored = orders.get(dto.id).await.unwrap().unwrap();
        let record = OrderRecord {
            id: stored.id(),
            customer_id: stored.customer_id(),
            status: stored.status(),
            created_at: stored.created_at() - chrono::Duration::hours(3),
            confirmed_at: None,
            cancelled_at: None,
            shipped_at: None,
            delivered_at: None,
            cancel_reason: None,
            total_amount: stored.total_amount(),
            row_version: stored.row_version(),
            items: stored.items().to_vec(),
        };
        orders.put_unchecked(Order::from_record(record));

        let result = service.cancel(dto.id, "too late".to_string()).await;
        assert!(matches!(
            result,
            Err(ApiError::Domain(OrderError::CancellationWindowExceeded))
        ));

        let unchanged = service.get(dto.id).await.unwrap();
        assert_eq!(unchanged.status, "Pending");
    }

    #[tokio::test]
    async fn ship_requires_confirmed_order() {
        let Setup { service, .. } = setup();
        let (dto, _) = service
            .create(CustomerId::new(), items(), None)
            .await
            .unwrap();

        let result = service.ship(dto.id).await;
        assert!(matches!(
            result,
            Err(ApiError::Domain(OrderError::IllegalTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn ship_then_deliver_walks_the_dag() {
        let Setup {
            service,
            orders,
            bus,
        } = setup();
        let (dto, _) = service
            .create(CustomerId::new(), items(), None)
            .await
            .unwrap();

        // Payment confirmation normally happens via the status consumer.
        let mut order = orders.get(dto.id).await.unwrap().unwrap();
        order.confirm(Utc::now()).unwrap();
        orders.update(&order).await.unwrap();

        let shipped = service.ship(dto.id).await.unwrap();
        assert_eq!(shipped.status, "Shipped");

        let delivered = service.deliver(dto.id).await.unwrap();
        assert_eq!(delivered.status, "Delivered");

        assert_eq!(bus.published_count(bus::events::ORDER_SHIPPED), 1);
        assert_eq!(bus.published_count(bus::events::ORDER_DELIVERED), 1);
    }

    #[tokio::test]
    async fn retry_publish_reemits_for_pending_orders_only() {
        let Setup { service, bus, .. } = setup();
        let (dto, _) = service
            .create(CustomerId::new(), items(), None)
            .await
            .unwrap();

        service.retry_publish(dto.id).await.unwrap();
        assert_eq!(bus.published_count(bus::events::ORDER_CREATED), 2);

        service.cancel(dto.id, "done".to_string()).await.unwrap();
        let result = service.retry_publish(dto.id).await;
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[tokio::test]
    async fn get_unknown_order_is_not_found() {
        let Setup { service, .. } = setup();
        let result = service.get(OrderId::new()).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
