//! The reservation engine.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use common::{CustomerId, OrderId, ProductId, ReservationId};

/// Maximum concurrently reserved quantity per customer for flash-sale
/// products.
pub const FLASH_SALE_CAP: u32 = 2;

/// Reserving below this remaining stock emits a low-stock signal.
pub const LOW_STOCK_THRESHOLD: u32 = 10;

/// A live hold on stock, released explicitly or by TTL expiry.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub order_id: Option<OrderId>,
    pub product_id: ProductId,
    pub quantity: u32,
    pub customer_id: Option<CustomerId>,
    pub expires_at: DateTime<Utc>,
}

/// Parameters for a single-product reservation attempt.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub reservation_id: ReservationId,
    pub customer_id: Option<CustomerId>,
    pub order_id: Option<OrderId>,
    pub ttl: Duration,
}

#[derive(Default)]
struct Inner {
    /// Per-product mutexes, lazily created and never removed. Lookup and
    /// insertion of a mutex is atomic under the outer lock.
    locks: Mutex<HashMap<ProductId, Arc<Mutex<()>>>>,
    stock: RwLock<HashMap<ProductId, u32>>,
    reservations: RwLock<HashMap<ReservationId, Reservation>>,
    by_order: RwLock<HashMap<OrderId, Vec<ReservationId>>>,
    flash_sale: RwLock<HashSet<ProductId>>,
    ledger: RwLock<HashMap<(CustomerId, ProductId), u32>>,
    reserved_keys: RwLock<HashSet<(OrderId, ProductId)>>,
}

/// Concurrent, policy-enforcing reservation store.
///
/// Every reserve/release read-modify-write sequence for a product runs
/// inside that product's critical section. A reservation request carries
/// a single product, so no two product locks are ever held at once.
#[derive(Clone, Default)]
pub struct InventoryEngine {
    inner: Arc<Inner>,
}

impl InventoryEngine {
    /// Creates an engine with no stock.
    pub fn new() -> Self {
        Self::default()
    }

    fn product_lock(&self, product: &ProductId) -> Arc<Mutex<()>> {
        self.inner
            .locks
            .lock()
            .unwrap()
            .entry(product.clone())
            .or_default()
            .clone()
    }

    /// Atomically checks policy, decrements stock and records the
    /// reservation. Every policy violation returns `false`; this method
    /// never errors.
    pub fn try_reserve(&self, req: ReserveRequest) -> bool {
        let lock = self.product_lock(&req.product_id);
        let _guard = lock.lock().unwrap();

        // Redelivered reserve commands for the same (order, product) are
        // acknowledged without a second side effect.
        if let Some(order_id) = req.order_id {
            let keys = self.inner.reserved_keys.read().unwrap();
            if keys.contains(&(order_id, req.product_id.clone())) {
                return true;
            }
        }

        if req.quantity == 0 {
            return self.reject(&req, "zero_quantity");
        }

        let available = self
            .inner
            .stock
            .read()
            .unwrap()
            .get(&req.product_id)
            .copied()
            .unwrap_or(0);

        // A single order may not take more than half of what is left.
        if req.order_id.is_some() {
            let max_allowed = (available / 2).max(1);
            if req.quantity > max_allowed {
                return self.reject(&req, "half_of_available");
            }
        }

        if let Some(customer_id) = req.customer_id {
            if self.inner.flash_sale.read().unwrap().contains(&req.product_id) {
                let existing = self
                    .inner
                    .ledger
                    .read()
                    .unwrap()
                    .get(&(customer_id, req.product_id.clone()))
                    .copied()
                    .unwrap_or(0);
                if existing + req.quantity > FLASH_SALE_CAP {
                    return self.reject(&req, "flash_sale_cap");
                }
            }
        }

        if available < req.quantity {
            return self.reject(&req, "insufficient_stock");
        }

        // Commit.
        let remaining = available - req.quantity;
        self.inner
            .stock
            .write()
            .unwrap()
            .insert(req.product_id.clone(), remaining);

        let reservation = Reservation {
            reservation_id: req.reservation_id,
            order_id: req.order_id,
            product_id: req.product_id.clone(),
            quantity: req.quantity,
            customer_id: req.customer_id,
            expires_at: Utc::now() + req.ttl,
        };
        self.inner
            .reservations
            .write()
            .unwrap()
            .insert(req.reservation_id, reservation);

        if let Some(order_id) = req.order_id {
            self.inner
                .by_order
                .write()
                .unwrap()
                .entry(order_id)
                .or_default()
                .push(req.reservation_id);
            self.inner
                .reserved_keys
                .write()
                .unwrap()
                .insert((order_id, req.product_id.clone()));
        }

        if let Some(customer_id) = req.customer_id {
            if self.inner.flash_sale.read().unwrap().contains(&req.product_id) {
                *self
                    .inner
                    .ledger
                    .write()
                    .unwrap()
                    .entry((customer_id, req.product_id.clone()))
                    .or_insert(0) += req.quantity;
            }
        }

        metrics::counter!("reservations_total").increment(1);

        if remaining < LOW_STOCK_THRESHOLD {
            metrics::counter!("low_stock_signals_total").increment(1);
            tracing::warn!(
                product_id = %req.product_id,
                remaining,
                "LOW_STOCK: product fell below threshold"
            );
        }

        true
    }

    fn reject(&self, req: &ReserveRequest, reason: &'static str) -> bool {
        metrics::counter!("reservation_rejections_total", "reason" => reason).increment(1);
        tracing::debug!(
            product_id = %req.product_id,
            quantity = req.quantity,
            reason,
            "reservation rejected"
        );
        false
    }

    /// Returns the reserved stock and clears the idempotent key so a
    /// future retry may re-reserve. No-op if the reservation is unknown.
    pub fn release(&self, reservation_id: ReservationId) -> bool {
        let product = {
            let reservations = self.inner.reservations.read().unwrap();
            match reservations.get(&reservation_id) {
                Some(r) => r.product_id.clone(),
                None => return false,
            }
        };

        let lock = self.product_lock(&product);
        let _guard = lock.lock().unwrap();

        // Re-check under the product lock; a concurrent release may have
        // won the race.
        let Some(reservation) = self
            .inner
            .reservations
            .write()
            .unwrap()
            .remove(&reservation_id)
        else {
            return false;
        };

        *self
            .inner
            .stock
            .write()
            .unwrap()
            .entry(product.clone())
            .or_insert(0) += reservation.quantity;

        if let Some(customer_id) = reservation.customer_id {
            let mut ledger = self.inner.ledger.write().unwrap();
            if let Some(reserved) = ledger.get_mut(&(customer_id, product.clone())) {
                *reserved = reserved.saturating_sub(reservation.quantity);
                if *reserved == 0 {
                    ledger.remove(&(customer_id, product.clone()));
                }
            }
        }

        if let Some(order_id) = reservation.order_id {
            let mut by_order = self.inner.by_order.write().unwrap();
            if let Some(ids) = by_order.get_mut(&order_id) {
                ids.retain(|id| *id != reservation_id);
                if ids.is_empty() {
                    by_order.remove(&order_id);
                }
            }
            self.inner
                .reserved_keys
                .write()
                .unwrap()
                .remove(&(order_id, product));
        }

        metrics::counter!("reservations_released_total").increment(1);
        true
    }

    /// Releases every reservation held for the order. Returns the number
    /// of reservations released.
    pub fn release_by_order(&self, order_id: OrderId) -> usize {
        let ids: Vec<ReservationId> = self
            .inner
            .by_order
            .read()
            .unwrap()
            .get(&order_id)
            .cloned()
            .unwrap_or_default();

        ids.into_iter().filter(|id| self.release(*id)).count()
    }

    /// Releases every reservation whose deadline has passed. The
    /// reservation map is snapshotted before iterating so the sweep never
    /// holds a lock across releases.
    pub fn release_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<ReservationId> = self
            .inner
            .reservations
            .read()
            .unwrap()
            .iter()
            .filter(|(_, r)| r.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();

        expired.into_iter().filter(|id| self.release(*id)).count()
    }

    /// Current availability for each requested product (0 if unknown).
    pub fn check_availability(&self, products: &[ProductId]) -> HashMap<ProductId, u32> {
        let stock = self.inner.stock.read().unwrap();
        products
            .iter()
            .map(|p| (p.clone(), stock.get(p).copied().unwrap_or(0)))
            .collect()
    }

    /// Current stock level for a product.
    pub fn get_stock(&self, product: &ProductId) -> u32 {
        self.inner
            .stock
            .read()
            .unwrap()
            .get(product)
            .copied()
            .unwrap_or(0)
    }

    /// Admin: sets the stock level for a product.
    pub fn set_stock(&self, product: ProductId, quantity: u32) {
        let lock = self.product_lock(&product);
        let _guard = lock.lock().unwrap();
        self.inner.stock.write().unwrap().insert(product, quantity);
    }

    /// Admin: sets several stock levels.
    pub fn bulk_set(&self, levels: HashMap<ProductId, u32>) {
        for (product, quantity) in levels {
            self.set_stock(product, quantity);
        }
    }

    /// Admin: atomically replaces the flash-sale product set.
    pub fn set_flash_sale_products(&self, products: HashSet<ProductId>) {
        *self.inner.flash_sale.write().unwrap() = products;
    }

    /// Number of live reservations.
    pub fn reservation_count(&self) -> usize {
        self.inner.reservations.read().unwrap().len()
    }
}
