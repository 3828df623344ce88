//! PostgreSQL-backed order and idempotency stores.

use async_trait::async_trait;
use chrono::Utc;
use common::{Currency, CustomerId, Money, OrderId, ProductId};
use domain::{Order, OrderItem, OrderRecord, OrderStatus};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::idempotency::IdempotencyStore;
use crate::orders::OrderStore;

/// Creates a connection pool for the given connection string.
pub async fn connect_pool(conn: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(conn)
        .await?;
    Ok(pool)
}

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: &PgRow, items: Vec<OrderItem>) -> Result<OrderRecord> {
        let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let status_raw: i32 = row.try_get("status")?;
        let status = OrderStatus::from_i32(status_raw).ok_or_else(|| StoreError::CorruptRow {
            order_id,
            reason: format!("unknown status {status_raw}"),
        })?;
        let currency = parse_currency(order_id, row.try_get::<String, _>("currency")?)?;

        Ok(OrderRecord {
            id: order_id,
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            status,
            created_at: row.try_get("created_at")?,
            confirmed_at: row.try_get("confirmed_at")?,
            cancelled_at: row.try_get("cancelled_at")?,
            shipped_at: row.try_get("shipped_at")?,
            delivered_at: row.try_get("delivered_at")?,
            cancel_reason: row.try_get("cancel_reason")?,
            total_amount: Money::new(row.try_get::<Decimal, _>("total_amount")?, currency),
            row_version: row.try_get("row_version")?,
            items,
        })
    }

    async fn load_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, unit_price, currency
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let currency = parse_currency(order_id, row.try_get::<String, _>("currency")?)?;
                Ok(OrderItem {
                    id: row.try_get("id")?,
                    product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
                    quantity: row.try_get::<i32, _>("quantity")? as u32,
                    unit_price: Money::new(row.try_get::<Decimal, _>("unit_price")?, currency),
                })
            })
            .collect()
    }
}

fn parse_currency(order_id: OrderId, raw: String) -> Result<Currency> {
    Currency::parse(raw.trim()).map_err(|e| StoreError::CorruptRow {
        order_id,
        reason: e.to_string(),
    })
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders
                (id, customer_id, status, created_at, confirmed_at, cancelled_at,
                 shipped_at, delivered_at, cancel_reason, currency, total_amount, row_version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.customer_id().as_uuid())
        .bind(order.status().as_i32())
        .bind(order.created_at())
        .bind(order.confirmed_at())
        .bind(order.cancelled_at())
        .bind(order.shipped_at())
        .bind(order.delivered_at())
        .bind(order.cancel_reason())
        .bind(order.total_amount().currency().as_str())
        .bind(order.total_amount().amount())
        .bind(order.row_version())
        .execute(&mut *tx)
        .await?;

        for item in order.items() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, unit_price, currency)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id)
            .bind(order.id().as_uuid())
            .bind(item.product_id.as_str())
            .bind(item.quantity as i32)
            .bind(item.unit_price.amount())
            .bind(item.unit_price.currency().as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, order: &Order) -> Result<i64> {
        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET status = $1,
                confirmed_at = $2,
                cancelled_at = $3,
                shipped_at = $4,
                delivered_at = $5,
                cancel_reason = $6,
                row_version = row_version + 1
            WHERE id = $7 AND row_version = $8
            RETURNING row_version
            "#,
        )
        .bind(order.status().as_i32())
        .bind(order.confirmed_at())
        .bind(order.cancelled_at())
        .bind(order.shipped_at())
        .bind(order.delivered_at())
        .bind(order.cancel_reason())
        .bind(order.id().as_uuid())
        .bind(order.row_version())
        .fetch_optional(&self.pool)
        .await?;

        match new_version {
            Some(version) => Ok(version),
            None => {
                // Distinguish a stale version from a missing row.
                let exists: Option<Uuid> =
                    sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
                        .bind(order.id().as_uuid())
                        .fetch_optional(&self.pool)
                        .await?;

                if exists.is_some() {
                    Err(StoreError::Conflict {
                        order_id: order.id(),
                        expected: order.row_version(),
                    })
                } else {
                    Err(StoreError::NotFound(order.id()))
                }
            }
        }
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, status, created_at, confirmed_at, cancelled_at,
                   shipped_at, delivered_at, cancel_reason, currency, total_amount, row_version
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = self.load_items(id).await?;
                let record = Self::row_to_record(&row, items)?;
                Ok(Some(Order::from_record(record)))
            }
            None => Ok(None),
        }
    }
}

/// PostgreSQL-backed idempotency store.
///
/// The unique index on `key` is the synchronization primitive; no
/// in-process locking is needed.
#[derive(Clone)]
pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    /// Creates a new store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn try_insert(&self, key: &str, candidate: OrderId) -> Result<OrderId> {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO idempotency (id, key, resource_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO NOTHING
            RETURNING resource_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(candidate.as_uuid())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(id) => Ok(OrderId::from_uuid(id)),
            None => {
                let existing: Uuid =
                    sqlx::query_scalar("SELECT resource_id FROM idempotency WHERE key = $1")
                        .bind(key)
                        .fetch_one(&self.pool)
                        .await?;
                Ok(OrderId::from_uuid(existing))
            }
        }
    }
}
