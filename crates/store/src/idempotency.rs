//! Idempotency key store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;

use crate::error::Result;

/// Unique-key to resource-id mapping with first-writer-wins semantics.
///
/// For a given key the first caller's candidate id wins permanently;
/// every later caller observes that same id. Entries are never reaped.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Inserts `(key, candidate)` unless the key exists, and returns the
    /// id that ended up associated with the key.
    async fn try_insert(&self, key: &str, candidate: OrderId) -> Result<OrderId>;
}

#[derive(Debug, Clone)]
struct Entry {
    resource_id: OrderId,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

/// In-memory idempotency store for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdempotencyStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryIdempotencyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub fn key_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn try_insert(&self, key: &str, candidate: OrderId) -> Result<OrderId> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            resource_id: candidate,
            created_at: Utc::now(),
        });
        Ok(entry.resource_id)
    }
}
