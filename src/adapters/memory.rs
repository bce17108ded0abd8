//! In-memory store for tests and development.
//!
//! Implements the same contracts as the PostgreSQL adapter, including the
//! atomic order+outbox write, plus switches for simulating a storage outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::Order;
use crate::error::{ExecutionError, Result};
use crate::persistence::{DeadLetterStore, OrderStore, OutboxEntry, OutboxRecord, OutboxStore};

/// A dead-lettered payload kept for assertions
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub topic: String,
    pub payload: Value,
    pub error: String,
}

/// In-memory implementation of the storage contracts
#[derive(Default)]
pub struct InMemoryStore {
    orders: RwLock<HashMap<i64, Order>>,
    outbox: RwLock<Vec<OutboxEntry>>,
    dead_letters: RwLock<Vec<DeadLetter>>,
    next_outbox_id: AtomicI64,
    storage_down: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_outbox_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    /// Simulate a storage outage: every operation fails until cleared
    pub fn set_storage_down(&self, down: bool) {
        self.storage_down.store(down, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.storage_down.load(Ordering::SeqCst) {
            return Err(ExecutionError::StorageUnavailable(
                "simulated outage".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// All outbox rows, published or not (for assertions)
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.outbox.read().await.clone()
    }

    pub async fn dead_letter_entries(&self) -> Vec<DeadLetter> {
        self.dead_letters.read().await.clone()
    }

    fn entry_from_record(&self, record: &OutboxRecord) -> OutboxEntry {
        OutboxEntry {
            id: self.next_outbox_id.fetch_add(1, Ordering::SeqCst),
            event_id: record.event_id,
            topic: record.topic.clone(),
            partition_key: record.partition_key.clone(),
            event_type: record.event_type.clone(),
            payload: record.payload.clone(),
            created_at: Utc::now(),
            published_at: None,
        }
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Order>> {
        self.check_available()?;
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn upsert(&self, order: &Order) -> Result<()> {
        self.check_available()?;
        self.orders.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn upsert_with_outbox(&self, order: &Order, record: &OutboxRecord) -> Result<()> {
        self.check_available()?;
        // Take both locks before mutating either so the write is atomic
        // with respect to concurrent readers.
        let mut orders = self.orders.write().await;
        let mut outbox = self.outbox.write().await;
        orders.insert(order.id, order.clone());
        outbox.push(self.entry_from_record(record));
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn pending_outbox(&self, limit: i64) -> Result<Vec<OutboxEntry>> {
        self.check_available()?;
        Ok(self
            .outbox
            .read()
            .await
            .iter()
            .filter(|e| e.published_at.is_none())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: i64) -> Result<()> {
        self.check_available()?;
        let mut outbox = self.outbox.write().await;
        if let Some(entry) = outbox.iter_mut().find(|e| e.id == id) {
            if entry.published_at.is_none() {
                entry.published_at = Some(Utc::now());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryStore {
    async fn record_dead_letter(&self, topic: &str, payload: &Value, error: &str) -> Result<()> {
        self.check_available()?;
        self.dead_letters.write().await.push(DeadLetter {
            topic: topic.to_string(),
            payload: payload.clone(),
            error: error.to_string(),
        });
        Ok(())
    }
}
