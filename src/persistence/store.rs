//! Storage contracts for orders, the transactional outbox, and dead letters.
//!
//! The coordinator and relay only ever see these traits; `adapters` provides
//! the PostgreSQL implementation and an in-memory one for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{Order, OrderExecutedEvent, ORDER_EXECUTED_EVENT_TYPE};
use crate::error::Result;

/// An outbound event staged for publication, not yet stored
#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub event_id: Uuid,
    pub topic: String,
    pub partition_key: String,
    pub event_type: String,
    pub payload: Value,
}

impl OutboxRecord {
    /// Stage an execution event for the given outbound topic, keyed by
    /// ticker so per-instrument ordering holds downstream.
    pub fn for_execution(topic: &str, event: &OrderExecutedEvent) -> Result<Self> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            topic: topic.to_string(),
            partition_key: event.ticker.clone(),
            event_type: ORDER_EXECUTED_EVENT_TYPE.to_string(),
            payload: serde_json::to_value(event)?,
        })
    }
}

/// A stored outbox row awaiting (or after) publication
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub event_id: Uuid,
    pub topic: String,
    pub partition_key: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Durable keyed storage for order records
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Point lookup by order id
    async fn find_by_id(&self, id: i64) -> Result<Option<Order>>;

    /// Full-record write. Replaces an existing row with the same id;
    /// repeated calls with identical input leave the same stored state.
    async fn upsert(&self, order: &Order) -> Result<()>;

    /// Write the order and stage its outbound event in one transaction.
    /// On any error neither is stored.
    async fn upsert_with_outbox(&self, order: &Order, record: &OutboxRecord) -> Result<()>;
}

/// Drain surface used by the outbox relay
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Unpublished rows in insertion order, up to `limit`
    async fn pending_outbox(&self, limit: i64) -> Result<Vec<OutboxEntry>>;

    /// Mark a row as published. Idempotent: a second call is a no-op.
    async fn mark_published(&self, id: i64) -> Result<()>;
}

/// Sink for inbound payloads that failed schema validation
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn record_dead_letter(&self, topic: &str, payload: &Value, error: &str) -> Result<()>;
}
