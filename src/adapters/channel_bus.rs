//! In-process message broker.
//!
//! Stands in for the external pub/sub transport: named topics, bounded
//! queues, at-least-once delivery with explicit acknowledgment. A delivery
//! that is handed back via `redeliver` goes to the front of its topic queue
//! so per-key ordering survives retries. In-flight deliveries do not survive
//! a process crash; the durable leg of the pipeline is the outbox table, not
//! this broker.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ExecutionError, Result};

/// Envelope for one keyed message on a named topic.
///
/// `event_type` is the type discriminator heterogeneous consumers dispatch
/// on; `event_id` is the dedup handle for downstream at-least-once handling.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub partition_key: String,
    pub event_type: String,
    pub event_id: Uuid,
    pub payload: Value,
}

impl Message {
    pub fn new(topic: &str, partition_key: &str, event_type: &str, payload: Value) -> Self {
        Self {
            topic: topic.to_string(),
            partition_key: partition_key.to_string(),
            event_type: event_type.to_string(),
            event_id: Uuid::new_v4(),
            payload,
        }
    }

    /// Keep a caller-assigned event id (outbox rows carry their own)
    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }
}

/// At-least-once publisher of keyed events to a named topic
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: Message) -> Result<()>;
}

/// A message handed to a subscriber. Dropped on ack, requeued on redeliver.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub attempt: u32,
}

/// In-process broker with bounded per-topic queues
pub struct ChannelBroker {
    capacity: usize,
    topics: Mutex<HashMap<String, VecDeque<Delivery>>>,
    notify: Notify,
}

impl ChannelBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            topics: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    /// Pop the next delivery for a topic, or None if the queue is empty
    pub async fn try_next(&self, topic: &str) -> Option<Delivery> {
        let mut topics = self.topics.lock().await;
        topics.get_mut(topic).and_then(|queue| queue.pop_front())
    }

    /// Wait for the next delivery on a topic
    pub async fn recv(&self, topic: &str) -> Delivery {
        loop {
            // Register interest before checking so a publish between the
            // check and the await cannot be missed.
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            if let Some(delivery) = self.try_next(topic).await {
                return delivery;
            }
            notified.await;
        }
    }

    /// Acknowledge a delivery. The message is gone for good.
    pub fn ack(&self, delivery: Delivery) {
        debug!(
            topic = %delivery.message.topic,
            event_id = %delivery.message.event_id,
            attempt = delivery.attempt,
            "acked delivery"
        );
    }

    /// Hand a failed delivery back for redelivery. It is requeued at the
    /// front of its topic so per-key ordering is preserved.
    pub async fn redeliver(&self, mut delivery: Delivery) {
        delivery.attempt += 1;
        let mut topics = self.topics.lock().await;
        topics
            .entry(delivery.message.topic.clone())
            .or_default()
            .push_front(delivery);
        drop(topics);
        self.notify.notify_waiters();
    }

    /// Number of queued (undelivered) messages on a topic
    pub async fn depth(&self, topic: &str) -> usize {
        let topics = self.topics.lock().await;
        topics.get(topic).map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EventPublisher for ChannelBroker {
    async fn publish(&self, message: Message) -> Result<()> {
        let mut topics = self.topics.lock().await;
        let queue = topics.entry(message.topic.clone()).or_default();

        if queue.len() >= self.capacity {
            return Err(ExecutionError::Publish(format!(
                "topic {} is full ({} messages)",
                message.topic, self.capacity
            )));
        }

        debug!(
            topic = %message.topic,
            key = %message.partition_key,
            event_type = %message.event_type,
            event_id = %message.event_id,
            "published message"
        );
        queue.push_back(Delivery {
            message,
            attempt: 1,
        });
        drop(topics);
        self.notify.notify_waiters();
        Ok(())
    }
}
