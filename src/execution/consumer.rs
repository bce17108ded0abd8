//! Placement event consumer.
//!
//! Pulls one delivery at a time from the inbound topic, dispatches it to the
//! coordinator, and acknowledges only on success. Failed units go back to
//! the broker for redelivery; malformed payloads are dead-lettered and
//! acknowledged so a poison message cannot loop forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::adapters::{ChannelBroker, Delivery};
use crate::config::ConsumerConfig;
use crate::domain::OrderPlacedEvent;
use crate::persistence::DeadLetterStore;

use super::coordinator::{ExecutionCoordinator, ExecutionOutcome};

/// Consumer statistics
#[derive(Debug, Clone, Default)]
pub struct ConsumerStats {
    pub events_received: u64,
    pub events_executed: u64,
    pub events_rejected: u64,
    pub events_replayed: u64,
    pub events_malformed: u64,
    pub events_failed: u64,
    pub last_error: Option<String>,
}

/// Subscribes the coordinator to the inbound placement topic
#[derive(Clone)]
pub struct PlacementConsumer {
    config: ConsumerConfig,
    topic: String,
    broker: Arc<ChannelBroker>,
    coordinator: Arc<ExecutionCoordinator>,
    dead_letters: Arc<dyn DeadLetterStore>,
    stats: Arc<RwLock<ConsumerStats>>,
    running: Arc<AtomicBool>,
}

impl PlacementConsumer {
    pub fn new(
        config: ConsumerConfig,
        topic: &str,
        broker: Arc<ChannelBroker>,
        coordinator: Arc<ExecutionCoordinator>,
        dead_letters: Arc<dyn DeadLetterStore>,
    ) -> Self {
        Self {
            config,
            topic: topic.to_string(),
            broker,
            coordinator,
            dead_letters,
            stats: Arc::new(RwLock::new(ConsumerStats::default())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle one delivery. Returns true if it was acknowledged, false if it
    /// was returned to the broker for redelivery.
    async fn handle(&self, delivery: Delivery) -> bool {
        {
            let mut stats = self.stats.write().await;
            stats.events_received += 1;
        }

        let event = match OrderPlacedEvent::parse(&delivery.message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    topic = %delivery.message.topic,
                    attempt = delivery.attempt,
                    "Malformed placement event: {}", e
                );
                // Dead-letter, then ack. If the dead-letter write itself
                // fails, the delivery goes back so nothing is lost.
                if let Err(dlq_err) = self
                    .dead_letters
                    .record_dead_letter(&self.topic, &delivery.message.payload, &e.to_string())
                    .await
                {
                    error!("Failed to dead-letter payload: {}", dlq_err);
                    self.broker.redeliver(delivery).await;
                    return false;
                }
                let mut stats = self.stats.write().await;
                stats.events_malformed += 1;
                self.broker.ack(delivery);
                return true;
            }
        };

        match self.coordinator.process(&event).await {
            Ok(outcome) => {
                let mut stats = self.stats.write().await;
                match outcome {
                    ExecutionOutcome::Executed => stats.events_executed += 1,
                    ExecutionOutcome::Rejected { .. } => stats.events_rejected += 1,
                    ExecutionOutcome::Replayed => stats.events_replayed += 1,
                }
                drop(stats);
                self.broker.ack(delivery);
                true
            }
            Err(e) => {
                warn!(
                    order_id = event.order_id,
                    attempt = delivery.attempt,
                    "Processing failed, returning for redelivery: {}", e
                );
                let mut stats = self.stats.write().await;
                stats.events_failed += 1;
                stats.last_error = Some(e.to_string());
                drop(stats);
                self.broker.redeliver(delivery).await;
                false
            }
        }
    }

    /// Process at most one queued delivery without blocking. Returns whether
    /// a delivery was handled. Deterministic entry point for tests.
    pub async fn poll_once(&self) -> bool {
        match self.broker.try_next(&self.topic).await {
            Some(delivery) => {
                self.handle(delivery).await;
                true
            }
            None => false,
        }
    }

    /// Start the consumer loop
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!("Placement consumer started (topic: {})", self.topic);

        let consumer = self.clone();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let redelivery_delay = Duration::from_millis(self.config.redelivery_delay_ms);

        tokio::spawn(async move {
            while consumer.running.load(Ordering::SeqCst) {
                match tokio::time::timeout(poll_interval, consumer.broker.recv(&consumer.topic))
                    .await
                {
                    Ok(delivery) => {
                        let acked = consumer.handle(delivery).await;
                        if !acked {
                            // The failed unit sits at the front of the queue;
                            // pause before picking it up again.
                            tokio::time::sleep(redelivery_delay).await;
                        }
                    }
                    // Poll timeout; loop around and re-check the stop flag
                    Err(_) => continue,
                }
            }

            info!("Placement consumer stopped");
        });
    }

    /// Stop the consumer loop
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get current statistics
    pub async fn stats(&self) -> ConsumerStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{EventPublisher, InMemoryStore, Message};
    use crate::execution::decider::AcceptAll;
    use serde_json::json;

    const PLACED_TOPIC: &str = "order.placed.event";
    const EXECUTED_TOPIC: &str = "order.executed.event";

    fn placement_payload(order_id: i64) -> serde_json::Value {
        json!({
            "orderId": order_id,
            "userId": 7,
            "ticker": "ABC",
            "quantity": 10,
            "price": "25.50",
            "side": "BUY"
        })
    }

    fn consumer_with(store: Arc<InMemoryStore>, broker: Arc<ChannelBroker>) -> PlacementConsumer {
        let coordinator = Arc::new(ExecutionCoordinator::new(
            store.clone(),
            Arc::new(AcceptAll),
            EXECUTED_TOPIC,
        ));
        PlacementConsumer::new(
            ConsumerConfig::default(),
            PLACED_TOPIC,
            broker,
            coordinator,
            store,
        )
    }

    async fn publish_placement(broker: &ChannelBroker, order_id: i64) {
        broker
            .publish(Message::new(
                PLACED_TOPIC,
                &order_id.to_string(),
                "order.placed",
                placement_payload(order_id),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn consumes_and_acks_a_placement() {
        let store = Arc::new(InMemoryStore::new());
        let broker = Arc::new(ChannelBroker::new(16));
        let consumer = consumer_with(store.clone(), broker.clone());

        publish_placement(&broker, 1).await;
        assert!(consumer.poll_once().await);
        assert!(!consumer.poll_once().await);

        assert_eq!(store.order_count().await, 1);
        assert_eq!(broker.depth(PLACED_TOPIC).await, 0);

        let stats = consumer.stats().await;
        assert_eq!(stats.events_received, 1);
        assert_eq!(stats.events_executed, 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_dead_lettered_and_acked() {
        let store = Arc::new(InMemoryStore::new());
        let broker = Arc::new(ChannelBroker::new(16));
        let consumer = consumer_with(store.clone(), broker.clone());

        broker
            .publish(Message::new(
                PLACED_TOPIC,
                "1",
                "order.placed",
                json!({ "orderId": 1, "quantity": -5 }),
            ))
            .await
            .unwrap();

        assert!(consumer.poll_once().await);

        // dropped, not requeued
        assert_eq!(broker.depth(PLACED_TOPIC).await, 0);
        assert_eq!(store.order_count().await, 0);

        let dead = store.dead_letter_entries().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].topic, PLACED_TOPIC);

        let stats = consumer.stats().await;
        assert_eq!(stats.events_malformed, 1);
    }

    #[tokio::test]
    async fn storage_failure_returns_delivery_for_redelivery() {
        let store = Arc::new(InMemoryStore::new());
        let broker = Arc::new(ChannelBroker::new(16));
        let consumer = consumer_with(store.clone(), broker.clone());

        publish_placement(&broker, 1).await;
        store.set_storage_down(true);

        assert!(consumer.poll_once().await);
        // back on the queue, attempt bumped
        assert_eq!(broker.depth(PLACED_TOPIC).await, 1);
        assert_eq!(store.order_count().await, 0);

        store.set_storage_down(false);
        assert!(consumer.poll_once().await);
        assert_eq!(broker.depth(PLACED_TOPIC).await, 0);
        assert_eq!(store.order_count().await, 1);

        let stats = consumer.stats().await;
        assert_eq!(stats.events_failed, 1);
        assert_eq!(stats.events_executed, 1);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_replayed_not_reprocessed() {
        let store = Arc::new(InMemoryStore::new());
        let broker = Arc::new(ChannelBroker::new(16));
        let consumer = consumer_with(store.clone(), broker.clone());

        publish_placement(&broker, 1).await;
        publish_placement(&broker, 1).await;

        assert!(consumer.poll_once().await);
        assert!(consumer.poll_once().await);

        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.outbox_entries().await.len(), 1);

        let stats = consumer.stats().await;
        assert_eq!(stats.events_executed, 1);
        assert_eq!(stats.events_replayed, 1);
    }
}
