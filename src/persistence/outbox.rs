//! Outbox relay.
//!
//! Drains pending outbox rows to the event publisher on an interval. A row
//! is marked published only after the publisher accepts it, so a crash
//! anywhere in the cycle leaves the row pending and the next cycle retries.
//! Delivery is therefore at-least-once; downstream consumers dedup on the
//! event id carried in the envelope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::adapters::{EventPublisher, Message};
use crate::config::OutboxConfig;
use crate::error::Result;

use super::store::OutboxStore;

/// Relay statistics
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub rows_published: u64,
    pub rows_failed: u64,
    pub last_run: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}

/// Periodic drain of the transactional outbox
#[derive(Clone)]
pub struct OutboxRelay {
    config: OutboxConfig,
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn EventPublisher>,
    stats: Arc<RwLock<RelayStats>>,
    running: Arc<AtomicBool>,
}

impl OutboxRelay {
    pub fn new(
        config: OutboxConfig,
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            config,
            store,
            publisher,
            stats: Arc::new(RwLock::new(RelayStats::default())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(store: Arc<dyn OutboxStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self::new(OutboxConfig::default(), store, publisher)
    }

    /// Run a single drain cycle. Returns (published, failed).
    pub async fn drain_once(&self) -> Result<(u64, u64)> {
        let entries = self.store.pending_outbox(self.config.batch_size).await?;

        let mut published = 0u64;
        let mut failed = 0u64;

        for entry in entries {
            let message = Message::new(
                &entry.topic,
                &entry.partition_key,
                &entry.event_type,
                entry.payload.clone(),
            )
            .with_event_id(entry.event_id);

            match self.publisher.publish(message).await {
                Ok(()) => {
                    // If the mark fails the row stays pending and will be
                    // republished next cycle; downstream dedups on event_id.
                    if let Err(e) = self.store.mark_published(entry.id).await {
                        error!("Failed to mark outbox row {} published: {}", entry.id, e);
                        failed += 1;
                        let mut stats = self.stats.write().await;
                        stats.last_error = Some(e.to_string());
                    } else {
                        debug!(
                            "Published outbox row {} ({} key {})",
                            entry.id, entry.event_type, entry.partition_key
                        );
                        published += 1;
                    }
                }
                Err(e) => {
                    warn!("Publish failed for outbox row {}: {}", entry.id, e);
                    failed += 1;
                    let mut stats = self.stats.write().await;
                    stats.last_error = Some(e.to_string());
                }
            }
        }

        let mut stats = self.stats.write().await;
        stats.rows_published += published;
        stats.rows_failed += failed;
        stats.last_run = Some(chrono::Utc::now());

        Ok((published, failed))
    }

    /// Start the relay daemon
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Outbox relay started (interval: {}ms, batch: {})",
            self.config.drain_interval_ms, self.config.batch_size
        );

        let relay = self.clone();
        let interval = Duration::from_millis(self.config.drain_interval_ms);

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);

            while relay.running.load(Ordering::SeqCst) {
                timer.tick().await;

                if let Err(e) = relay.drain_once().await {
                    error!("Outbox drain cycle failed: {}", e);
                    let mut stats = relay.stats.write().await;
                    stats.last_error = Some(e.to_string());
                }
            }

            info!("Outbox relay stopped");
        });
    }

    /// Stop the relay daemon
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get current statistics
    pub async fn stats(&self) -> RelayStats {
        self.stats.read().await.clone()
    }
}
