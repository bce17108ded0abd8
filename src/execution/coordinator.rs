//! Execution coordinator: the per-event state machine.
//!
//! For every inbound placement event: load-or-create the order, short-circuit
//! if it already reached a terminal status, otherwise ask the decider and
//! persist the outcome. An accepted outcome commits the EXECUTED row and the
//! outbound event in one transaction (the outbox), so a crash between
//! persistence and publication cannot lose or duplicate the event.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Order, OrderExecutedEvent, OrderPlacedEvent};
use crate::error::Result;
use crate::persistence::{OrderStore, OutboxRecord};

use super::decider::{Decision, ExecutionDecider};

/// What happened to one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Order accepted; EXECUTED row and outbound event committed together
    Executed,
    /// Order rejected; REJECTED row committed, nothing published
    Rejected { reason: String },
    /// Order was already terminal; redelivery acknowledged with no effect
    Replayed,
}

/// Orchestrates store, decider, and outbox per inbound event.
///
/// Holds no mutable state of its own; the store's atomic upsert is the
/// serialization point for concurrent workers on the same order id.
pub struct ExecutionCoordinator {
    store: Arc<dyn OrderStore>,
    decider: Arc<dyn ExecutionDecider>,
    executed_topic: String,
}

impl ExecutionCoordinator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        decider: Arc<dyn ExecutionDecider>,
        executed_topic: &str,
    ) -> Self {
        Self {
            store,
            decider,
            executed_topic: executed_topic.to_string(),
        }
    }

    /// Process one placement event through the lifecycle.
    ///
    /// Any error aborts the unit without acknowledgment; the idempotent
    /// store writes make the retry safe.
    #[instrument(skip(self, event), fields(order_id = event.order_id, ticker = %event.ticker))]
    pub async fn process(&self, event: &OrderPlacedEvent) -> Result<ExecutionOutcome> {
        let mut order = match self.store.find_by_id(event.order_id).await? {
            Some(existing) if existing.status.is_terminal() => {
                debug!(
                    "Order {} already {}; acknowledging replay",
                    existing.id, existing.status
                );
                return Ok(ExecutionOutcome::Replayed);
            }
            Some(existing) => existing,
            None => {
                let order = Order::from_placement(event, Utc::now());
                self.store.upsert(&order).await?;
                debug!("Created order {} as {}", order.id, order.status);
                order
            }
        };

        let decision = match self.decider.decide(&order).await {
            Ok(decision) => decision,
            Err(e) => {
                // Decider failures are not process failures; the order is
                // rejected with a system-generated reason.
                warn!("Decider failed for order {}: {}", order.id, e);
                Decision::Rejected {
                    reason: format!("decider failure: {e}"),
                }
            }
        };

        match decision {
            Decision::Accepted => {
                order.execute(Utc::now())?;
                let executed = OrderExecutedEvent::from_order(&order)?;
                let record = OutboxRecord::for_execution(&self.executed_topic, &executed)?;
                self.store.upsert_with_outbox(&order, &record).await?;
                info!("Order {} executed", order.id);
                Ok(ExecutionOutcome::Executed)
            }
            Decision::Rejected { reason } => {
                order.reject(Utc::now())?;
                self.store.upsert(&order).await?;
                info!("Order {} rejected: {}", order.id, reason);
                Ok(ExecutionOutcome::Rejected { reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::{OrderSide, OrderStatus};
    use crate::error::ExecutionError;
    use crate::execution::decider::{AcceptAll, MockExecutionDecider};
    use rust_decimal_macros::dec;
    use serde_json::json;

    const EXECUTED_TOPIC: &str = "order.executed.event";

    fn placement() -> OrderPlacedEvent {
        OrderPlacedEvent {
            order_id: 1,
            user_id: 7,
            ticker: "ABC".to_string(),
            quantity: 10,
            price: dec!(25.50),
            side: OrderSide::Buy,
        }
    }

    fn coordinator_with(
        store: Arc<InMemoryStore>,
        decider: Arc<dyn ExecutionDecider>,
    ) -> ExecutionCoordinator {
        ExecutionCoordinator::new(store, decider, EXECUTED_TOPIC)
    }

    #[tokio::test]
    async fn accepted_order_is_executed_and_staged() {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = coordinator_with(store.clone(), Arc::new(AcceptAll));

        let outcome = coordinator.process(&placement()).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Executed);

        let order = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Executed);
        assert!(order.updated_at >= order.created_at);

        let outbox = store.outbox_entries().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].topic, EXECUTED_TOPIC);
        assert_eq!(outbox[0].partition_key, "ABC");
        assert_eq!(outbox[0].event_type, "order.executed");

        // outbound payload mirrors the inbound fields
        let payload = &outbox[0].payload;
        assert_eq!(payload["orderId"], json!(1));
        assert_eq!(payload["userId"], json!(7));
        assert_eq!(payload["ticker"], json!("ABC"));
        assert_eq!(payload["quantity"], json!(10));
        assert_eq!(payload["price"], json!("25.50"));
        assert_eq!(payload["side"], json!("BUY"));
    }

    #[tokio::test]
    async fn replayed_event_does_not_stage_twice() {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = coordinator_with(store.clone(), Arc::new(AcceptAll));

        assert_eq!(
            coordinator.process(&placement()).await.unwrap(),
            ExecutionOutcome::Executed
        );
        for _ in 0..3 {
            assert_eq!(
                coordinator.process(&placement()).await.unwrap(),
                ExecutionOutcome::Replayed
            );
        }

        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.outbox_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn rejected_order_stages_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let mut decider = MockExecutionDecider::new();
        decider.expect_decide().returning(|_| {
            Ok(Decision::Rejected {
                reason: "insufficient funds".to_string(),
            })
        });
        let coordinator = coordinator_with(store.clone(), Arc::new(decider));

        let outcome = coordinator.process(&placement()).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Rejected {
                reason: "insufficient funds".to_string()
            }
        );

        let order = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
        assert!(store.outbox_entries().await.is_empty());

        // redelivery of the same event is a no-op replay
        assert_eq!(
            coordinator.process(&placement()).await.unwrap(),
            ExecutionOutcome::Replayed
        );
    }

    #[tokio::test]
    async fn decider_error_becomes_rejection() {
        let store = Arc::new(InMemoryStore::new());
        let mut decider = MockExecutionDecider::new();
        decider
            .expect_decide()
            .returning(|_| Err(ExecutionError::Internal("price feed timeout".to_string())));
        let coordinator = coordinator_with(store.clone(), Arc::new(decider));

        let outcome = coordinator.process(&placement()).await.unwrap();
        match outcome {
            ExecutionOutcome::Rejected { reason } => {
                assert!(reason.contains("decider failure"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        let order = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn storage_outage_aborts_without_side_effects() {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = coordinator_with(store.clone(), Arc::new(AcceptAll));

        store.set_storage_down(true);
        let err = coordinator.process(&placement()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::StorageUnavailable(_)));

        store.set_storage_down(false);
        assert_eq!(store.order_count().await, 0);
        assert!(store.outbox_entries().await.is_empty());

        // redelivery after recovery completes normally
        assert_eq!(
            coordinator.process(&placement()).await.unwrap(),
            ExecutionOutcome::Executed
        );
        assert_eq!(store.outbox_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn executed_at_matches_persisted_updated_at() {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = coordinator_with(store.clone(), Arc::new(AcceptAll));

        coordinator.process(&placement()).await.unwrap();

        let order = store.find_by_id(1).await.unwrap().unwrap();
        let payload = &store.outbox_entries().await[0].payload;
        let executed_at: chrono::DateTime<Utc> =
            serde_json::from_value(payload["executedAt"].clone()).unwrap();
        assert_eq!(executed_at, order.updated_at);
    }
}
