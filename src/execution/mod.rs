//! Event-driven execution workflow: decider, coordinator, and the inbound
//! consumer loop.

mod consumer;
mod coordinator;
mod decider;

pub use consumer::{ConsumerStats, PlacementConsumer};
pub use coordinator::{ExecutionCoordinator, ExecutionOutcome};
pub use decider::{decider_from_config, AcceptAll, Decision, ExecutionDecider, MaxNotional};
