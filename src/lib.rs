pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod execution;
pub mod persistence;

pub use adapters::{ChannelBroker, Delivery, EventPublisher, InMemoryStore, Message, PostgresStore};
pub use config::AppConfig;
pub use domain::{
    Order, OrderExecutedEvent, OrderPlacedEvent, OrderSide, OrderStatus,
    ORDER_EXECUTED_EVENT_TYPE, ORDER_PLACED_EVENT_TYPE,
};
pub use error::{ExecutionError, Result};
pub use execution::{
    decider_from_config, AcceptAll, ConsumerStats, Decision, ExecutionCoordinator,
    ExecutionDecider, ExecutionOutcome, MaxNotional, PlacementConsumer,
};
pub use persistence::{
    DeadLetterStore, OrderStore, OutboxEntry, OutboxRecord, OutboxRelay, OutboxStore, RelayStats,
};
