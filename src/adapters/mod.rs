//! Concrete adapters: PostgreSQL storage, the in-process channel broker,
//! and the in-memory store used by tests.

mod channel_bus;
mod memory;
mod postgres;

pub use channel_bus::{ChannelBroker, Delivery, EventPublisher, Message};
pub use memory::{DeadLetter, InMemoryStore};
pub use postgres::PostgresStore;
