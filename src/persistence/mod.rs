//! Storage contracts and the outbox relay.

mod outbox;
mod store;

pub use outbox::{OutboxRelay, RelayStats};
pub use store::{DeadLetterStore, OrderStore, OutboxEntry, OutboxRecord, OutboxStore};
