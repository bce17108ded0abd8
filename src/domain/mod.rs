//! Domain model: the order entity, its status state machine, and the wire
//! events that move it through the pipeline.

mod events;
mod order;

pub use events::{
    OrderExecutedEvent, OrderPlacedEvent, ORDER_EXECUTED_EVENT_TYPE, ORDER_PLACED_EVENT_TYPE,
};
pub use order::{Order, OrderSide, OrderStatus};
