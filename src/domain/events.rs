//! Wire-level event payloads.
//!
//! Inbound placement events arrive as JSON on the placed-order topic and are
//! validated before any state is touched. Outbound execution events are
//! written to the outbox and published with the ticker as partition key so
//! executions for one instrument stay ordered.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, Result};

use super::{Order, OrderSide, OrderStatus};

/// Type discriminator attached to outbound execution events
pub const ORDER_EXECUTED_EVENT_TYPE: &str = "order.executed";

/// Type discriminator carried by inbound placement events
pub const ORDER_PLACED_EVENT_TYPE: &str = "order.placed";

/// Inbound message signaling a new order was submitted upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlacedEvent {
    pub order_id: i64,
    pub user_id: i64,
    pub ticker: String,
    pub quantity: i64,
    pub price: Decimal,
    pub side: OrderSide,
}

impl OrderPlacedEvent {
    /// Deserialize and validate a raw payload.
    ///
    /// Any failure here is a `MalformedEvent`: the delivery is dead-lettered
    /// and acknowledged instead of being retried forever.
    pub fn parse(payload: &serde_json::Value) -> Result<Self> {
        let event: OrderPlacedEvent = serde_json::from_value(payload.clone())
            .map_err(|e| ExecutionError::MalformedEvent(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    fn validate(&self) -> Result<()> {
        if self.ticker.trim().is_empty() {
            return Err(ExecutionError::MalformedEvent(
                "ticker must not be empty".to_string(),
            ));
        }
        if self.quantity <= 0 {
            return Err(ExecutionError::MalformedEvent(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.price < Decimal::ZERO {
            return Err(ExecutionError::MalformedEvent(format!(
                "price must be non-negative, got {}",
                self.price
            )));
        }
        Ok(())
    }
}

/// Outbound message signaling an order completed execution with an accepted
/// outcome. Field for field a copy of the originating placement, plus the
/// execution timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderExecutedEvent {
    pub order_id: i64,
    pub user_id: i64,
    pub ticker: String,
    pub quantity: i64,
    pub price: Decimal,
    pub side: OrderSide,
    pub executed_at: DateTime<Utc>,
}

impl OrderExecutedEvent {
    /// Build the execution event from an EXECUTED order. `executed_at` is
    /// the persisted `updated_at` of the transition, not a fresh clock read.
    pub fn from_order(order: &Order) -> Result<Self> {
        if order.status != OrderStatus::Executed {
            return Err(ExecutionError::Internal(format!(
                "cannot build execution event for order {} in status {}",
                order.id, order.status
            )));
        }
        Ok(Self {
            order_id: order.id,
            user_id: order.user_id,
            ticker: order.ticker.clone(),
            quantity: order.quantity,
            price: order.price,
            side: order.side,
            executed_at: order.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parse_accepts_well_formed_payload() {
        let payload = json!({
            "orderId": 1,
            "userId": 7,
            "ticker": "ABC",
            "quantity": 10,
            "price": "25.50",
            "side": "BUY"
        });

        let event = OrderPlacedEvent::parse(&payload).unwrap();
        assert_eq!(event.order_id, 1);
        assert_eq!(event.user_id, 7);
        assert_eq!(event.ticker, "ABC");
        assert_eq!(event.quantity, 10);
        assert_eq!(event.price, dec!(25.50));
        assert_eq!(event.side, OrderSide::Buy);
    }

    #[test]
    fn parse_accepts_numeric_price() {
        let payload = json!({
            "orderId": 2,
            "userId": 3,
            "ticker": "XYZ",
            "quantity": 5,
            "price": 10.25,
            "side": "SELL"
        });

        let event = OrderPlacedEvent::parse(&payload).unwrap();
        assert_eq!(event.price, dec!(10.25));
    }

    #[test]
    fn parse_rejects_missing_fields() {
        let payload = json!({ "orderId": 1, "userId": 7 });
        let err = OrderPlacedEvent::parse(&payload).unwrap_err();
        assert!(matches!(err, ExecutionError::MalformedEvent(_)));
    }

    #[test]
    fn parse_rejects_non_positive_quantity() {
        let payload = json!({
            "orderId": 1,
            "userId": 7,
            "ticker": "ABC",
            "quantity": 0,
            "price": "25.50",
            "side": "BUY"
        });
        let err = OrderPlacedEvent::parse(&payload).unwrap_err();
        assert!(matches!(err, ExecutionError::MalformedEvent(_)));
    }

    #[test]
    fn parse_rejects_negative_price() {
        let payload = json!({
            "orderId": 1,
            "userId": 7,
            "ticker": "ABC",
            "quantity": 1,
            "price": "-0.01",
            "side": "BUY"
        });
        assert!(OrderPlacedEvent::parse(&payload).is_err());
    }

    #[test]
    fn parse_rejects_unknown_side() {
        let payload = json!({
            "orderId": 1,
            "userId": 7,
            "ticker": "ABC",
            "quantity": 1,
            "price": "1.00",
            "side": "SHORT"
        });
        assert!(OrderPlacedEvent::parse(&payload).is_err());
    }

    #[test]
    fn executed_event_copies_order_fields() {
        let placement = OrderPlacedEvent {
            order_id: 1,
            user_id: 7,
            ticker: "ABC".to_string(),
            quantity: 10,
            price: dec!(25.50),
            side: OrderSide::Buy,
        };
        let mut order = Order::from_placement(&placement, Utc::now());
        order.execute(Utc::now()).unwrap();

        let event = OrderExecutedEvent::from_order(&order).unwrap();
        assert_eq!(event.order_id, placement.order_id);
        assert_eq!(event.user_id, placement.user_id);
        assert_eq!(event.ticker, placement.ticker);
        assert_eq!(event.quantity, placement.quantity);
        assert_eq!(event.price, placement.price);
        assert_eq!(event.side, placement.side);
        assert_eq!(event.executed_at, order.updated_at);
    }

    #[test]
    fn executed_event_requires_executed_status() {
        let placement = OrderPlacedEvent {
            order_id: 1,
            user_id: 7,
            ticker: "ABC".to_string(),
            quantity: 10,
            price: dec!(25.50),
            side: OrderSide::Buy,
        };
        let order = Order::from_placement(&placement, Utc::now());
        assert!(OrderExecutedEvent::from_order(&order).is_err());
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let placement = OrderPlacedEvent {
            order_id: 1,
            user_id: 7,
            ticker: "ABC".to_string(),
            quantity: 10,
            price: dec!(25.50),
            side: OrderSide::Buy,
        };
        let mut order = Order::from_placement(&placement, Utc::now());
        order.execute(Utc::now()).unwrap();
        let event = OrderExecutedEvent::from_order(&order).unwrap();

        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("orderId").is_some());
        assert!(value.get("executedAt").is_some());
        assert_eq!(value["side"], "BUY");
    }
}
