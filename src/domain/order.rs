use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, Result};

use super::OrderPlacedEvent;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderSide {
    type Error = ExecutionError;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(ExecutionError::Internal(format!(
                "unknown order side: {other}"
            ))),
        }
    }
}

/// Order status
///
/// Transitions are forward-only: SUBMITTED may move to EXECUTED or REJECTED,
/// both of which are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Persisted on first observation of a placement event
    Submitted,
    /// Accepted by the decider
    Executed,
    /// Rejected by the decider
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Executed | OrderStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Executed => "EXECUTED",
            OrderStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = ExecutionError;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "SUBMITTED" => Ok(OrderStatus::Submitted),
            "EXECUTED" => Ok(OrderStatus::Executed),
            "REJECTED" => Ok(OrderStatus::Rejected),
            other => Err(ExecutionError::Internal(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

/// Order (tracked in our system)
///
/// The id is assigned by the upstream placement service and is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub ticker: String,
    pub quantity: i64,
    pub price: Decimal,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build the initial SUBMITTED record from a placement event
    pub fn from_placement(event: &OrderPlacedEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: event.order_id,
            user_id: event.user_id,
            ticker: event.ticker.clone(),
            quantity: event.quantity,
            price: event.price,
            side: event.side,
            status: OrderStatus::Submitted,
            created_at: now,
            updated_at: now,
        }
    }

    /// Dollar value of the order
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Transition to EXECUTED. Only valid from SUBMITTED.
    pub fn execute(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(OrderStatus::Executed, now)
    }

    /// Transition to REJECTED. Only valid from SUBMITTED.
    pub fn reject(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(OrderStatus::Rejected, now)
    }

    fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(ExecutionError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        // updated_at never regresses, even if the caller's clock does
        self.updated_at = now.max(self.updated_at);
        Ok(())
    }
}
