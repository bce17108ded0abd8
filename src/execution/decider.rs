//! Execution decisioning.
//!
//! The decider is the pluggable seam for validation and risk checks. Both
//! outcomes are legitimate terminal decisions; a decider error is downgraded
//! to a rejection by the coordinator rather than failing the processing unit.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::DeciderConfig;
use crate::domain::Order;
use crate::error::Result;

/// Outcome of an execution decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected { reason: String },
}

/// Accept/reject capability invoked once per non-terminal order.
///
/// Implementations must not mutate the order; fund checks or price feeds
/// they consult are their own concern.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionDecider: Send + Sync {
    async fn decide(&self, order: &Order) -> Result<Decision>;
}

/// Accepts every order. Mirrors the upstream placeholder behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl ExecutionDecider for AcceptAll {
    async fn decide(&self, _order: &Order) -> Result<Decision> {
        Ok(Decision::Accepted)
    }
}

/// Rejects orders whose notional value exceeds a fixed limit
#[derive(Debug, Clone)]
pub struct MaxNotional {
    limit: Decimal,
}

impl MaxNotional {
    pub fn new(limit: Decimal) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl ExecutionDecider for MaxNotional {
    async fn decide(&self, order: &Order) -> Result<Decision> {
        let notional = order.notional();
        if notional > self.limit {
            Ok(Decision::Rejected {
                reason: format!("notional {} exceeds limit {}", notional, self.limit),
            })
        } else {
            Ok(Decision::Accepted)
        }
    }
}

/// Build the configured decider
pub fn decider_from_config(config: &DeciderConfig) -> Arc<dyn ExecutionDecider> {
    match config.max_notional_usd {
        Some(limit) => Arc::new(MaxNotional::new(limit)),
        None => Arc::new(AcceptAll),
    }
}
