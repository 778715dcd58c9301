//! Trade execution: per-bar decision and order attempts.
//!
//! - Decision table: crossover × asset state → BUY, SELL or HOLD
//! - Quantity sizing from balances (live) or a nominal quantity (paper)
//! - Bounded quantity-reduction retry on rejection

pub mod executor;

pub use executor::{CycleOutcome, ExecutionError, ExecutorState, TradeExecutor};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Live orders or validation-only orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Real MARKET orders sized from balances.
    Live,
    /// Orders sent to the no-risk validation endpoint with a fixed quantity.
    Paper,
}

impl ExecutionMode {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            ExecutionMode::Live
        } else {
            ExecutionMode::Paper
        }
    }
}

/// Sizing and retry parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Fraction of the available balance committed per trade (0, 1].
    pub scale: Decimal,
    /// Quantity used in paper mode.
    pub paper_quantity: Decimal,
    /// Hard cap on submissions per cycle.
    pub max_attempts: u32,
    /// Quote-denominated band below which base holdings count as dust.
    pub dust_tolerance: Decimal,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            scale: Decimal::ONE,
            paper_quantity: Decimal::new(2, 3),
            max_attempts: 25,
            dust_tolerance: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ExecutorConfigError {
    #[error("scale must be in (0, 1], got {0}")]
    Scale(Decimal),

    #[error("paper_quantity must be positive, got {0}")]
    PaperQuantity(Decimal),

    #[error("max_attempts must be >= 1")]
    MaxAttempts,

    #[error("dust_tolerance must not be negative, got {0}")]
    DustTolerance(Decimal),
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<(), ExecutorConfigError> {
        if self.scale <= Decimal::ZERO || self.scale > Decimal::ONE {
            return Err(ExecutorConfigError::Scale(self.scale));
        }
        if self.paper_quantity <= Decimal::ZERO {
            return Err(ExecutorConfigError::PaperQuantity(self.paper_quantity));
        }
        if self.max_attempts == 0 {
            return Err(ExecutorConfigError::MaxAttempts);
        }
        if self.dust_tolerance < Decimal::ZERO {
            return Err(ExecutorConfigError::DustTolerance(self.dust_tolerance));
        }
        Ok(())
    }
}
