//! Which side of the pair the account currently holds.
//!
//! There is no stored position. The state is derived on every query by
//! comparing the base balance, valued in quote at the current price, with
//! the quote balance. Near-equal balances or leftover dust can classify
//! either way; `dust_tolerance` (quote units) moves the boundary.

use crate::domain::InstrumentSpec;
use crate::exchange::{Exchange, ExchangeError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetState {
    BaseHeld,
    QuoteHeld,
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetState::BaseHeld => f.write_str("BASE_HELD"),
            AssetState::QuoteHeld => f.write_str("QUOTE_HELD"),
        }
    }
}

/// Balances and price observed for one state query.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSnapshot {
    pub base_balance: Decimal,
    pub quote_balance: Decimal,
    pub price: Decimal,
    pub base_value_in_quote: Decimal,
    pub state: AssetState,
}

#[derive(Debug, Clone)]
pub struct AssetStateTracker {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    dust_tolerance: Decimal,
}

impl AssetStateTracker {
    pub fn new(instrument: &InstrumentSpec) -> Self {
        Self {
            symbol: instrument.symbol.clone(),
            base_asset: instrument.base_asset.clone(),
            quote_asset: instrument.quote_asset.clone(),
            dust_tolerance: Decimal::ZERO,
        }
    }

    /// Require the base value to exceed the quote balance by more than
    /// `tolerance` before classifying as base-held.
    pub fn with_dust_tolerance(mut self, tolerance: Decimal) -> Self {
        self.dust_tolerance = tolerance;
        self
    }

    pub fn classify(&self, base_value_in_quote: Decimal, quote_balance: Decimal) -> AssetState {
        if base_value_in_quote - quote_balance > self.dust_tolerance {
            AssetState::BaseHeld
        } else {
            AssetState::QuoteHeld
        }
    }

    /// Query balances and price, and classify.
    pub fn snapshot<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
    ) -> Result<AssetSnapshot, ExchangeError> {
        let price = exchange.price(&self.symbol)?;
        let base_balance = exchange.balance(&self.base_asset)?;
        let quote_balance = exchange.balance(&self.quote_asset)?;
        let base_value_in_quote = base_balance * price;
        let state = self.classify(base_value_in_quote, quote_balance);

        debug!(
            symbol = %self.symbol,
            %base_balance,
            %quote_balance,
            %price,
            %state,
            "asset state"
        );

        Ok(AssetSnapshot {
            base_balance,
            quote_balance,
            price,
            base_value_in_quote,
            state,
        })
    }

    pub fn current_asset<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
    ) -> Result<AssetState, ExchangeError> {
        self.snapshot(exchange).map(|s| s.state)
    }
}
