//! Collaborator interfaces: exchange trading API, historical backfill, and
//! the market-data transport.
//!
//! The core only talks to these traits. Concrete implementations live in
//! `crossbot-binance`; [`scripted`] provides in-memory ones for tests and
//! offline dry runs.

pub mod scripted;

use crate::domain::{Bar, Fill, InstrumentSpec, Interval, OrderRequest};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Structured errors from exchange calls.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("order rejected ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("unknown asset or symbol: {0}")]
    Unknown(String),
}

impl ExchangeError {
    /// Errors the executor answers by shrinking the order and resubmitting.
    /// An expired timeout counts as a rejection rather than a hang.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Rejected { .. } | ExchangeError::Timeout(_) | ExchangeError::Network(_)
        )
    }
}

/// Exchange trading API.
pub trait Exchange {
    /// Symbol metadata (base/quote assets, lot step, minimum quantity).
    fn instrument(&self, symbol: &str) -> Result<InstrumentSpec, ExchangeError>;

    /// Free balance of an asset.
    fn balance(&self, asset: &str) -> Result<Decimal, ExchangeError>;

    /// Latest traded price of a symbol.
    fn price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    /// Place a MARKET order.
    fn submit_order(&self, order: &OrderRequest) -> Result<Fill, ExchangeError>;

    /// Validate a MARKET order against the no-risk test endpoint.
    fn validate_order(&self, order: &OrderRequest) -> Result<(), ExchangeError>;
}

impl<E: Exchange + ?Sized> Exchange for &E {
    fn instrument(&self, symbol: &str) -> Result<InstrumentSpec, ExchangeError> {
        (**self).instrument(symbol)
    }

    fn balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        (**self).balance(asset)
    }

    fn price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        (**self).price(symbol)
    }

    fn submit_order(&self, order: &OrderRequest) -> Result<Fill, ExchangeError> {
        (**self).submit_order(order)
    }

    fn validate_order(&self, order: &OrderRequest) -> Result<(), ExchangeError> {
        (**self).validate_order(order)
    }
}

/// Historical backfill API.
pub trait HistorySource {
    /// Closed bars with `start <= open_time <= end`, oldest first.
    fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, ExchangeError>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("subscription dropped: {0}")]
    Dropped(String),

    #[error("transport not started")]
    NotStarted,
}

/// What one poll of the transport produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A raw stream message (one kline update).
    Message(String),
    /// Nothing arrived within the poll window.
    Idle,
    /// The server closed the subscription cleanly.
    Closed,
}

/// Market-data subscription, started and stopped by the coordinator.
pub trait Transport {
    fn start(&mut self, symbol: &str, interval: Interval) -> Result<(), TransportError>;

    /// Block for at most one poll window.
    fn next_event(&mut self) -> Result<TransportEvent, TransportError>;

    fn stop(&mut self) -> Result<(), TransportError>;
}
