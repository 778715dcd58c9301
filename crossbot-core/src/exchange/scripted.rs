//! In-memory collaborators with scripted behaviour.
//!
//! `ScriptedExchange` keeps balances, a price and a queue of forced
//! rejections, and settles accepted market orders against its balances so
//! the asset state flips the way it would on a real account.

use super::{Exchange, ExchangeError, HistorySource, Transport, TransportError, TransportEvent};
use crate::domain::{Bar, Fill, InstrumentSpec, Interval, OrderRequest, OrderSide};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

/// Error code the exchange uses for "insufficient balance".
pub const INSUFFICIENT_BALANCE: i64 = -2010;

#[derive(Debug)]
struct ExchangeState {
    instrument: InstrumentSpec,
    price: Decimal,
    balances: HashMap<String, Decimal>,
    commission_rate: Decimal,
    queued_errors: VecDeque<ExchangeError>,
    sticky_error: Option<ExchangeError>,
    query_error: Option<ExchangeError>,
    submitted: Vec<OrderRequest>,
    validated: Vec<OrderRequest>,
}

#[derive(Debug)]
pub struct ScriptedExchange {
    state: RefCell<ExchangeState>,
}

impl ScriptedExchange {
    pub fn new(instrument: InstrumentSpec, price: Decimal) -> Self {
        Self {
            state: RefCell::new(ExchangeState {
                instrument,
                price,
                balances: HashMap::new(),
                commission_rate: Decimal::ZERO,
                queued_errors: VecDeque::new(),
                sticky_error: None,
                query_error: None,
                submitted: Vec::new(),
                validated: Vec::new(),
            }),
        }
    }

    pub fn with_balance(self, asset: &str, amount: Decimal) -> Self {
        self.set_balance(asset, amount);
        self
    }

    /// Commission charged on the received asset, as a fraction.
    pub fn with_commission_rate(self, rate: Decimal) -> Self {
        self.state.borrow_mut().commission_rate = rate;
        self
    }

    pub fn set_price(&self, price: Decimal) {
        self.state.borrow_mut().price = price;
    }

    pub fn set_balance(&self, asset: &str, amount: Decimal) {
        self.state
            .borrow_mut()
            .balances
            .insert(asset.to_string(), amount);
    }

    /// Fail the next order submission (live or validation) with `error`.
    pub fn reject_next(&self, error: ExchangeError) {
        self.state.borrow_mut().queued_errors.push_back(error);
    }

    /// Fail every order submission with `error` until cleared.
    pub fn reject_always(&self, error: Option<ExchangeError>) {
        self.state.borrow_mut().sticky_error = error;
    }

    /// Fail balance and price queries with `error` until cleared.
    pub fn fail_queries(&self, error: Option<ExchangeError>) {
        self.state.borrow_mut().query_error = error;
    }

    /// Every live order submitted, accepted or not.
    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.state.borrow().submitted.clone()
    }

    /// Every validation-only order submitted.
    pub fn validated(&self) -> Vec<OrderRequest> {
        self.state.borrow().validated.clone()
    }

    fn forced_error(state: &mut ExchangeState) -> Option<ExchangeError> {
        state
            .queued_errors
            .pop_front()
            .or_else(|| state.sticky_error.clone())
    }
}

fn insufficient_balance() -> ExchangeError {
    ExchangeError::Rejected {
        code: INSUFFICIENT_BALANCE,
        message: "Account has insufficient balance for requested action.".into(),
    }
}

impl Exchange for ScriptedExchange {
    fn instrument(&self, symbol: &str) -> Result<InstrumentSpec, ExchangeError> {
        let state = self.state.borrow();
        if state.instrument.symbol != symbol {
            return Err(ExchangeError::Unknown(symbol.to_string()));
        }
        Ok(state.instrument.clone())
    }

    fn balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        let state = self.state.borrow();
        if let Some(err) = &state.query_error {
            return Err(err.clone());
        }
        Ok(state.balances.get(asset).copied().unwrap_or(Decimal::ZERO))
    }

    fn price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let state = self.state.borrow();
        if let Some(err) = &state.query_error {
            return Err(err.clone());
        }
        if state.instrument.symbol != symbol {
            return Err(ExchangeError::Unknown(symbol.to_string()));
        }
        Ok(state.price)
    }

    fn submit_order(&self, order: &OrderRequest) -> Result<Fill, ExchangeError> {
        let mut state = self.state.borrow_mut();
        state.submitted.push(order.clone());
        if let Some(err) = Self::forced_error(&mut state) {
            return Err(err);
        }
        if order.quantity <= Decimal::ZERO {
            return Err(ExchangeError::Rejected {
                code: -1013,
                message: "Filter failure: LOT_SIZE".into(),
            });
        }

        let price = state.price;
        let rate = state.commission_rate;
        let base = state.instrument.base_asset.clone();
        let quote = state.instrument.quote_asset.clone();
        let base_balance = state.balances.get(&base).copied().unwrap_or_default();
        let quote_balance = state.balances.get(&quote).copied().unwrap_or_default();
        let notional = order.quantity * price;

        let (commission, commission_asset) = match order.side {
            OrderSide::Buy => {
                if notional > quote_balance {
                    return Err(insufficient_balance());
                }
                let commission = order.quantity * rate;
                state
                    .balances
                    .insert(base.clone(), base_balance + order.quantity - commission);
                state.balances.insert(quote, quote_balance - notional);
                (commission, base)
            }
            OrderSide::Sell => {
                if order.quantity > base_balance {
                    return Err(insufficient_balance());
                }
                let commission = notional * rate;
                state.balances.insert(base, base_balance - order.quantity);
                state
                    .balances
                    .insert(quote.clone(), quote_balance + notional - commission);
                (commission, quote)
            }
        };

        Ok(Fill {
            side: order.side,
            price,
            quantity: order.quantity,
            commission,
            commission_asset,
        })
    }

    fn validate_order(&self, order: &OrderRequest) -> Result<(), ExchangeError> {
        let mut state = self.state.borrow_mut();
        state.validated.push(order.clone());
        match Self::forced_error(&mut state) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Backfill source over a fixed set of bars.
#[derive(Debug, Default)]
pub struct ScriptedHistory {
    bars: Vec<Bar>,
    error: Option<ExchangeError>,
}

impl ScriptedHistory {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars, error: None }
    }

    pub fn failing(error: ExchangeError) -> Self {
        Self {
            bars: Vec::new(),
            error: Some(error),
        }
    }
}

impl HistorySource for ScriptedHistory {
    fn get_bars(
        &self,
        _symbol: &str,
        _interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, ExchangeError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        Ok(self
            .bars
            .iter()
            .filter(|b| b.open_time >= start && b.open_time <= end)
            .cloned()
            .collect())
    }
}

/// Transport that replays a fixed list of polls, then reports `Closed`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    events: VecDeque<Result<TransportEvent, TransportError>>,
    started: Option<(String, Interval)>,
    stopped: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_message(&mut self, raw: impl Into<String>) {
        self.events
            .push_back(Ok(TransportEvent::Message(raw.into())));
    }

    pub fn push_idle(&mut self) {
        self.events.push_back(Ok(TransportEvent::Idle));
    }

    pub fn push_error(&mut self, error: TransportError) {
        self.events.push_back(Err(error));
    }

    /// `(symbol, interval)` passed to `start`, if it was called.
    pub fn started(&self) -> Option<&(String, Interval)> {
        self.started.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl Transport for ScriptedTransport {
    fn start(&mut self, symbol: &str, interval: Interval) -> Result<(), TransportError> {
        self.started = Some((symbol.to_string(), interval));
        self.stopped = false;
        Ok(())
    }

    fn next_event(&mut self) -> Result<TransportEvent, TransportError> {
        if self.started.is_none() || self.stopped {
            return Err(TransportError::NotStarted);
        }
        self.events
            .pop_front()
            .unwrap_or(Ok(TransportEvent::Closed))
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        self.stopped = true;
        Ok(())
    }
}
