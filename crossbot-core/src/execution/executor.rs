//! Trade executor state machine.
//!
//! One cycle per closed bar:
//!
//! ```text
//! Idle → Decision → Attempting → { Filled | Aborted } → Done
//!            └──────────── HOLD ─────────────────────→ Done
//! ```
//!
//! In `Attempting`, a retryable rejection removes exactly one lot step from
//! the quantity and resubmits. The loop ends in `Aborted` once the next
//! quantity is not tradable or `max_attempts` submissions have been made.
//! A non-positive quantity is never submitted.

use super::{ExecutionMode, ExecutorConfig};
use crate::asset_state::{AssetSnapshot, AssetState, AssetStateTracker};
use crate::domain::{
    AttemptOutcome, Fill, InstrumentSpec, OrderAttempt, OrderRequest, OrderSide, TradeAction,
};
use crate::exchange::{Exchange, ExchangeError};
use crate::signal::Crossover;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Decision,
    Attempting,
    Filled,
    Aborted,
    Done,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutorState::Idle => "IDLE",
            ExecutorState::Decision => "DECISION",
            ExecutorState::Attempting => "ATTEMPTING",
            ExecutorState::Filled => "FILLED",
            ExecutorState::Aborted => "ABORTED",
            ExecutorState::Done => "DONE",
        };
        f.write_str(s)
    }
}

/// Why a cycle ended without a trade it wanted to make.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("asset state query failed: {0}")]
    StateQuery(ExchangeError),

    #[error("{side} not attempted: sized quantity {quantity} is below the tradable minimum")]
    BelowMinimum { side: OrderSide, quantity: Decimal },

    #[error("{side} aborted after {attempts} attempt(s), last quantity {last_quantity}: {last_error}")]
    Exhausted {
        side: OrderSide,
        attempts: u32,
        last_quantity: Decimal,
        last_error: ExchangeError,
    },

    #[error("{side} aborted on non-retryable error: {error}")]
    NonRetryable { side: OrderSide, error: ExchangeError },
}

/// Result of one executor cycle, handed to the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub crossover: Crossover,
    pub action: TradeAction,
    pub fill: Option<Fill>,
    pub attempts: Vec<OrderAttempt>,
    /// `None` when the pre-decision query failed.
    pub asset_before: Option<AssetState>,
    /// State re-queried after a fill; `None` when nothing filled or the query failed.
    pub asset_after: Option<AssetState>,
    pub abort: Option<ExecutionError>,
    /// States visited, in order.
    pub states: Vec<ExecutorState>,
}

impl CycleOutcome {
    pub fn is_aborted(&self) -> bool {
        self.abort.is_some()
    }
}

pub struct TradeExecutor {
    instrument: InstrumentSpec,
    tracker: AssetStateTracker,
    mode: ExecutionMode,
    config: ExecutorConfig,
    state: ExecutorState,
}

impl TradeExecutor {
    pub fn new(instrument: InstrumentSpec, mode: ExecutionMode, config: ExecutorConfig) -> Self {
        let tracker =
            AssetStateTracker::new(&instrument).with_dust_tolerance(config.dust_tolerance);
        Self {
            instrument,
            tracker,
            mode,
            config,
            state: ExecutorState::Idle,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn instrument(&self) -> &InstrumentSpec {
        &self.instrument
    }

    fn enter(&mut self, next: ExecutorState, states: &mut Vec<ExecutorState>) {
        debug!(from = %self.state, to = %next, "executor transition");
        self.state = next;
        states.push(next);
    }

    /// Decision table.
    pub fn decide(crossover: Crossover, asset: AssetState) -> Option<OrderSide> {
        match (crossover, asset) {
            (Crossover::Bullish, AssetState::QuoteHeld) => Some(OrderSide::Buy),
            (Crossover::Bearish, AssetState::BaseHeld) => Some(OrderSide::Sell),
            (Crossover::Bullish, AssetState::BaseHeld) => None,
            (Crossover::Bearish, AssetState::QuoteHeld) => None,
        }
    }

    /// Quantity for the first submission, floored to the lot step.
    pub fn initial_quantity(&self, side: OrderSide, snapshot: &AssetSnapshot) -> Decimal {
        let raw = match self.mode {
            ExecutionMode::Paper => self.config.paper_quantity,
            ExecutionMode::Live => match side {
                OrderSide::Buy if snapshot.price > Decimal::ZERO => {
                    snapshot.quote_balance / snapshot.price * self.config.scale
                }
                OrderSide::Buy => Decimal::ZERO,
                OrderSide::Sell => snapshot.base_balance * self.config.scale,
            },
        };
        self.instrument.floor_quantity(raw)
    }

    /// Run one cycle for the latest crossover. Never fails: every problem
    /// ends the cycle as HOLD with `abort` set.
    pub fn run_cycle<E: Exchange + ?Sized>(
        &mut self,
        crossover: Crossover,
        exchange: &E,
    ) -> CycleOutcome {
        let mut states = Vec::with_capacity(6);
        self.state = ExecutorState::Idle;
        states.push(ExecutorState::Idle);
        self.enter(ExecutorState::Decision, &mut states);

        let snapshot = match self.tracker.snapshot(exchange) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(error = %err, "asset state query failed, holding");
                self.enter(ExecutorState::Done, &mut states);
                return CycleOutcome {
                    crossover,
                    action: TradeAction::Hold,
                    fill: None,
                    attempts: Vec::new(),
                    asset_before: None,
                    asset_after: None,
                    abort: Some(ExecutionError::StateQuery(err)),
                    states,
                };
            }
        };

        let Some(side) = Self::decide(crossover, snapshot.state) else {
            info!(%crossover, asset = %snapshot.state, "hold");
            self.enter(ExecutorState::Done, &mut states);
            return CycleOutcome {
                crossover,
                action: TradeAction::Hold,
                fill: None,
                attempts: Vec::new(),
                asset_before: Some(snapshot.state),
                asset_after: None,
                abort: None,
                states,
            };
        };

        self.enter(ExecutorState::Attempting, &mut states);
        let quantity = self.initial_quantity(side, &snapshot);
        let (attempts, result) = self.attempt(side, quantity, &snapshot, exchange);

        match result {
            Ok(fill) => {
                self.enter(ExecutorState::Filled, &mut states);
                info!(
                    side = %fill.side,
                    price = %fill.price,
                    quantity = %fill.quantity,
                    commission = %fill.commission,
                    commission_asset = %fill.commission_asset,
                    attempts = attempts.len(),
                    "order filled"
                );
                let asset_after = match self.tracker.current_asset(exchange) {
                    Ok(state) => Some(state),
                    Err(err) => {
                        warn!(error = %err, "post-trade asset state query failed");
                        None
                    }
                };
                self.enter(ExecutorState::Done, &mut states);
                CycleOutcome {
                    crossover,
                    action: TradeAction::from(side),
                    fill: Some(fill),
                    attempts,
                    asset_before: Some(snapshot.state),
                    asset_after,
                    abort: None,
                    states,
                }
            }
            Err(abort) => {
                self.enter(ExecutorState::Aborted, &mut states);
                error!(error = %abort, "order aborted, logging HOLD");
                self.enter(ExecutorState::Done, &mut states);
                CycleOutcome {
                    crossover,
                    action: TradeAction::Hold,
                    fill: None,
                    attempts,
                    asset_before: Some(snapshot.state),
                    asset_after: None,
                    abort: Some(abort),
                    states,
                }
            }
        }
    }

    /// Submit with bounded quantity reduction.
    fn attempt<E: Exchange + ?Sized>(
        &self,
        side: OrderSide,
        initial: Decimal,
        snapshot: &AssetSnapshot,
        exchange: &E,
    ) -> (Vec<OrderAttempt>, Result<Fill, ExecutionError>) {
        let mut attempts = Vec::new();
        let mut quantity = initial;
        let mut last_error: Option<ExchangeError> = None;

        loop {
            if !self.instrument.is_tradable(quantity) {
                let abort = match last_error {
                    None => ExecutionError::BelowMinimum { side, quantity },
                    Some(last_error) => ExecutionError::Exhausted {
                        side,
                        attempts: attempts.len() as u32,
                        last_quantity: quantity + self.instrument.step_size,
                        last_error,
                    },
                };
                return (attempts, Err(abort));
            }
            if attempts.len() as u32 >= self.config.max_attempts {
                let last_error = last_error.unwrap_or_else(|| {
                    ExchangeError::Rejected {
                        code: 0,
                        message: "attempt limit reached".into(),
                    }
                });
                return (
                    attempts,
                    Err(ExecutionError::Exhausted {
                        side,
                        attempts: self.config.max_attempts,
                        last_quantity: quantity + self.instrument.step_size,
                        last_error,
                    }),
                );
            }

            let request = OrderRequest {
                symbol: self.instrument.symbol.clone(),
                side,
                quantity,
            };
            match self.submit(&request, snapshot, exchange) {
                Ok(fill) => {
                    attempts.push(OrderAttempt {
                        side,
                        quantity,
                        outcome: AttemptOutcome::Filled(fill.clone()),
                    });
                    return (attempts, Ok(fill));
                }
                Err(err) => {
                    attempts.push(OrderAttempt {
                        side,
                        quantity,
                        outcome: AttemptOutcome::Rejected {
                            reason: err.to_string(),
                        },
                    });
                    if !err.is_retryable() {
                        return (
                            attempts,
                            Err(ExecutionError::NonRetryable { side, error: err }),
                        );
                    }
                    let reduced = quantity - self.instrument.step_size;
                    warn!(
                        %side,
                        attempt = attempts.len(),
                        %quantity,
                        %reduced,
                        error = %err,
                        "order rejected, reducing quantity"
                    );
                    quantity = reduced;
                    last_error = Some(err);
                }
            }
        }
    }

    fn submit<E: Exchange + ?Sized>(
        &self,
        request: &OrderRequest,
        snapshot: &AssetSnapshot,
        exchange: &E,
    ) -> Result<Fill, ExchangeError> {
        match self.mode {
            ExecutionMode::Live => exchange.submit_order(request),
            ExecutionMode::Paper => {
                exchange.validate_order(request)?;
                Ok(Fill {
                    side: request.side,
                    price: snapshot.price,
                    quantity: request.quantity,
                    commission: Decimal::ZERO,
                    commission_asset: self.instrument.quote_asset.clone(),
                })
            }
        }
    }
}
