//! Crossbot Core: a single-instrument moving-average crossover trading engine.
//!
//! This crate contains the engine and its seams:
//! - Domain types (bars, kline events, instruments, orders, fills)
//! - Bar series with a historical prefix and an append-only live suffix
//! - Moving-average indicators and crossover signal models
//! - Asset state derived from balances and price
//! - Trade executor state machine with bounded quantity-reduction retry
//! - Append-only CSV audit log
//! - Stream coordinator tying the pipeline to a market-data transport
//! - Collaborator traits for the exchange, the backfill source and the transport

pub mod asset_state;
pub mod audit;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod exchange;
pub mod execution;
pub mod indicators;
pub mod series;
pub mod signal;

pub use asset_state::{AssetSnapshot, AssetState, AssetStateTracker};
pub use audit::{AuditError, AuditLog, TradeLogEntry, AUDIT_COLUMNS};
pub use config::{BotConfig, ConfigError, ExchangeSettings};
pub use coordinator::{
    load_history, CoordinatorError, CycleReport, RunSummary, StopHandle, StopReason,
    StreamCoordinator,
};
pub use exchange::{
    Exchange, ExchangeError, HistorySource, Transport, TransportError, TransportEvent,
};
pub use execution::{
    CycleOutcome, ExecutionError, ExecutionMode, ExecutorConfig, ExecutorState, TradeExecutor,
};
pub use series::{BackfillError, BarSeries, Projection};
pub use signal::{Crossover, ModelConfig, ModelKind, SignalModel, SignalOutput};
