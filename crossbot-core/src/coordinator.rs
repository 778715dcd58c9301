//! Stream coordinator: drives one closed bar through the pipeline.
//!
//! Per final kline event, strictly in order:
//!
//! 1. `BarSeries::append`
//! 2. `SignalModel::fit` over the whole series
//! 3. `TradeExecutor::run_cycle` on the latest crossover
//! 4. `AuditLog::record`
//!
//! Everything runs on the caller's thread. A cycle that has started always
//! finishes and is logged before the stop flag is looked at again.

use crate::audit::{AuditError, AuditLog, TradeLogEntry};
use crate::domain::{Interval, KlineEvent, MalformedEvent};
use crate::exchange::{Exchange, HistorySource, Transport, TransportError, TransportEvent};
use crate::execution::{CycleOutcome, TradeExecutor};
use crate::series::{BackfillError, BarSeries};
use crate::signal::SignalModel;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Shared stop flag. Clone it into a signal handler or another thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Failure of a single cycle. `run` logs it and keeps going.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("audit log: {0}")]
    Audit(#[from] AuditError),

    #[error("kline event: {0}")]
    Event(#[from] MalformedEvent),
}

/// What one processed bar produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub entry: TradeLogEntry,
    pub outcome: CycleOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    MaxBars,
    TransportClosed,
}

/// Start/stop report of one `run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    /// Transport messages handled.
    pub iterations: u64,
    /// Bars that went through a full cycle.
    pub bars_processed: u64,
    pub malformed: u64,
    pub failed_cycles: u64,
    pub reason: StopReason,
}

impl RunSummary {
    pub fn duration(&self) -> Duration {
        self.stopped_at - self.started_at
    }
}

/// Load closed history into a fresh series.
///
/// The window ends one millisecond before the open of the interval that
/// contains `now`. Bars whose close time has not passed `now` are dropped,
/// so a still-open bar never enters the backfill and its final event is
/// processed live.
pub fn load_history<H: HistorySource + ?Sized>(
    history: &H,
    symbol: &str,
    interval: Interval,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<BarSeries, BackfillError> {
    let end = interval.floor(now) - Duration::milliseconds(1);
    let mut bars = history
        .get_bars(symbol, interval, start, end)
        .map_err(|e| BackfillError::Source(e.to_string()))?;
    let fetched = bars.len();
    bars.retain(|b| b.close_time < now);
    if bars.len() < fetched {
        debug!(dropped = fetched - bars.len(), %now, "dropped unclosed bars from backfill");
    }

    let mut series = BarSeries::new(interval);
    let loaded = series.load_historical(bars)?;
    info!(%symbol, %interval, %start, %end, bars = loaded, "historical backfill loaded");
    Ok(series)
}

pub struct StreamCoordinator<E: Exchange> {
    symbol: String,
    series: BarSeries,
    model: Box<dyn SignalModel>,
    executor: TradeExecutor,
    audit: AuditLog,
    exchange: E,
    stop: StopHandle,
    max_bars: Option<u64>,
    iterations: u64,
    bars_processed: u64,
    malformed: u64,
    failed_cycles: u64,
}

impl<E: Exchange> StreamCoordinator<E> {
    pub fn new(
        series: BarSeries,
        model: Box<dyn SignalModel>,
        executor: TradeExecutor,
        audit: AuditLog,
        exchange: E,
    ) -> Self {
        Self {
            symbol: executor.instrument().symbol.clone(),
            series,
            model,
            executor,
            audit,
            exchange,
            stop: StopHandle::new(),
            max_bars: None,
            iterations: 0,
            bars_processed: 0,
            malformed: 0,
            failed_cycles: 0,
        }
    }

    /// Stop after this many processed bars.
    pub fn with_max_bars(mut self, max_bars: Option<u64>) -> Self {
        self.max_bars = max_bars;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn series(&self) -> &BarSeries {
        &self.series
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn bars_processed(&self) -> u64 {
        self.bars_processed
    }

    /// Handle one raw transport message. Malformed messages are dropped.
    pub fn on_raw_event(&mut self, raw: &str) -> Result<Option<CycleReport>, CoordinatorError> {
        let event = match KlineEvent::parse(raw) {
            Ok(event) => event,
            Err(err) => {
                self.malformed += 1;
                warn!(error = %err, "dropping malformed stream message");
                return Ok(None);
            }
        };
        if event.symbol != self.symbol {
            warn!(expected = %self.symbol, got = %event.symbol, "dropping event for another symbol");
            return Ok(None);
        }
        self.on_bar_closed(event)
    }

    pub fn on_bar_closed(
        &mut self,
        event: KlineEvent,
    ) -> Result<Option<CycleReport>, CoordinatorError> {
        self.on_bar_closed_at(event, Utc::now())
    }

    /// Run the pipeline for `event`, received locally at `received_at`.
    ///
    /// Returns `Ok(None)` for events that are not final yet and for bars the
    /// series already holds.
    pub fn on_bar_closed_at(
        &mut self,
        event: KlineEvent,
        received_at: DateTime<Utc>,
    ) -> Result<Option<CycleReport>, CoordinatorError> {
        if !event.is_final() {
            debug!(
                open_time = event.kline.open_time,
                closed = event.kline.closed,
                "waiting for final kline"
            );
            return Ok(None);
        }

        let bar = event.to_bar()?;
        let event_time = event.event_time_utc()?;
        if !self.series.append(bar.clone()) {
            return Ok(None);
        }

        let outputs = self.model.fit(&self.series.as_projection());
        let Some(signal) = outputs.last().copied() else {
            return Ok(None);
        };
        let crossover = signal.crossover();
        info!(
            symbol = %self.symbol,
            open_time = %bar.open_time,
            close = %bar.close,
            fast = ?signal.fast,
            slow = ?signal.slow,
            %crossover,
            "bar closed"
        );

        let outcome = self.executor.run_cycle(crossover, &self.exchange);

        let entry = TradeLogEntry {
            received_at,
            symbol: event.symbol,
            event_type: event.event_type,
            interval: event.kline.interval,
            event_time,
            bar,
            signal,
            action: outcome.action,
            fill: outcome.fill.clone(),
            abort: outcome.abort.as_ref().map(|e| e.to_string()),
        };
        self.audit.record(&entry)?;
        self.bars_processed += 1;
        if let Some(reason) = &entry.abort {
            // The CSV row is a plain HOLD; this line is the error marker.
            error!(
                open_time = %entry.bar.open_time,
                kline_open_time = entry.bar.open_time.timestamp_millis(),
                %reason,
                "trade aborted, audit row logged as HOLD"
            );
        }
        info!(action = %entry.action, rows = self.audit.rows_written(), "cycle logged");

        Ok(Some(CycleReport { entry, outcome }))
    }

    /// Pump the transport until stopped, closed, or `max_bars` is reached.
    ///
    /// Transport failures end the run and are returned; there is no
    /// reconnect. Cycle failures are logged and counted.
    pub fn run<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<RunSummary, TransportError> {
        let started_at = Utc::now();
        let interval = self.series.interval();
        info!(
            symbol = %self.symbol,
            %interval,
            mode = ?self.executor.mode(),
            start = %started_at,
            "starting stream"
        );
        transport.start(&self.symbol, interval)?;

        let result = loop {
            if self.stop.is_stopped() {
                break Ok(StopReason::Requested);
            }
            if self.max_bars.is_some_and(|max| self.bars_processed >= max) {
                break Ok(StopReason::MaxBars);
            }
            match transport.next_event() {
                Ok(TransportEvent::Message(raw)) => {
                    self.iterations += 1;
                    if let Err(err) = self.on_raw_event(&raw) {
                        self.failed_cycles += 1;
                        error!(error = %err, "cycle failed");
                    }
                }
                Ok(TransportEvent::Idle) => {}
                Ok(TransportEvent::Closed) => break Ok(StopReason::TransportClosed),
                Err(err) => {
                    error!(error = %err, "transport failed");
                    break Err(err);
                }
            }
        };

        if let Err(err) = transport.stop() {
            warn!(error = %err, "failed to stop transport");
        }

        let summary = RunSummary {
            started_at,
            stopped_at: Utc::now(),
            iterations: self.iterations,
            bars_processed: self.bars_processed,
            malformed: self.malformed,
            failed_cycles: self.failed_cycles,
            reason: StopReason::Requested,
        };
        info!(
            start = %summary.started_at,
            stop = %summary.stopped_at,
            duration_secs = summary.duration().num_seconds(),
            iterations = summary.iterations,
            bars = summary.bars_processed,
            "stream stopped"
        );

        result.map(|reason| RunSummary { reason, ..summary })
    }
}
