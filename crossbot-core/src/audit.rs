//! Append-only audit log: one CSV row per processed closed bar.
//!
//! The column order is fixed (see [`AUDIT_COLUMNS`]). Each row is serialized
//! fully in memory and appended with a single write, then synced, so a crash
//! never leaves half a row behind. The header is written only when the file
//! is empty.

use crate::domain::{Bar, Fill, TradeAction};
use crate::signal::SignalOutput;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Fixed column contract of the audit file.
pub const AUDIT_COLUMNS: [&str; 29] = [
    "timestamp",
    "symbol",
    "event_type",
    "interval",
    "kline_time",
    "kline_open_time",
    "kline_close_time",
    "event_servertime",
    "time_uncertainty",
    "first_trade_id",
    "last_trade_id",
    "open",
    "high",
    "low",
    "close",
    "base_volume",
    "quote_volume",
    "number_of_trades",
    "fast_signal",
    "slow_signal",
    "closed",
    "taker_buy_base_volume",
    "taker_buy_quote_volume",
    "source",
    "trade_action",
    "price_at_trade",
    "fill_quantity",
    "fill_commission",
    "fill_commission_asset",
];

/// Columns of the one-off historical snapshot.
pub const HISTORICAL_COLUMNS: [&str; 8] = [
    "servertime",
    "kline_time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "source",
];

const KLINE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit row serialization: {0}")]
    Csv(#[from] csv::Error),
}

/// Everything recorded for one processed bar.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeLogEntry {
    /// When the event was received locally.
    pub received_at: DateTime<Utc>,
    pub symbol: String,
    pub event_type: String,
    pub interval: String,
    /// Server-reported event time.
    pub event_time: DateTime<Utc>,
    pub bar: Bar,
    pub signal: SignalOutput,
    pub action: TradeAction,
    pub fill: Option<Fill>,
    /// Set when an attempted trade was aborted and logged as HOLD.
    pub abort: Option<String>,
}

impl TradeLogEntry {
    /// Local receive time minus bar open time, in seconds.
    pub fn time_uncertainty(&self) -> f64 {
        (self.received_at - self.bar.open_time).num_milliseconds() as f64 / 1000.0
    }
}

#[derive(Serialize)]
struct AuditRow<'a> {
    timestamp: String,
    symbol: &'a str,
    event_type: &'a str,
    interval: &'a str,
    kline_time: String,
    kline_open_time: i64,
    kline_close_time: i64,
    event_servertime: i64,
    time_uncertainty: String,
    first_trade_id: Option<i64>,
    last_trade_id: Option<i64>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    base_volume: Decimal,
    quote_volume: Decimal,
    number_of_trades: u64,
    fast_signal: Option<f64>,
    slow_signal: Option<f64>,
    closed: bool,
    taker_buy_base_volume: Decimal,
    taker_buy_quote_volume: Decimal,
    source: &'static str,
    trade_action: &'static str,
    price_at_trade: Option<Decimal>,
    fill_quantity: Option<Decimal>,
    fill_commission: Option<Decimal>,
    fill_commission_asset: Option<&'a str>,
}

impl<'a> From<&'a TradeLogEntry> for AuditRow<'a> {
    fn from(entry: &'a TradeLogEntry) -> Self {
        let bar = &entry.bar;
        let fill = entry.fill.as_ref();
        AuditRow {
            timestamp: entry
                .received_at
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            symbol: &entry.symbol,
            event_type: &entry.event_type,
            interval: &entry.interval,
            kline_time: bar.open_time.format(KLINE_TIME_FORMAT).to_string(),
            kline_open_time: bar.open_time.timestamp_millis(),
            kline_close_time: bar.close_time.timestamp_millis(),
            event_servertime: entry.event_time.timestamp_millis(),
            time_uncertainty: format!("{:.3}", entry.time_uncertainty()),
            first_trade_id: bar.first_trade_id,
            last_trade_id: bar.last_trade_id,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            base_volume: bar.base_volume,
            quote_volume: bar.quote_volume,
            number_of_trades: bar.number_of_trades,
            fast_signal: entry.signal.fast,
            slow_signal: entry.signal.slow,
            closed: bar.closed,
            taker_buy_base_volume: bar.taker_buy_base_volume,
            taker_buy_quote_volume: bar.taker_buy_quote_volume,
            source: bar.source.as_str(),
            trade_action: entry.action.as_str(),
            price_at_trade: fill.map(|f| f.price),
            fill_quantity: fill.map(|f| f.quantity),
            fill_commission: fill.map(|f| f.commission),
            fill_commission_asset: fill.map(|f| f.commission_asset.as_str()),
        }
    }
}

/// `<SYMBOL>_trade_data_<YYYY-MM-DDTHHMMSS>.csv`
pub fn trade_file_name(symbol: &str, started: DateTime<Utc>) -> String {
    format!("{symbol}_trade_data_{}.csv", started.format("%Y-%m-%dT%H%M%S"))
}

/// `<SYMBOL>_historical_trade_data_<YYYY-MM-DDTHHMMSS>.csv`
pub fn historical_file_name(symbol: &str, started: DateTime<Utc>) -> String {
    format!(
        "{symbol}_historical_trade_data_{}.csv",
        started.format("%Y-%m-%dT%H%M%S")
    )
}

/// Durable per-run trade log.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: File,
    header_written: bool,
    rows_written: u64,
}

impl AuditLog {
    /// Create (or reopen) the run's trade file inside `output_dir`,
    /// creating the directory if needed.
    pub fn create(
        output_dir: &Path,
        symbol: &str,
        started: DateTime<Utc>,
    ) -> Result<Self, AuditError> {
        std::fs::create_dir_all(output_dir)?;
        Self::open(output_dir.join(trade_file_name(symbol, started)))
    }

    /// Open `path` for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let header_written = file.metadata()?.len() > 0;
        Ok(Self {
            path,
            file,
            header_written,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended by this handle.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append one row. The header goes out with the first row of an empty file.
    pub fn record(&mut self, entry: &TradeLogEntry) -> Result<(), AuditError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::with_capacity(512));
        if !self.header_written {
            writer.write_record(AUDIT_COLUMNS)?;
        }
        writer.serialize(AuditRow::from(entry))?;
        let buf = writer
            .into_inner()
            .map_err(|e| AuditError::Io(e.into_error()))?;

        self.file.write_all(&buf)?;
        self.file.flush()?;
        self.file.sync_data()?;

        self.header_written = true;
        self.rows_written += 1;
        debug!(path = %self.path.display(), rows = self.rows_written, "audit row appended");
        Ok(())
    }
}

#[derive(Serialize)]
struct HistoricalRow<'a> {
    servertime: i64,
    kline_time: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    source: &'a str,
}

/// Write the historical backfill once, as loaded at startup.
pub fn write_historical_csv(path: &Path, bars: &[Bar]) -> Result<(), AuditError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(HISTORICAL_COLUMNS)?;
    for bar in bars {
        writer.serialize(HistoricalRow {
            servertime: bar.open_time.timestamp_millis(),
            kline_time: bar.open_time.format(KLINE_TIME_FORMAT).to_string(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.base_volume,
            source: bar.source.as_str(),
        })?;
    }
    writer.flush()?;
    Ok(())
}
