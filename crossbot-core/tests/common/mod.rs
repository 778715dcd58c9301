//! Shared fixtures for crossbot-core integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use crossbot_core::domain::{Bar, BarSource, InstrumentSpec, Interval};
use crossbot_core::exchange::scripted::ScriptedExchange;
use crossbot_core::execution::{ExecutionMode, ExecutorConfig, TradeExecutor};
use crossbot_core::signal::SimpleAverageModel;
use crossbot_core::{AuditLog, BarSeries, StreamCoordinator};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::path::Path;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

pub fn btcusdt() -> InstrumentSpec {
    InstrumentSpec {
        symbol: "BTCUSDT".into(),
        base_asset: "BTC".into(),
        quote_asset: "USDT".into(),
        step_size: Decimal::new(1, 3),
        min_qty: Decimal::new(1, 3),
    }
}

/// One-minute closed bars starting at `t0() + offset` minutes.
pub fn bars_from(offset: i64, closes: &[f64], source: BarSource) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let close = Decimal::from_f64(close).unwrap();
            let open_time = t0() + Duration::minutes(offset + i as i64);
            Bar {
                open_time,
                close_time: open_time + Duration::milliseconds(59_999),
                open: close,
                high: close,
                low: close,
                close,
                base_volume: Decimal::ONE,
                quote_volume: close,
                taker_buy_base_volume: Decimal::ZERO,
                taker_buy_quote_volume: Decimal::ZERO,
                number_of_trades: 1,
                first_trade_id: None,
                last_trade_id: None,
                closed: true,
                source,
            }
        })
        .collect()
}

/// Raw stream message for the 1m bar at `t0() + minute`.
pub fn kline_json(minute: i64, close: &str, closed: bool) -> String {
    let open = (t0() + Duration::minutes(minute)).timestamp_millis();
    kline_json_at(open, close, closed)
}

/// Raw stream message for the 1m bar opening at `open` (epoch millis).
pub fn kline_json_at(open: i64, close: &str, closed: bool) -> String {
    let close_time = open + 59_999;
    let event_time = if closed { close_time + 1 } else { open + 30_000 };
    let first = (open / 6_000) % 1_000_000;
    format!(
        r#"{{"e":"kline","E":{event_time},"s":"BTCUSDT","k":{{"t":{open},"T":{close_time},"s":"BTCUSDT","i":"1m","f":{first},"L":{last},"o":"{close}","c":"{close}","h":"{close}","l":"{close}","v":"1.5","n":7,"x":{closed},"q":"150.0","V":"0.5","Q":"50.0","B":"0"}}}}"#,
        last = first + 6,
    )
}

/// Coordinator over `history` closes with an SMA(fast, slow) model.
pub fn coordinator(
    dir: &Path,
    history: &[f64],
    windows: (usize, usize),
    exchange: ScriptedExchange,
    mode: ExecutionMode,
) -> StreamCoordinator<ScriptedExchange> {
    let mut series = BarSeries::new(Interval::Minutes(1));
    series
        .load_historical(bars_from(0, history, BarSource::Historical))
        .unwrap();
    let executor = TradeExecutor::new(btcusdt(), mode, ExecutorConfig::default());
    let audit = AuditLog::create(dir, "BTCUSDT", t0()).unwrap();
    StreamCoordinator::new(
        series,
        Box::new(SimpleAverageModel::new(windows.0, windows.1)),
        executor,
        audit,
        exchange,
    )
}

/// Parse the audit file into header plus rows.
pub fn read_audit(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .unwrap();
    let header = reader.headers().unwrap().iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    (header, rows)
}

pub fn column(header: &[String], name: &str) -> usize {
    header.iter().position(|h| h == name).unwrap()
}
