//! End-to-end pipeline tests: raw stream message in, audit row out.
//!
//! Drives the coordinator with the scripted exchange and checks the
//! decision, the fill and what lands in the CSV file.

mod common;

use common::*;
use crossbot_core::domain::{OrderSide, TradeAction};
use crossbot_core::exchange::scripted::{ScriptedExchange, ScriptedTransport};
use crossbot_core::exchange::ExchangeError;
use crossbot_core::execution::{ExecutionError, ExecutionMode};
use crossbot_core::{AssetState, StopReason, AUDIT_COLUMNS};
use rust_decimal_macros::dec;

fn funded_exchange(price: rust_decimal::Decimal, usdt: rust_decimal::Decimal) -> ScriptedExchange {
    ScriptedExchange::new(btcusdt(), price).with_balance("USDT", usdt)
}

#[test]
fn bullish_crossover_with_quote_buys() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = coordinator(
        dir.path(),
        &[100.0, 101.0, 102.0],
        (2, 3),
        funded_exchange(dec!(103), dec!(1030)),
        ExecutionMode::Live,
    );

    let report = coord
        .on_raw_event(&kline_json(3, "103", true))
        .unwrap()
        .expect("final bar is processed");

    assert_eq!(report.entry.signal.fast, Some(102.5));
    assert_eq!(report.entry.signal.slow, Some(102.0));
    assert_eq!(report.entry.action, TradeAction::Buy);
    let fill = report.entry.fill.as_ref().unwrap();
    assert_eq!(fill.quantity, dec!(10));
    assert_eq!(fill.price, dec!(103));
    assert_eq!(report.outcome.asset_before, Some(AssetState::QuoteHeld));
    assert_eq!(report.outcome.asset_after, Some(AssetState::BaseHeld));

    let (header, rows) = read_audit(coord.audit().path());
    assert_eq!(header, AUDIT_COLUMNS.to_vec());
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row[column(&header, "trade_action")], "BUY");
    assert_eq!(row[column(&header, "fast_signal")], "102.5");
    assert_eq!(row[column(&header, "slow_signal")], "102.0");
    assert_eq!(row[column(&header, "fill_quantity")], "10");
    assert_eq!(row[column(&header, "price_at_trade")], "103");
    assert_eq!(row[column(&header, "source")], "acquired");
    assert!(!row[column(&header, "first_trade_id")].is_empty());
    assert_eq!(row[column(&header, "kline_time")], "2024-01-02 00:03:00");
}

#[test]
fn rejected_first_attempt_fills_one_step_smaller() {
    let dir = tempfile::tempdir().unwrap();
    let exchange = funded_exchange(dec!(103), dec!(1030));
    exchange.reject_next(ExchangeError::Rejected {
        code: -2010,
        message: "insufficient balance".into(),
    });
    let mut coord = coordinator(
        dir.path(),
        &[100.0, 101.0, 102.0],
        (2, 3),
        exchange,
        ExecutionMode::Live,
    );

    let report = coord
        .on_raw_event(&kline_json(3, "103", true))
        .unwrap()
        .unwrap();

    assert_eq!(report.entry.action, TradeAction::Buy);
    assert_eq!(report.outcome.attempts.len(), 2);
    assert_eq!(report.outcome.attempts[0].quantity, dec!(10));
    assert_eq!(report.outcome.attempts[1].quantity, dec!(9.999));
    assert_eq!(report.entry.fill.as_ref().unwrap().quantity, dec!(9.999));

    let submitted = coord.exchange().submitted();
    assert_eq!(submitted.len(), 2);
    assert!(submitted.iter().all(|o| o.side == OrderSide::Buy));

    let (header, rows) = read_audit(coord.audit().path());
    assert_eq!(rows[0][column(&header, "fill_quantity")], "9.999");
}

#[test]
fn bearish_crossover_with_quote_holds() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = coordinator(
        dir.path(),
        &[103.0, 102.0, 101.0],
        (2, 3),
        funded_exchange(dec!(100), dec!(1000)),
        ExecutionMode::Live,
    );

    let report = coord
        .on_raw_event(&kline_json(3, "100", true))
        .unwrap()
        .unwrap();

    assert_eq!(report.entry.action, TradeAction::Hold);
    assert!(report.entry.fill.is_none());
    assert!(coord.exchange().submitted().is_empty());

    let (header, rows) = read_audit(coord.audit().path());
    let row = &rows[0];
    assert_eq!(row[column(&header, "trade_action")], "HOLD");
    for name in [
        "price_at_trade",
        "fill_quantity",
        "fill_commission",
        "fill_commission_asset",
    ] {
        assert_eq!(row[column(&header, name)], "", "{name} should be empty");
    }
}

#[test]
fn buy_then_sell_flips_asset_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = coordinator(
        dir.path(),
        &[100.0, 101.0, 102.0],
        (2, 3),
        funded_exchange(dec!(103), dec!(1030)),
        ExecutionMode::Live,
    );

    let buy = coord.on_raw_event(&kline_json(3, "103", true)).unwrap().unwrap();
    assert_eq!(buy.entry.action, TradeAction::Buy);

    coord.exchange().set_price(dec!(90));
    let sell = coord.on_raw_event(&kline_json(4, "90", true)).unwrap().unwrap();
    assert_eq!(sell.entry.action, TradeAction::Sell);
    assert_eq!(sell.entry.fill.as_ref().unwrap().quantity, dec!(10));
    assert_eq!(sell.outcome.asset_after, Some(AssetState::QuoteHeld));

    let (_, rows) = read_audit(coord.audit().path());
    assert_eq!(rows.len(), 2);
}

#[test]
fn commissions_are_logged_in_the_asset_received() {
    let dir = tempfile::tempdir().unwrap();
    let exchange = funded_exchange(dec!(103), dec!(1030)).with_commission_rate(dec!(0.001));
    let mut coord = coordinator(
        dir.path(),
        &[100.0, 101.0, 102.0],
        (2, 3),
        exchange,
        ExecutionMode::Live,
    );

    let buy = coord.on_raw_event(&kline_json(3, "103", true)).unwrap().unwrap();
    assert_eq!(buy.entry.action, TradeAction::Buy);

    // The base commission is taken from the bought amount, so the sell only
    // has 9.99 BTC to work with.
    coord.exchange().set_price(dec!(90));
    let sell = coord.on_raw_event(&kline_json(4, "90", true)).unwrap().unwrap();
    assert_eq!(sell.entry.action, TradeAction::Sell);
    assert_eq!(sell.entry.fill.as_ref().unwrap().quantity, dec!(9.99));

    let (header, rows) = read_audit(coord.audit().path());
    assert_eq!(rows.len(), 2);
    let commission = |row: &Vec<String>| {
        row[column(&header, "fill_commission")]
            .parse::<rust_decimal::Decimal>()
            .unwrap()
    };
    assert_eq!(commission(&rows[0]), dec!(0.01));
    assert_eq!(rows[0][column(&header, "fill_commission_asset")], "BTC");
    assert_eq!(commission(&rows[1]), dec!(0.8991));
    assert_eq!(rows[1][column(&header, "fill_commission_asset")], "USDT");
}

#[test]
fn aborted_trade_is_logged_as_hold() {
    let dir = tempfile::tempdir().unwrap();
    let exchange = funded_exchange(dec!(103), dec!(1030));
    exchange.reject_always(Some(ExchangeError::Auth("invalid api key".into())));
    let mut coord = coordinator(
        dir.path(),
        &[100.0, 101.0, 102.0],
        (2, 3),
        exchange,
        ExecutionMode::Live,
    );

    let report = coord
        .on_raw_event(&kline_json(3, "103", true))
        .unwrap()
        .unwrap();

    assert_eq!(report.entry.action, TradeAction::Hold);
    assert!(matches!(
        report.outcome.abort,
        Some(ExecutionError::NonRetryable { side: OrderSide::Buy, .. })
    ));
    assert!(report.entry.abort.as_deref().unwrap().contains("invalid api key"));

    // The row keeps the fixed layout; the abort reason is not a column.
    let (header, rows) = read_audit(coord.audit().path());
    assert_eq!(header, AUDIT_COLUMNS.to_vec());
    let row = &rows[0];
    assert_eq!(row.len(), AUDIT_COLUMNS.len());
    assert_eq!(row[column(&header, "trade_action")], "HOLD");
    for name in ["price_at_trade", "fill_quantity", "fill_commission", "fill_commission_asset"] {
        assert_eq!(row[column(&header, name)], "", "{name}");
    }
    assert!(row.iter().all(|field| !field.contains("invalid api key")));
    assert_eq!(
        row[column(&header, "kline_open_time")],
        report.entry.bar.open_time.timestamp_millis().to_string()
    );
}

#[test]
fn paper_mode_validates_instead_of_trading() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = coordinator(
        dir.path(),
        &[100.0, 101.0, 102.0],
        (2, 3),
        funded_exchange(dec!(103), dec!(1030)),
        ExecutionMode::Paper,
    );

    let report = coord
        .on_raw_event(&kline_json(3, "103", true))
        .unwrap()
        .unwrap();

    assert_eq!(report.entry.action, TradeAction::Buy);
    assert_eq!(report.entry.fill.as_ref().unwrap().quantity, dec!(0.002));
    assert!(coord.exchange().submitted().is_empty());
    assert_eq!(coord.exchange().validated().len(), 1);
    // Balances are untouched, so the account still holds quote.
    assert_eq!(report.outcome.asset_after, Some(AssetState::QuoteHeld));
}

#[test]
fn partial_and_malformed_messages_leave_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = coordinator(
        dir.path(),
        &[100.0, 101.0, 102.0],
        (2, 3),
        funded_exchange(dec!(103), dec!(1030)),
        ExecutionMode::Live,
    );

    let mut transport = ScriptedTransport::new();
    transport.push_message(kline_json(3, "102.7", false));
    transport.push_message("{\"e\":\"kline\",");
    transport.push_idle();
    transport.push_message(kline_json(3, "103", true));

    let summary = coord.run(&mut transport).unwrap();
    assert_eq!(summary.reason, StopReason::TransportClosed);
    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.bars_processed, 1);
    assert_eq!(coord.series().live_len(), 1);

    let (_, rows) = read_audit(coord.audit().path());
    assert_eq!(rows.len(), 1);
}

#[test]
fn failing_cycle_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut coord = coordinator(
        dir.path(),
        &[100.0, 101.0, 102.0],
        (2, 3),
        funded_exchange(dec!(103), dec!(1030)),
        ExecutionMode::Live,
    );

    // Final and well-formed, but the timestamps are outside the calendar range.
    let broken = kline_json_at(9_000_000_000_000_000, "103", true);

    let mut transport = ScriptedTransport::new();
    transport.push_message(broken);
    transport.push_message(kline_json(3, "103", true));
    transport.push_message(kline_json(4, "104", true));

    let summary = coord.run(&mut transport).unwrap();
    assert_eq!(summary.failed_cycles, 1);
    assert_eq!(summary.bars_processed, 2);
    assert_eq!(transport.started().unwrap().0, "BTCUSDT");
}
