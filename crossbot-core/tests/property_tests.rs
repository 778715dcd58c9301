//! Property tests for pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Series ordering: the series only grows and stays strictly increasing
//! 2. Retry termination: a rejected order never loops and never submits <= 0
//! 3. Flat input: both averages equal the constant once defined

mod common;

use common::*;
use crossbot_core::domain::{BarSource, InstrumentSpec, Interval};
use crossbot_core::exchange::scripted::ScriptedExchange;
use crossbot_core::exchange::ExchangeError;
use crossbot_core::execution::{ExecutionError, ExecutionMode, ExecutorConfig, TradeExecutor};
use crossbot_core::indicators::{Ewm, Indicator, Sma};
use crossbot_core::signal::Crossover;
use crossbot_core::BarSeries;
use proptest::prelude::*;
use rust_decimal::Decimal;

// ── Strategies (proptest) ────────────────────────────────────────────

/// (minute offset, closed) pairs for candidate live bars.
fn arb_live_bars() -> impl Strategy<Value = Vec<(i64, bool)>> {
    prop::collection::vec((0i64..40, prop::bool::weighted(0.8)), 0..60)
}

/// Step size as 10^-k.
fn arb_step() -> impl Strategy<Value = Decimal> {
    (0u32..6).prop_map(|k| Decimal::new(1, k))
}

// ── 1. Series ordering ───────────────────────────────────────────────

proptest! {
    #[test]
    fn series_stays_strictly_increasing(candidates in arb_live_bars()) {
        let mut series = BarSeries::new(Interval::Minutes(1));
        series
            .load_historical(bars_from(0, &[1.0, 2.0, 3.0], BarSource::Historical))
            .unwrap();

        for (offset, closed) in candidates {
            let before = series.len();
            let last = series.last().unwrap().open_time;
            let mut bar = bars_from(offset, &[10.0], BarSource::Acquired).remove(0);
            bar.closed = closed;
            let newer = bar.open_time > last;

            let accepted = series.append(bar);

            prop_assert_eq!(accepted, closed && newer);
            prop_assert_eq!(series.len(), before + usize::from(accepted));
        }

        prop_assert_eq!(series.historical_len(), 3);
        let bars = series.bars();
        for pair in bars.windows(2) {
            prop_assert!(pair[0].open_time < pair[1].open_time);
        }
        prop_assert!(bars[3..].iter().all(|b| b.source == BarSource::Acquired && b.closed));
    }
}

// ── 2. Retry termination ─────────────────────────────────────────────

proptest! {
    #[test]
    fn rejected_orders_terminate_without_non_positive_quantities(
        step in arb_step(),
        quote in 0u32..5_000,
        max_attempts in 1u32..40,
    ) {
        let instrument = InstrumentSpec {
            symbol: "BTCUSDT".into(),
            base_asset: "BTC".into(),
            quote_asset: "USDT".into(),
            step_size: step,
            min_qty: step,
        };
        let exchange = ScriptedExchange::new(instrument.clone(), Decimal::new(100, 0))
            .with_balance("USDT", Decimal::from(quote));
        exchange.reject_always(Some(ExchangeError::Rejected {
            code: -2010,
            message: "insufficient balance".into(),
        }));
        let config = ExecutorConfig { max_attempts, ..ExecutorConfig::default() };
        let mut executor = TradeExecutor::new(instrument, ExecutionMode::Live, config);

        let outcome = executor.run_cycle(Crossover::Bullish, &exchange);
        let submitted = exchange.submitted();

        prop_assert!(outcome.is_aborted());
        prop_assert!(outcome.fill.is_none());
        prop_assert!(submitted.len() <= max_attempts as usize);
        prop_assert!(submitted.iter().all(|o| o.quantity > Decimal::ZERO));
        for pair in submitted.windows(2) {
            prop_assert_eq!(pair[0].quantity - pair[1].quantity, step);
        }
        let bounded = matches!(
            outcome.abort,
            Some(ExecutionError::Exhausted { .. }) | Some(ExecutionError::BelowMinimum { .. })
        );
        prop_assert!(bounded);
    }
}

// ── 3. Flat input ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn averages_of_a_constant_are_the_constant(
        value in 0.01f64..100_000.0,
        len in 1usize..200,
        window in 1usize..50,
    ) {
        let closes = vec![value; len];
        for out in [Sma::new(window).compute(&closes), Ewm::new(window).compute(&closes)] {
            prop_assert_eq!(out.len(), len);
            for (i, v) in out.iter().enumerate() {
                if i + 1 < window {
                    prop_assert!(v.is_nan());
                } else {
                    prop_assert!((v - value).abs() <= value * 1e-12);
                }
            }
        }
    }
}
