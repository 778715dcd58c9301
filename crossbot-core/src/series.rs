//! Bar series: historical backfill prefix plus live, append-only suffix.
//!
//! The series only ever grows. Historical bars are loaded once and checked
//! for gaps; live bars are accepted only when closed and strictly newer than
//! the last bar. Rejected live bars are dropped silently: open (partial) bars
//! are not final and would corrupt the signal.

use crate::domain::{Bar, BarSource, Interval};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

/// Errors from the one-time historical load. All are fatal at startup.
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("historical bars already loaded")]
    AlreadyLoaded,

    #[error("gap in historical bars at index {index}: {previous} -> {next} (interval {interval})")]
    Gap {
        index: usize,
        previous: DateTime<Utc>,
        next: DateTime<Utc>,
        interval: Interval,
    },

    #[error("historical bar at index {index} is not closed")]
    OpenBar { index: usize },

    #[error("backfill source failed: {0}")]
    Source(String),
}

/// Ordered, time-ascending sequence of bars.
#[derive(Debug, Clone)]
pub struct BarSeries {
    interval: Interval,
    bars: Vec<Bar>,
    historical_len: usize,
    historical_loaded: bool,
}

impl BarSeries {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            bars: Vec::new(),
            historical_len: 0,
            historical_loaded: false,
        }
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Seed the historical prefix. Called once, before any live bar.
    ///
    /// Consecutive bars must be exactly one interval apart (strictly
    /// increasing for calendar-month bars). Gaps are reported, never repaired.
    pub fn load_historical(&mut self, bars: Vec<Bar>) -> Result<usize, BackfillError> {
        if self.historical_loaded || !self.bars.is_empty() {
            return Err(BackfillError::AlreadyLoaded);
        }

        for (index, bar) in bars.iter().enumerate() {
            if !bar.closed {
                return Err(BackfillError::OpenBar { index });
            }
            if index == 0 {
                continue;
            }
            let previous = bars[index - 1].open_time;
            let next = bar.open_time;
            let contiguous = match self.interval.duration() {
                Some(step) => next - previous == step,
                None => next > previous,
            };
            if !contiguous {
                return Err(BackfillError::Gap {
                    index,
                    previous,
                    next,
                    interval: self.interval,
                });
            }
        }

        let loaded = bars.len();
        self.bars = bars
            .into_iter()
            .map(|mut bar| {
                bar.source = BarSource::Historical;
                bar
            })
            .collect();
        self.historical_len = loaded;
        self.historical_loaded = true;
        Ok(loaded)
    }

    /// Append a live bar. Returns `false` (and leaves the series untouched)
    /// for open bars and for bars that are not strictly newer than the last.
    pub fn append(&mut self, bar: Bar) -> bool {
        if !bar.closed {
            debug!(open_time = %bar.open_time, "ignoring open bar");
            return false;
        }
        if let Some(last) = self.bars.last() {
            if bar.open_time <= last.open_time {
                debug!(
                    open_time = %bar.open_time,
                    last = %last.open_time,
                    "ignoring duplicate or stale bar"
                );
                return false;
            }
        }
        self.bars.push(bar);
        true
    }

    /// Read-only (time, close, source) view used as model input.
    pub fn as_projection(&self) -> Projection<'_> {
        Projection { bars: &self.bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn historical_len(&self) -> usize {
        self.historical_len
    }

    pub fn live_len(&self) -> usize {
        self.bars.len() - self.historical_len
    }
}

/// One row of the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub time: DateTime<Utc>,
    pub close: f64,
    pub source: BarSource,
}

/// Borrowed view over the series. Cheap to copy; every call to
/// [`Projection::iter`] restarts from the first bar.
#[derive(Debug, Clone, Copy)]
pub struct Projection<'a> {
    bars: &'a [Bar],
}

impl<'a> Projection<'a> {
    pub fn iter(&self) -> ProjectionIter<'a> {
        ProjectionIter {
            inner: self.bars.iter(),
        }
    }

    /// Close prices in series order.
    pub fn closes(&self) -> Vec<f64> {
        self.iter().map(|p| p.close).collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

impl<'a> IntoIterator for Projection<'a> {
    type Item = ProjectedPoint;
    type IntoIter = ProjectionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct ProjectionIter<'a> {
    inner: std::slice::Iter<'a, Bar>,
}

impl Iterator for ProjectionIter<'_> {
    type Item = ProjectedPoint;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|bar| ProjectedPoint {
            time: bar.open_time,
            close: bar.close_f64(),
            source: bar.source,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ProjectionIter<'_> {}

/// Synthetic one-minute bars from close prices, for tests.
#[cfg(test)]
pub(crate) fn make_bars(closes: &[f64], source: BarSource) -> Vec<Bar> {
    use chrono::{Duration, TimeZone};
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;

    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let close = Decimal::from_f64(close).unwrap();
            let open_time = base + Duration::minutes(i as i64);
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
