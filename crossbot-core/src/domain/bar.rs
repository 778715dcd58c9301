//! Bar: the fundamental market data unit.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Where a bar entered the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarSource {
    /// Loaded once at startup from the backfill collaborator.
    Historical,
    /// Received from the live kline stream.
    Acquired,
}

impl BarSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarSource::Historical => "historical",
            BarSource::Acquired => "acquired",
        }
    }
}

impl fmt::Display for BarSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One interval-aggregated price observation for the traded pair.
///
/// Prices and volumes are kept as exact decimals, the way the exchange
/// reports them. Models read the close through [`Bar::close_f64`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub base_volume: Decimal,
    pub quote_volume: Decimal,
    pub taker_buy_base_volume: Decimal,
    pub taker_buy_quote_volume: Decimal,
    pub number_of_trades: u64,
    /// Only present on stream events.
    pub first_trade_id: Option<i64>,
    pub last_trade_id: Option<i64>,
    pub closed: bool,
    pub source: BarSource,
}

impl Bar {
    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(f64::NAN)
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > Decimal::ZERO
            && self.close > Decimal::ZERO
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported kline interval: {0:?}")]
pub struct IntervalError(pub String);

/// Kline interval, using the exchange's interval codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Minutes(u32),
    Hours(u32),
    Days(u32),
    Weeks(u32),
    /// Calendar month: variable length.
    Month,
}

impl Interval {
    /// Codes accepted by the exchange.
    pub const SUPPORTED: &'static [&'static str] = &[
        "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
        "1M",
    ];

    /// Fixed length of one interval, `None` for calendar months.
    pub fn duration(&self) -> Option<Duration> {
        match *self {
            Interval::Minutes(n) => Some(Duration::minutes(n as i64)),
            Interval::Hours(n) => Some(Duration::hours(n as i64)),
            Interval::Days(n) => Some(Duration::days(n as i64)),
            Interval::Weeks(n) => Some(Duration::weeks(n as i64)),
            Interval::Month => None,
        }
    }

    pub fn code(&self) -> String {
        match *self {
            Interval::Minutes(n) => format!("{n}m"),
            Interval::Hours(n) => format!("{n}h"),
            Interval::Days(n) => format!("{n}d"),
            Interval::Weeks(n) => format!("{n}w"),
            Interval::Month => "1M".to_string(),
        }
    }

    /// Open time of the interval containing `t`.
    ///
    /// Fixed-length intervals are aligned to the Unix epoch, weeks to
    /// Monday 00:00 UTC and months to the first of the month.
    pub fn floor(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Interval::Month => Utc
                .with_ymd_and_hms(t.year(), t.month(), 1, 0, 0, 0)
                .single()
                .unwrap_or(t),
            // 1970-01-05 was the first Monday after the epoch.
            Interval::Weeks(n) => floor_millis(
                t,
                Duration::weeks(n as i64).num_milliseconds(),
                Duration::days(4).num_milliseconds(),
            ),
            other => match other.duration() {
                Some(step) => floor_millis(t, step.num_milliseconds(), 0),
                None => t,
            },
        }
    }
}

fn floor_millis(t: DateTime<Utc>, step_ms: i64, offset_ms: i64) -> DateTime<Utc> {
    if step_ms <= 0 {
        return t;
    }
    let ms = t.timestamp_millis() - offset_ms;
    let floored = ms - ms.rem_euclid(step_ms) + offset_ms;
    DateTime::from_timestamp_millis(floored).unwrap_or(t)
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::SUPPORTED.contains(&s) {
            return Err(IntervalError(s.to_string()));
        }
        let (num, unit) = s.split_at(s.len() - 1);
        let n: u32 = num.parse().map_err(|_| IntervalError(s.to_string()))?;
        match unit {
            "m" => Ok(Interval::Minutes(n)),
            "h" => Ok(Interval::Hours(n)),
            "d" => Ok(Interval::Days(n)),
            "w" => Ok(Interval::Weeks(n)),
            "M" => Ok(Interval::Month),
            _ => Err(IntervalError(s.to_string())),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl Serialize for Interval {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
