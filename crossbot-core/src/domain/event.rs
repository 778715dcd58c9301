//! Inbound kline events as delivered by the market-data transport.
//!
//! Field names follow the exchange's compact wire keys; the serde renames
//! map them onto readable names once, at the boundary.

use super::bar::{Bar, BarSource};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stream message that could not be turned into a kline event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed kline event: {reason}")]
pub struct MalformedEvent {
    pub reason: String,
}

impl MalformedEvent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// One kline update pushed by the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    /// Server-reported event time (ms since epoch).
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlinePayload {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "f")]
    pub first_trade_id: i64,
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "v")]
    pub base_volume: Decimal,
    #[serde(rename = "n")]
    pub number_of_trades: u64,
    #[serde(rename = "x")]
    pub closed: bool,
    #[serde(rename = "q")]
    pub quote_volume: Decimal,
    #[serde(rename = "V")]
    pub taker_buy_base_volume: Decimal,
    #[serde(rename = "Q")]
    pub taker_buy_quote_volume: Decimal,
}

/// Combined-stream envelope: `{"stream": "...", "data": {...}}`.
#[derive(Deserialize)]
struct Envelope {
    data: KlineEvent,
}

impl KlineEvent {
    /// Parse a raw stream message. Both the single-stream form and the
    /// combined-stream envelope are accepted.
    pub fn parse(raw: &str) -> Result<Self, MalformedEvent> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| MalformedEvent::new(e.to_string()))?;
        let event = if value.get("data").is_some() {
            serde_json::from_value::<Envelope>(value).map(|env| env.data)
        } else {
            serde_json::from_value::<KlineEvent>(value)
        }
        .map_err(|e| MalformedEvent::new(e.to_string()))?;

        if event.event_type != "kline" {
            return Err(MalformedEvent::new(format!(
                "unexpected event type {:?}",
                event.event_type
            )));
        }
        Ok(event)
    }

    /// True once the bar is closed and the server clock has passed its close.
    pub fn is_final(&self) -> bool {
        self.kline.closed && self.event_time >= self.kline.close_time
    }

    pub fn event_time_utc(&self) -> Result<DateTime<Utc>, MalformedEvent> {
        millis_to_utc(self.event_time)
    }

    pub fn open_time_utc(&self) -> Result<DateTime<Utc>, MalformedEvent> {
        millis_to_utc(self.kline.open_time)
    }

    /// Convert to an acquired [`Bar`]. Inconsistent OHLC values are
    /// rejected as malformed.
    pub fn to_bar(&self) -> Result<Bar, MalformedEvent> {
        let k = &self.kline;
        let bar = Bar {
            open_time: self.open_time_utc()?,
            close_time: millis_to_utc(k.close_time)?,
            open: k.open,
            high: k.high,
            low: k.low,
            close: k.close,
            base_volume: k.base_volume,
            quote_volume: k.quote_volume,
            taker_buy_base_volume: k.taker_buy_base_volume,
            taker_buy_quote_volume: k.taker_buy_quote_volume,
            number_of_trades: k.number_of_trades,
            first_trade_id: Some(k.first_trade_id),
            last_trade_id: Some(k.last_trade_id),
            closed: k.closed,
            source: BarSource::Acquired,
        };
        if !bar.is_sane() {
            return Err(MalformedEvent::new(format!(
                "inconsistent OHLC at {}: o={} h={} l={} c={}",
                k.open_time, k.open, k.high, k.low, k.close
            )));
        }
        Ok(bar)
    }
}

pub(crate) fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, MalformedEvent> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| MalformedEvent::new(format!("timestamp out of range: {ms}")))
}
