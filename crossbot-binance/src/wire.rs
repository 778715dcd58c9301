//! REST response shapes and their conversion into core types.

use chrono::DateTime;
use crossbot_core::domain::{Bar, BarSource, Fill, InstrumentSpec, OrderSide};
use crossbot_core::exchange::ExchangeError;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Error body returned with 4xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SymbolFilter {
    pub filter_type: String,
    #[serde(default)]
    pub min_qty: Option<Decimal>,
    #[serde(default)]
    pub step_size: Option<Decimal>,
}

impl ExchangeInfo {
    /// Instrument spec from the symbol's LOT_SIZE filter.
    pub fn instrument(self, symbol: &str) -> Result<InstrumentSpec, ExchangeError> {
        let info = self
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::Unknown(symbol.to_string()))?;
        let lot = info
            .filters
            .iter()
            .find(|f| f.filter_type == "LOT_SIZE")
            .ok_or_else(|| ExchangeError::Decode(format!("{symbol}: no LOT_SIZE filter")))?;
        let step_size = lot
            .step_size
            .ok_or_else(|| ExchangeError::Decode(format!("{symbol}: LOT_SIZE without stepSize")))?
            .normalize();
        let min_qty = lot.min_qty.unwrap_or(step_size).normalize();

        Ok(InstrumentSpec {
            symbol: info.symbol,
            base_asset: info.base_asset,
            quote_asset: info.quote_asset,
            step_size,
            min_qty,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Account {
    pub balances: Vec<Balance>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Balance {
    pub asset: String,
    pub free: Decimal,
}

impl Account {
    /// Free balance of `asset`; assets never held are absent and count as zero.
    pub fn free(&self, asset: &str) -> Decimal {
        self.balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TickerPrice {
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderResponse {
    pub side: OrderSide,
    pub executed_qty: Decimal,
    pub cummulative_quote_qty: Decimal,
    #[serde(default)]
    pub fills: Vec<OrderFill>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderFill {
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
}

impl OrderResponse {
    /// Collapse the partial fills of one MARKET order into a single fill at
    /// the volume-weighted price. The commission asset is empty when the
    /// response carried no fill breakdown.
    pub fn into_fill(self) -> Result<Fill, ExchangeError> {
        if self.executed_qty <= Decimal::ZERO {
            return Err(ExchangeError::Decode("order accepted with zero executed quantity".into()));
        }
        let price = (self.cummulative_quote_qty / self.executed_qty).normalize();
        let commission = self.fills.iter().map(|f| f.commission).sum::<Decimal>();
        let commission_asset = self
            .fills
            .first()
            .map(|f| f.commission_asset.clone())
            .unwrap_or_default();

        Ok(Fill {
            side: self.side,
            price,
            quantity: self.executed_qty.normalize(),
            commission: commission.normalize(),
            commission_asset,
        })
    }
}

/// One row of `/api/v3/klines`:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume,
///   trades, taker_base, taker_quote, ignore]`.
#[derive(Debug, Deserialize)]
pub(crate) struct KlineRow(
    pub i64,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub i64,
    pub Decimal,
    pub u64,
    pub Decimal,
    pub Decimal,
    pub serde_json::Value,
);

impl KlineRow {
    pub fn open_time_ms(&self) -> i64 {
        self.0
    }

    pub fn into_bar(self) -> Result<Bar, ExchangeError> {
        let to_utc = |ms: i64| {
            DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| ExchangeError::Decode(format!("kline timestamp out of range: {ms}")))
        };
        Ok(Bar {
            open_time: to_utc(self.0)?,
            close_time: to_utc(self.6)?,
            open: self.1,
            high: self.2,
            low: self.3,
            close: self.4,
            base_volume: self.5,
            quote_volume: self.7,
            taker_buy_base_volume: self.9,
            taker_buy_quote_volume: self.10,
            number_of_trades: self.8,
            first_trade_id: None,
            last_trade_id: None,
            closed: true,
            source: BarSource::Historical,
        })
    }
}
