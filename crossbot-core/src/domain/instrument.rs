use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trading pair metadata needed for sizing orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    /// Quantity increment (lot step). One retry removes exactly one step.
    pub step_size: Decimal,
    /// Smallest tradable quantity.
    pub min_qty: Decimal,
}

impl InstrumentSpec {
    /// Round a quantity down to a whole number of steps.
    pub fn floor_quantity(&self, qty: Decimal) -> Decimal {
        if self.step_size <= Decimal::ZERO {
            return qty;
        }
        let steps = (qty / self.step_size).floor();
        (steps * self.step_size).normalize()
    }

    /// Positive and at least the minimum tradable quantity.
    pub fn is_tradable(&self, qty: Decimal) -> bool {
        qty > Decimal::ZERO && qty >= self.min_qty
    }
}
