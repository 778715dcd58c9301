//! Domain types for crossbot

pub mod bar;
pub mod event;
pub mod instrument;
pub mod order;

pub use bar::{Bar, BarSource, Interval, IntervalError};
pub use event::{KlineEvent, KlinePayload, MalformedEvent};
pub use instrument::InstrumentSpec;
pub use order::{AttemptOutcome, Fill, OrderAttempt, OrderRequest, OrderSide, TradeAction};
