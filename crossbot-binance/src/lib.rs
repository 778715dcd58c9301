//! Crossbot Binance: spot exchange collaborators for crossbot-core.
//!
//! - [`BinanceRest`]: balances, prices, symbol filters, MARKET and test
//!   orders, paginated kline backfill
//! - [`KlineStream`]: kline WebSocket transport
//! - [`Credentials`]: API key and HMAC-SHA256 request signing

pub mod auth;
pub mod rest;
pub mod stream;
mod wire;

pub use auth::Credentials;
pub use rest::BinanceRest;
pub use stream::KlineStream;

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn rest_client_is_send_sync() {
        assert_send::<BinanceRest>();
        assert_sync::<BinanceRest>();
        assert_send::<Credentials>();
        assert_sync::<Credentials>();
    }

    #[test]
    fn stream_is_send() {
        assert_send::<KlineStream>();
    }
}
