//! Binance spot REST client.
//!
//! Blocking calls with a fixed timeout. Every failure is mapped onto
//! [`ExchangeError`] so the executor can tell a rejection (retry smaller)
//! from a configuration problem (give up). Nothing here retries on its own.

use crate::auth::Credentials;
use crate::wire::{Account, ApiError, ExchangeInfo, KlineRow, OrderResponse, TickerPrice};
use chrono::{DateTime, Utc};
use crossbot_core::domain::{Bar, Fill, InstrumentSpec, Interval, OrderRequest};
use crossbot_core::exchange::{Exchange, ExchangeError, HistorySource};
use crossbot_core::ExchangeSettings;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::{Duration as StdDuration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Klines per page of `/api/v3/klines`.
pub const KLINE_PAGE_LIMIT: usize = 1000;

/// API key rejected or lacking permission.
const AUTH_ERROR_CODES: [i64; 3] = [-2014, -2015, -1022];

pub struct BinanceRest {
    client: Client,
    base_url: String,
    recv_window_ms: u64,
    credentials: Option<Credentials>,
}

impl BinanceRest {
    pub fn new(
        settings: &ExchangeSettings,
        credentials: Option<Credentials>,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(settings.timeout_secs))
            .user_agent(concat!("crossbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.rest_url.trim_end_matches('/').to_string(),
            recv_window_ms: settings.recv_window_ms,
            credentials,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Unsigned GET of a market-data endpoint.
    fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let request = self.client.get(self.url(path)).query(params);
        send(request, path)
    }

    /// Signed request: timestamp, recvWindow and signature are appended.
    fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| ExchangeError::Auth("API credentials are not configured".into()))?;

        let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        query.push(format!("recvWindow={}", self.recv_window_ms));
        query.push(format!("timestamp={}", timestamp_ms()));
        let query = query.join("&");
        let signature = credentials.sign(&query);

        let url = format!("{}?{}&signature={}", self.url(path), query, signature);
        let request = self
            .client
            .request(method, url)
            .header("X-MBX-APIKEY", credentials.api_key());
        send(request, path)
    }

    fn order_params(order: &OrderRequest) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", order.quantity.normalize().to_string()),
        ]
    }
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

fn send<T: DeserializeOwned>(request: RequestBuilder, path: &str) -> Result<T, ExchangeError> {
    let response = request.send().map_err(map_transport_error)?;
    let status = response.status();
    let body = response.text().map_err(map_transport_error)?;
    debug!(%path, status = status.as_u16(), bytes = body.len(), "binance response");

    if !status.is_success() {
        return Err(map_status(status, &body));
    }
    serde_json::from_str(&body)
        .map_err(|e| ExchangeError::Decode(format!("{path}: {e}")))
}

/// Map a failure that happened before a status code arrived.
pub(crate) fn map_transport_error(err: reqwest::Error) -> ExchangeError {
    if err.is_timeout() {
        ExchangeError::Timeout(err.to_string())
    } else if err.is_decode() {
        ExchangeError::Decode(err.to_string())
    } else {
        ExchangeError::Network(err.to_string())
    }
}

/// Map a non-2xx response.
pub(crate) fn map_status(status: StatusCode, body: &str) -> ExchangeError {
    let api_error = serde_json::from_str::<ApiError>(body).ok();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let message = api_error.map(|e| e.msg).unwrap_or_else(|| body.to_string());
        return ExchangeError::Auth(message);
    }
    if status.is_client_error()
        && status != StatusCode::TOO_MANY_REQUESTS
        && status.as_u16() != 418
    {
        if let Some(ApiError { code, msg }) = api_error {
            if AUTH_ERROR_CODES.contains(&code) {
                return ExchangeError::Auth(msg);
            }
            return ExchangeError::Rejected { code, message: msg };
        }
    }
    ExchangeError::Http {
        status: status.as_u16(),
        body: body.to_string(),
    }
}

impl Exchange for BinanceRest {
    fn instrument(&self, symbol: &str) -> Result<InstrumentSpec, ExchangeError> {
        let info: ExchangeInfo =
            self.public_get("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())])?;
        info.instrument(symbol)
    }

    fn balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        let account: Account = self.signed(Method::GET, "/api/v3/account", &[])?;
        Ok(account.free(asset))
    }

    fn price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let ticker: TickerPrice =
            self.public_get("/api/v3/ticker/price", &[("symbol", symbol.to_string())])?;
        Ok(ticker.price)
    }

    fn submit_order(&self, order: &OrderRequest) -> Result<Fill, ExchangeError> {
        let mut params = Self::order_params(order);
        params.push(("newOrderRespType", "FULL".to_string()));
        info!(symbol = %order.symbol, side = %order.side, quantity = %order.quantity, "submitting market order");

        let response: OrderResponse = self.signed(Method::POST, "/api/v3/order", &params)?;
        response.into_fill()
    }

    fn validate_order(&self, order: &OrderRequest) -> Result<(), ExchangeError> {
        info!(symbol = %order.symbol, side = %order.side, quantity = %order.quantity, "validating test order");
        let _: serde_json::Value =
            self.signed(Method::POST, "/api/v3/order/test", &Self::order_params(order))?;
        Ok(())
    }
}

impl HistorySource for BinanceRest {
    /// Pages through `/api/v3/klines`, `KLINE_PAGE_LIMIT` rows at a time.
    fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, ExchangeError> {
        let end_ms = end.timestamp_millis();
        let mut cursor = start.timestamp_millis();
        let mut bars = Vec::new();

        while cursor <= end_ms {
            let rows: Vec<KlineRow> = self.public_get(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.code()),
                    ("startTime", cursor.to_string()),
                    ("endTime", end_ms.to_string()),
                    ("limit", KLINE_PAGE_LIMIT.to_string()),
                ],
            )?;
            let page_len = rows.len();
            let Some(last_open) = rows.last().map(KlineRow::open_time_ms) else {
                break;
            };
            for row in rows {
                bars.push(row.into_bar()?);
            }
            debug!(%symbol, page_len, total = bars.len(), "kline page fetched");

            if page_len < KLINE_PAGE_LIMIT {
                break;
            }
            cursor = last_open + 1;
        }

        info!(
            %symbol,
            %interval,
            start = %start,
            end = %end,
            bars = bars.len(),
            "historical klines fetched"
        );
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_with_code_is_rejection() {
        let err = map_status(
            StatusCode::BAD_REQUEST,
            r#"{"code":-2010,"msg":"Account has insufficient balance for requested action."}"#,
        );
        assert_eq!(
            err,
            ExchangeError::Rejected {
                code: -2010,
                message: "Account has insufficient balance for requested action.".into()
            }
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn lot_size_failure_is_rejection() {
        let err = map_status(
            StatusCode::BAD_REQUEST,
            r#"{"code":-1013,"msg":"Filter failure: LOT_SIZE"}"#,
        );
        assert!(matches!(err, ExchangeError::Rejected { code: -1013, .. }));
    }

    #[test]
    fn bad_key_is_auth() {
        let err = map_status(
            StatusCode::BAD_REQUEST,
            r#"{"code":-2014,"msg":"API-key format invalid."}"#,
        );
        assert!(matches!(err, ExchangeError::Auth(_)));
        assert!(!err.is_retryable());

        let err = map_status(StatusCode::UNAUTHORIZED, "{}");
        assert!(matches!(err, ExchangeError::Auth(_)));
    }

    #[test]
    fn rate_limit_and_server_errors_are_http() {
        let err = map_status(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"code":-1003,"msg":"Too many requests"}"#,
        );
        assert!(matches!(err, ExchangeError::Http { status: 429, .. }));

        let err = map_status(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(matches!(err, ExchangeError::Http { status: 502, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn signed_call_without_credentials_is_auth_error() {
        let rest = BinanceRest::new(&ExchangeSettings::default(), None).unwrap();
        assert!(!rest.has_credentials());
        assert!(matches!(rest.balance("BTC"), Err(ExchangeError::Auth(_))));
    }
}
