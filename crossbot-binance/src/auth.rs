//! API credentials and request signing.
//!
//! Signed endpoints take the query string plus `signature`, the hex
//! HMAC-SHA256 of that query string keyed with the API secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

pub const API_KEY_VAR: &str = "BINANCE_API_KEY";
pub const API_SECRET_VAR: &str = "BINANCE_API_SECRET";

#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Read `BINANCE_API_KEY` / `BINANCE_API_SECRET`. `None` unless both are
    /// set and non-empty.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var(API_KEY_VAR).ok().filter(|v| !v.is_empty())?;
        let secret = std::env::var(API_SECRET_VAR).ok().filter(|v| !v.is_empty())?;
        Some(Self::new(key, secret))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Hex HMAC-SHA256 of `query`.
    pub fn sign(&self, query: &str) -> String {
        let mut mac = match Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC takes keys of any size"),
        };
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}
