//! Bot configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file is a valid configuration:
//! BTCUSDT on 1m bars, EMA 10/100, paper execution, no history backfill.

use crate::domain::Interval;
use crate::execution::{ExecutionMode, ExecutorConfig, ExecutorConfigError};
use crate::signal::{ModelConfig, ModelConfigError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid symbol {0:?}: expected uppercase letters and digits")]
    Symbol(String),

    #[error("invalid model: {0}")]
    Model(#[from] ModelConfigError),

    #[error("invalid execution settings: {0}")]
    Execution(#[from] ExecutorConfigError),

    #[error("invalid history_start {value:?}: {reason}")]
    HistoryStart { value: String, reason: String },

    #[error("invalid exchange settings: {0}")]
    Exchange(String),
}

/// Endpoints and timeouts of the exchange connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub rest_url: String,
    pub ws_url: String,
    /// Validity window of signed requests.
    pub recv_window_ms: u64,
    /// Timeout of every REST call.
    pub timeout_secs: u64,
    /// Read timeout of the stream; the stop flag is checked this often.
    pub poll_timeout_ms: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            rest_url: "https://api.binance.com".into(),
            ws_url: "wss://stream.binance.com:9443".into(),
            recv_window_ms: 5000,
            timeout_secs: 10,
            poll_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub symbol: String,
    pub interval: Interval,
    pub output_dir: PathBuf,
    /// `true` places real orders, `false` only validates them.
    pub execution_enabled: bool,
    /// RFC 3339 timestamp or a relative form such as "1 day ago UTC".
    /// Absent or blank: no backfill, the series starts empty.
    pub history_start: Option<String>,
    pub model: ModelConfig,
    pub execution: ExecutorConfig,
    pub exchange: ExchangeSettings,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".into(),
            interval: Interval::Minutes(1),
            output_dir: PathBuf::from("output_data"),
            execution_enabled: false,
            history_start: None,
            model: ModelConfig::default(),
            execution: ExecutorConfig::default(),
            exchange: ExchangeSettings::default(),
        }
    }
}

impl BotConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let symbol_ok = !self.symbol.is_empty()
            && self
                .symbol
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !symbol_ok {
            return Err(ConfigError::Symbol(self.symbol.clone()));
        }
        self.model.validate()?;
        self.execution.validate()?;
        if self.exchange.timeout_secs == 0 {
            return Err(ConfigError::Exchange("timeout_secs must be >= 1".into()));
        }
        if self.exchange.poll_timeout_ms == 0 {
            return Err(ConfigError::Exchange("poll_timeout_ms must be >= 1".into()));
        }
        self.history_start_at(Utc::now())?;
        Ok(())
    }

    pub fn mode(&self) -> ExecutionMode {
        ExecutionMode::from_enabled(self.execution_enabled)
    }

    /// Resolve `history_start` against `now`. `None` when no backfill is
    /// configured.
    pub fn history_start_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ConfigError> {
        match self.history_start.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => parse_history_start(value, now).map(Some),
        }
    }
}

/// Parse an absolute (RFC 3339) or relative ("<n> <unit>s ago [UTC]") start.
pub fn parse_history_start(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ConfigError> {
    let invalid = |reason: &str| ConfigError::HistoryStart {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(t.with_timezone(&Utc));
    }

    let mut words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.last().is_some_and(|w| w.eq_ignore_ascii_case("utc")) {
        words.pop();
    }
    let [count, unit, ago] = words.as_slice() else {
        return Err(invalid("expected RFC 3339 or \"<n> <unit> ago\""));
    };
    if !ago.eq_ignore_ascii_case("ago") {
        return Err(invalid("relative start must end with \"ago\""));
    }
    let n: i64 = count.parse().map_err(|_| invalid("count is not a number"))?;
    if n < 0 {
        return Err(invalid("count must not be negative"));
    }
    let unit = unit.to_ascii_lowercase();
    let span = match unit.trim_end_matches('s') {
        "minute" => Duration::minutes(n),
        "hour" => Duration::hours(n),
        "day" => Duration::days(n),
        "week" => Duration::weeks(n),
        _ => return Err(invalid("unit must be minute, hour, day or week")),
    };
    Ok(now - span)
}
