//! Trend signal models: fast/slow moving-average crossover.
//!
//! A model consumes the series projection and produces one [`SignalOutput`]
//! per bar. Outputs are recomputed over the whole series on each new bar;
//! nothing is carried between fits.

pub mod exponential;
pub mod simple;

pub use exponential::ExponentialAverageModel;
pub use simple::SimpleAverageModel;

use crate::domain::BarSource;
use crate::indicators::Indicator;
use crate::series::Projection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fast/slow values for one bar. `None` while a window is still warming up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalOutput {
    pub time: DateTime<Utc>,
    pub close: f64,
    pub source: BarSource,
    pub fast: Option<f64>,
    pub slow: Option<f64>,
}

impl SignalOutput {
    pub fn crossover(&self) -> Crossover {
        Crossover::of(self.fast, self.slow)
    }
}

/// Crossover indicator for a single point.
///
/// There is no flat state: `fast == slow`, or either value undefined, is
/// bearish and therefore takes the SELL branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crossover {
    Bullish,
    Bearish,
}

impl Crossover {
    pub fn of(fast: Option<f64>, slow: Option<f64>) -> Self {
        match (fast, slow) {
            (Some(f), Some(s)) if f > s => Crossover::Bullish,
            _ => Crossover::Bearish,
        }
    }
}

impl fmt::Display for Crossover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crossover::Bullish => f.write_str("bullish"),
            Crossover::Bearish => f.write_str("bearish"),
        }
    }
}

/// A crossover signal model. Selected by configuration, see [`ModelConfig`].
pub trait SignalModel: Send + Sync {
    /// Model name (e.g., "sma_10_100").
    fn name(&self) -> &str;

    /// (fast, slow) window lengths.
    fn windows(&self) -> (usize, usize);

    /// Fit over the full projection. Returns one output per projected bar.
    fn fit(&self, projection: &Projection<'_>) -> Vec<SignalOutput>;
}

/// Shared fit routine: run the fast and slow indicators over the closes and
/// zip them back with the projection rows.
pub(crate) fn fit_with(
    fast: &dyn Indicator,
    slow: &dyn Indicator,
    projection: &Projection<'_>,
) -> Vec<SignalOutput> {
    let closes = projection.closes();
    let fast_values = fast.compute(&closes);
    let slow_values = slow.compute(&closes);

    projection
        .iter()
        .zip(fast_values.into_iter().zip(slow_values))
        .map(|(point, (f, s))| SignalOutput {
            time: point.time,
            close: point.close,
            source: point.source,
            fast: defined(f),
            slow: defined(s),
        })
        .collect()
}

fn defined(v: f64) -> Option<f64> {
    if v.is_nan() {
        None
    } else {
        Some(v)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelConfigError {
    #[error("fast window must be >= 1 (got {0})")]
    FastTooSmall(usize),

    #[error("slow window ({slow}) must be greater than fast window ({fast})")]
    SlowNotSlower { fast: usize, slow: usize },
}

/// Which moving average the model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Simple,
    Exponential,
}

/// Serializable model selection: kind plus the window pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub fast: usize,
    pub slow: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Exponential,
            fast: 10,
            slow: 100,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ModelConfigError> {
        if self.fast < 1 {
            return Err(ModelConfigError::FastTooSmall(self.fast));
        }
        if self.slow <= self.fast {
            return Err(ModelConfigError::SlowNotSlower {
                fast: self.fast,
                slow: self.slow,
            });
        }
        Ok(())
    }

    /// Build the configured model.
    pub fn build(&self) -> Result<Box<dyn SignalModel>, ModelConfigError> {
        self.validate()?;
        Ok(match self.kind {
            ModelKind::Simple => Box::new(SimpleAverageModel::new(self.fast, self.slow)),
            ModelKind::Exponential => {
                Box::new(ExponentialAverageModel::new(self.fast, self.slow))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossover_tie_is_bearish() {
        assert_eq!(Crossover::of(Some(5.0), Some(5.0)), Crossover::Bearish);
        assert_eq!(Crossover::of(Some(5.1), Some(5.0)), Crossover::Bullish);
        assert_eq!(Crossover::of(Some(4.9), Some(5.0)), Crossover::Bearish);
    }

    #[test]
    fn crossover_undefined_is_bearish() {
        assert_eq!(Crossover::of(None, Some(1.0)), Crossover::Bearish);
        assert_eq!(Crossover::of(Some(1.0), None), Crossover::Bearish);
        assert_eq!(Crossover::of(None, None), Crossover::Bearish);
    }

    #[test]
    fn config_validation() {
        let ok = ModelConfig {
            kind: ModelKind::Simple,
            fast: 2,
            slow: 3,
        };
        assert!(ok.validate().is_ok());
        assert_eq!(
            ModelConfig { fast: 0, ..ok }.validate(),
            Err(ModelConfigError::FastTooSmall(0))
        );
        assert_eq!(
            ModelConfig { fast: 3, ..ok }.validate(),
            Err(ModelConfigError::SlowNotSlower { fast: 3, slow: 3 })
        );
    }

    #[test]
    fn config_builds_selected_model() {
        let model = ModelConfig {
            kind: ModelKind::Simple,
            fast: 2,
            slow: 5,
        }
        .build()
        .unwrap();
        assert_eq!(model.name(), "sma_2_5");
        assert_eq!(model.windows(), (2, 5));

        let model = ModelConfig::default().build().unwrap();
        assert_eq!(model.name(), "ewm_10_100");
    }

    #[test]
    fn config_deserializes_from_toml() {
        let cfg: ModelConfig = toml::from_str("kind = \"simple\"\nfast = 3\nslow = 7\n").unwrap();
        assert_eq!(cfg.kind, ModelKind::Simple);
        assert_eq!((cfg.fast, cfg.slow), (3, 7));
    }
}
