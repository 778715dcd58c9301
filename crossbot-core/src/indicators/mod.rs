//! Moving-average indicators over a close-price series.
//!
//! Indicators are pure functions: closes in, numeric series of the same
//! length out. Warmup positions are `f64::NAN`. Both are recomputed over the
//! whole series on every new bar.

pub mod ewm;
pub mod sma;

pub use ewm::Ewm;
pub use sma::Sma;

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No value at index t may depend on a close at t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_10", "ewm_100").
    fn name(&self) -> &str;

    /// Compute the indicator over the entire close series.
    fn compute(&self, closes: &[f64]) -> Vec<f64>;
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
