//! Simple Moving Average (SMA).
//!
//! Rolling arithmetic mean of the last `period` closes. The first valid
//! value sits at index `period - 1`.

use super::Indicator;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, closes: &[f64]) -> Vec<f64> {
        let n = closes.len();
        let mut result = vec![f64::NAN; n];

        if n < self.period {
            return result;
        }

        // Windows are re-summed rather than rolled so float error does not
        // accumulate over a long-running series.
        for end in (self.period - 1)..n {
            let window = &closes[(end + 1 - self.period)..=end];
            if window.iter().any(|v| v.is_nan()) {
                continue;
            }
            result[end] = window.iter().sum::<f64>() / self.period as f64;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn sma_5_basic() {
        let closes = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0];
        let result = Sma::new(5).compute(&closes);

        assert_eq!(result.len(), 7);
        for (i, v) in result.iter().take(4).enumerate() {
            assert!(v.is_nan(), "expected NaN at index {i}");
        }
        assert_approx(result[4], 12.0, DEFAULT_EPSILON);
        assert_approx(result[5], 13.0, DEFAULT_EPSILON);
        assert_approx(result[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_1_is_close() {
        let result = Sma::new(1).compute(&[100.0, 200.0, 300.0]);
        assert_eq!(result, vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn sma_nan_propagation() {
        let closes = [10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0];
        let result = Sma::new(3).compute(&closes);
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
        assert_approx(result[5], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_too_few_closes() {
        let result = Sma::new(5).compute(&[10.0, 11.0]);
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn sma_name() {
        assert_eq!(Sma::new(20).name(), "sma_20");
    }
}
