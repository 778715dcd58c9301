//! Exponentially Weighted Mean (EWM), bias-adjusted.
//!
//! alpha = 2 / (span + 1). The value at t is the weighted mean of every close
//! up to t with weights (1 - alpha)^age, normalised by the sum of weights:
//!
//!   num[t] = x[t] + (1 - alpha) * num[t-1]
//!   den[t] = 1    + (1 - alpha) * den[t-1]
//!   ewm[t] = num[t] / den[t]
//!
//! Undefined until `span` observations exist, so it warms up over the same
//! window as an SMA of the same length. A constant input yields exactly that
//! constant from the first valid index on.

use super::Indicator;

#[derive(Debug, Clone)]
pub struct Ewm {
    span: usize,
    name: String,
}

impl Ewm {
    pub fn new(span: usize) -> Self {
        assert!(span >= 1, "EWM span must be >= 1");
        Self {
            span,
            name: format!("ewm_{span}"),
        }
    }

    pub fn alpha(&self) -> f64 {
        2.0 / (self.span as f64 + 1.0)
    }
}

impl Indicator for Ewm {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, closes: &[f64]) -> Vec<f64> {
        let decay = 1.0 - self.alpha();
        let mut result = Vec::with_capacity(closes.len());
        let mut num = 0.0;
        let mut den = 0.0;
        let mut observations = 0usize;

        for &x in closes {
            num *= decay;
            den *= decay;
            // Missing closes still age the older weights.
            if !x.is_nan() {
                num += x;
                den += 1.0;
                observations += 1;
            }
            if observations >= self.span && den > 0.0 {
                result.push(num / den);
            } else {
                result.push(f64::NAN);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn ewm_span_1_equals_close() {
        let result = Ewm::new(1).compute(&[100.0, 200.0, 300.0]);
        assert_approx(result[0], 100.0, DEFAULT_EPSILON);
        assert_approx(result[1], 200.0, DEFAULT_EPSILON);
        assert_approx(result[2], 300.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ewm_3_known_values() {
        // alpha = 0.5
        // t2: (12 + 0.5*11 + 0.25*10) / 1.75 = 20 / 1.75
        // t3: (13 + 0.5*20) / (1 + 0.5*1.75) = 23 / 1.875
        let result = Ewm::new(3).compute(&[10.0, 11.0, 12.0, 13.0]);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_approx(result[2], 20.0 / 1.75, DEFAULT_EPSILON);
        assert_approx(result[3], 23.0 / 1.875, DEFAULT_EPSILON);
    }

    #[test]
    fn ewm_constant_input_has_no_bias() {
        let closes = vec![250.5; 40];
        let result = Ewm::new(10).compute(&closes);
        for v in result.iter().skip(9) {
            assert_approx(*v, 250.5, 1e-9);
        }
        assert!(result[8].is_nan());
    }

    #[test]
    fn ewm_nan_does_not_count_as_observation() {
        let result = Ewm::new(2).compute(&[10.0, f64::NAN, 12.0]);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        // weights: 12 -> 1, 10 -> (1/3)^2
        let w = (1.0_f64 / 3.0).powi(2);
        assert_approx(result[2], (12.0 + 10.0 * w) / (1.0 + w), DEFAULT_EPSILON);
    }

    #[test]
    fn ewm_lags_behind_a_trend() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let result = Ewm::new(5).compute(&closes);
        assert!(result[29] < closes[29]);
        assert!(result[29] > closes[20]);
    }
}
