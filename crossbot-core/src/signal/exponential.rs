//! Exponential moving-average crossover model.

use super::{fit_with, SignalModel, SignalOutput};
use crate::indicators::Ewm;
use crate::series::Projection;

/// fast/slow = bias-adjusted exponentially weighted means with spans
/// `fast`/`slow`, each undefined until its span of observations exists.
#[derive(Debug, Clone)]
pub struct ExponentialAverageModel {
    fast: Ewm,
    slow: Ewm,
    windows: (usize, usize),
    name: String,
}

impl ExponentialAverageModel {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast: Ewm::new(fast),
            slow: Ewm::new(slow),
            windows: (fast, slow),
            name: format!("ewm_{fast}_{slow}"),
        }
    }
}

impl SignalModel for ExponentialAverageModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn windows(&self) -> (usize, usize) {
        self.windows
    }

    fn fit(&self, projection: &Projection<'_>) -> Vec<SignalOutput> {
        fit_with(&self.fast, &self.slow, projection)
    }
}
