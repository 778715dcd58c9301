//! Simple moving-average crossover model.

use super::{fit_with, SignalModel, SignalOutput};
use crate::indicators::Sma;
use crate::series::Projection;

/// fast = mean of the last `fast` closes, slow = mean of the last `slow`.
#[derive(Debug, Clone)]
pub struct SimpleAverageModel {
    fast: Sma,
    slow: Sma,
    windows: (usize, usize),
    name: String,
}

impl SimpleAverageModel {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast: Sma::new(fast),
            slow: Sma::new(slow),
            windows: (fast, slow),
            name: format!("sma_{fast}_{slow}"),
        }
    }
}

impl SignalModel for SimpleAverageModel {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BarSource, Interval};
    use crate::series::{make_bars, BarSeries};
    use crate::signal::Crossover;

    #[test]
    fn warmup_is_undefined() {
        let mut series = BarSeries::new(Interval::Minutes(1));
        series
            .load_historical(make_bars(&[1.0, 2.0, 3.0], BarSource::Historical))
            .unwrap();
        let out = SimpleAverageModel::new(2, 3).fit(&series.as_projection());
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].fast, None);
        assert_eq!(out[1].fast, Some(1.5));
        assert_eq!(out[1].slow, None);
        assert_eq!(out[2].slow, Some(2.0));
    }

    #[test]
    fn rising_closes_are_bullish() {
        let mut series = BarSeries::new(Interval::Minutes(1));
        series
            .load_historical(make_bars(&[100.0, 101.0, 102.0, 103.0], BarSource::Historical))
            .unwrap();
        let out = SimpleAverageModel::new(2, 3).fit(&series.as_projection());
        let last = out.last().unwrap();
        assert_eq!(last.fast, Some(102.5));
        assert_eq!(last.slow, Some(102.0));
        assert_eq!(last.crossover(), Crossover::Bullish);
    }

    #[test]
    fn flat_closes_tie_to_bearish() {
        let mut series = BarSeries::new(Interval::Minutes(1));
        series
            .load_historical(make_bars(&[50.0; 6], BarSource::Historical))
            .unwrap();
        let out = SimpleAverageModel::new(2, 4).fit(&series.as_projection());
        let last = out.last().unwrap();
        assert_eq!(last.fast, last.slow);
        assert_eq!(last.crossover(), Crossover::Bearish);
    }
}
