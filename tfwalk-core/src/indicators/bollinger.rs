//! Bollinger %B: position of the close inside the bands.
//!
//! %B = (close - lower) / (upper - lower), bands = SMA ± mult × population stddev.
//! Zero-width bands yield 0.5. Lookback: period - 1.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct PercentB {
    period: usize,
    multiplier: f64,
    name: String,
}

impl PercentB {
    pub fn new(period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self {
            period,
            multiplier,
            name: format!("bb_percent_b_{period}_{multiplier}"),
        }
    }
}

impl Default for PercentB {
    fn default() -> Self {
        Self::new(20, 2.0)
    }
}

impl Indicator for PercentB {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let n = candles.len();
        let mut result = vec![f64::NAN; n];
        if n < self.period {
            return result;
        }

        for i in (self.period - 1)..n {
            let window = &candles[i + 1 - self.period..=i];
            if window.iter().any(|c| c.close.is_nan()) {
                continue;
            }
            let mean = window.iter().map(|c| c.close).sum::<f64>() / self.period as f64;
            let variance = window
                .iter()
                .map(|c| (c.close - mean).powi(2))
                .sum::<f64>()
                / self.period as f64;
            let half_width = self.multiplier * variance.sqrt();
            let lower = mean - half_width;
            result[i] = if half_width > 0.0 {
                (candles[i].close - lower) / (2.0 * half_width)
            } else {
                0.5
            };
        }
        result
    }
}
