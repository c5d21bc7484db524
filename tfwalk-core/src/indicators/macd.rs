//! MACD histogram: (EMA(fast) - EMA(slow)) minus its signal EMA.
//!
//! Lookback: slow - 1 + signal - 1.

use super::ema::{ema_after_warmup, ema_of_series};
use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct MacdHistogram {
    fast: usize,
    slow: usize,
    signal: usize,
    name: String,
}

impl MacdHistogram {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(fast < slow, "MACD fast period must be below slow period");
        Self {
            fast,
            slow,
            signal,
            name: format!("macd_hist_{fast}_{slow}_{signal}"),
        }
    }
}

impl Default for MacdHistogram {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

impl Indicator for MacdHistogram {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.slow - 1 + self.signal - 1
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);
        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_after_warmup(&line, self.signal);
        line.iter().zip(&signal).map(|(l, s)| l - s).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    #[test]
    fn warmup_length_matches_lookback() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let macd = MacdHistogram::new(3, 6, 4);
        let result = macd.compute(&make_candles(&closes));
        let first_valid = result.iter().position(|v| !v.is_nan()).unwrap();
        assert_eq!(first_valid, macd.lookback());
    }

    #[test]
    fn acceleration_gives_positive_histogram() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64).powf(1.5)).collect();
        let result = MacdHistogram::default().compute(&make_candles(&closes));
        assert!(*result.last().unwrap() > 0.0);
    }

    #[test]
    fn flat_series_histogram_is_zero() {
        let result = MacdHistogram::default().compute(&make_candles(&[50.0; 60]));
        assert!(result.last().unwrap().abs() < 1e-12);
    }
}
