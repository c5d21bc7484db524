//! Indicator snapshot provider and the series indicators behind it.
//!
//! Series indicators are pure functions: candle window in, numeric series out,
//! same length, `NaN` during warmup. The provider reduces each series to its
//! newest value and bundles them into an [`IndicatorSnapshot`].

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod provider;
pub mod rsi;
pub mod snapshot;

pub use adx::Adx;
pub use atr::Atr;
pub use bollinger::PercentB;
pub use ema::Ema;
pub use macd::MacdHistogram;
pub use provider::{SnapshotCache, SnapshotProvider, StandardProvider};
pub use rsi::Rsi;
pub use snapshot::{Field, IndicatorSnapshot};

use crate::domain::Candle;

/// A series indicator.
///
/// # Look-ahead contamination guard
/// No value at index t may depend on candles after t. Every indicator must
/// pass the truncated-vs-full series test.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_20", "atr_14").
    fn name(&self) -> &str;

    /// Number of candles needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator over the whole window. Output has the same
    /// length as `candles`; the first `lookback()` values are `NaN`.
    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Synthetic 5-minute candles from close prices, for tests.
///
/// open = previous close (or close for the first candle),
/// high = max(open, close) + 1.0, low = min(open, close) - 1.0.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    use chrono::{Duration, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                base + Duration::minutes(5 * i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
            )
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
