//! Snapshot providers and the per-timeframe snapshot cache.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::{Adx, Atr, Ema, Indicator, IndicatorSnapshot, MacdHistogram, PercentB, Rsi};
use crate::data::CandleBuffer;
use crate::domain::{Candle, Timeframe, Trend};

/// Maps a candle window (oldest first) to an indicator snapshot.
///
/// Returns `None` for an empty window. Malformed numeric input must surface as
/// missing or `NaN` fields, never as a panic.
pub trait SnapshotProvider: Send + Sync {
    fn compute(&self, window: &[Candle]) -> Option<IndicatorSnapshot>;
}

/// Reference provider built from the series indicators in this module.
#[derive(Debug, Clone)]
pub struct StandardProvider {
    rsi: Rsi,
    atr: Atr,
    adx: Adx,
    macd: MacdHistogram,
    percent_b: PercentB,
    ema9: Ema,
    ema20: Ema,
    ema21: Ema,
    ema50: Ema,
}

impl Default for StandardProvider {
    fn default() -> Self {
        Self {
            rsi: Rsi::new(14),
            atr: Atr::new(14),
            adx: Adx::new(14),
            macd: MacdHistogram::default(),
            percent_b: PercentB::default(),
            ema9: Ema::new(9),
            ema20: Ema::new(20),
            ema21: Ema::new(21),
            ema50: Ema::new(50),
        }
    }
}

fn last_value(indicator: &dyn Indicator, window: &[Candle]) -> Option<f64> {
    indicator
        .compute(window)
        .last()
        .copied()
        .filter(|v| v.is_finite())
}

/// Mean of the normalized RSI, %B and MACD-sign components, each in [-1, 1].
fn composite_score(rsi: Option<f64>, percent_b: Option<f64>, macd_hist: Option<f64>) -> Option<f64> {
    let rsi_part = (rsi? - 50.0) / 50.0;
    let band_part = (2.0 * (percent_b? - 0.5)).clamp(-1.0, 1.0);
    let hist = macd_hist?;
    let macd_part = if hist > 0.0 {
        1.0
    } else if hist < 0.0 {
        -1.0
    } else {
        0.0
    };
    Some((rsi_part + band_part + macd_part) / 3.0)
}

impl SnapshotProvider for StandardProvider {
    fn compute(&self, window: &[Candle]) -> Option<IndicatorSnapshot> {
        let last = window.last()?;

        let mut snapshot = IndicatorSnapshot::new(last.timestamp, last.close);
        snapshot.rsi = last_value(&self.rsi, window);
        snapshot.atr = last_value(&self.atr, window);
        snapshot.adx = last_value(&self.adx, window);
        snapshot.macd_hist = last_value(&self.macd, window);
        snapshot.bb_percent_b = last_value(&self.percent_b, window);
        snapshot.ema9 = last_value(&self.ema9, window);
        snapshot.ema20 = last_value(&self.ema20, window);
        snapshot.ema21 = last_value(&self.ema21, window);
        snapshot.ema50 = last_value(&self.ema50, window);
        snapshot.composite =
            composite_score(snapshot.rsi, snapshot.bb_percent_b, snapshot.macd_hist);
        snapshot.trend_label = snapshot.ema50.filter(|_| last.close.is_finite()).map(|ema| {
            if last.close > ema {
                Trend::Bullish
            } else if last.close < ema {
                Trend::Bearish
            } else {
                Trend::Neutral
            }
        });

        Some(snapshot)
    }
}

/// Per-timeframe memo keyed on the newest candle's timestamp.
///
/// The provider is only consulted when a buffer's newest bar differs from the
/// one the cached snapshot was computed from.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: BTreeMap<Timeframe, (DateTime<Utc>, Option<IndicatorSnapshot>)>,
    hits: u64,
    misses: u64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(
        &mut self,
        timeframe: Timeframe,
        buffer: &CandleBuffer,
        provider: &dyn SnapshotProvider,
    ) -> Option<IndicatorSnapshot> {
        let newest = buffer.last_timestamp()?;
        if let Some((cached_at, snapshot)) = self.entries.get(&timeframe) {
            if *cached_at == newest {
                self.hits += 1;
                return snapshot.clone();
            }
        }
        self.misses += 1;
        let snapshot = provider.compute(&buffer.window());
        self.entries.insert(timeframe, (newest, snapshot.clone()));
        snapshot
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_candles, Field};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn empty_window_yields_none() {
        assert!(StandardProvider::default().compute(&[]).is_none());
    }

    #[test]
    fn short_window_leaves_fields_missing() {
        let candles = make_candles(&[1.0, 1.1, 1.2, 1.3, 1.4]);
        let snap = StandardProvider::default().compute(&candles).unwrap();
        assert_eq!(snap.close, 1.4);
        assert!(snap.rsi.is_none());
        assert!(snap.ema50.is_none());
        assert!(snap.trend_label.is_none());
    }

    #[test]
    fn full_window_populates_every_field() {
        let closes: Vec<f64> = (0..120)
            .map(|i| 100.0 + i as f64 * 0.1 + (i as f64 * 0.5).sin())
            .collect();
        let snap = StandardProvider::default()
            .compute(&make_candles(&closes))
            .unwrap();
        for field in Field::ALL {
            assert!(snap.finite_value(field).is_some(), "{field} missing");
        }
        assert_eq!(snap.trend_label, Some(Trend::Bullish));
        let composite = snap.composite.unwrap();
        assert!((-1.0..=1.0).contains(&composite));
    }

    #[test]
    fn nan_prices_do_not_panic() {
        let mut candles = make_candles(&[1.0; 80]);
        candles[40].close = f64::NAN;
        let snap = StandardProvider::default().compute(&candles).unwrap();
        assert!(snap.ema20.is_none());
    }

    struct Counting(AtomicUsize);

    impl SnapshotProvider for Counting {
        fn compute(&self, window: &[Candle]) -> Option<IndicatorSnapshot> {
            self.0.fetch_add(1, Ordering::SeqCst);
            window.last().map(|c| IndicatorSnapshot::new(c.timestamp, c.close))
        }
    }

    #[test]
    fn cache_recomputes_only_on_new_bar() {
        let provider = Counting(AtomicUsize::new(0));
        let mut cache = SnapshotCache::new();
        let mut buffer = CandleBuffer::new(10);
        let candles = make_candles(&[1.0, 2.0]);

        assert!(cache.get_or_compute(Timeframe::M5, &buffer, &provider).is_none());
        buffer.push(candles[0]);
        cache.get_or_compute(Timeframe::M5, &buffer, &provider);
        cache.get_or_compute(Timeframe::M5, &buffer, &provider);
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);

        buffer.push(candles[1]);
        let snap = cache.get_or_compute(Timeframe::M5, &buffer, &provider).unwrap();
        assert_eq!(snap.close, 2.0);
        assert_eq!(provider.0.load(Ordering::SeqCst), 2);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 2);
    }
}
