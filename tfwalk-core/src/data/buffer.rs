//! Fixed-capacity rolling candle window for one (instrument, timeframe).

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::domain::Candle;

/// Default number of bars retained per timeframe.
pub const DEFAULT_HISTORY_WINDOW: usize = 200;

/// Default minimum number of bars before indicators are considered stable.
pub const DEFAULT_MIN_BARS: usize = 60;

/// Append-only rolling window. Oldest bars are evicted once full.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    capacity: usize,
    candles: VecDeque<Candle>,
}

impl CandleBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "candle buffer capacity must be >= 1");
        Self {
            capacity,
            candles: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a candle.
    ///
    /// A candle carrying the same timestamp as the current newest bar is a
    /// duplicate tick and is ignored: returns `false`. Otherwise the candle is
    /// appended (evicting the oldest if full) and `true` is returned.
    pub fn push(&mut self, candle: Candle) -> bool {
        if self.last_timestamp() == Some(candle.timestamp) {
            return false;
        }
        if self.candles.len() == self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
        true
    }

    pub fn is_ready(&self, min_bars: usize) -> bool {
        self.candles.len() >= min_bars
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.candles.back().map(|c| c.timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    /// Contiguous copy of the window, oldest first.
    pub fn window(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }
}

impl Default for CandleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn candle(minute: i64) -> Candle {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::minutes(minute);
        Candle::new(ts, 1.0, 1.0, 1.0, minute as f64)
    }

    #[test]
    fn duplicate_tick_is_ignored() {
        let mut buf = CandleBuffer::new(10);
        assert!(buf.push(candle(0)));
        let mut updated = candle(0);
        updated.close = 99.0;
        assert!(!buf.push(updated));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.last().unwrap().close, 0.0);
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut buf = CandleBuffer::new(3);
        for m in 0..5 {
            assert!(buf.push(candle(m * 5)));
        }
        assert_eq!(buf.len(), 3);
        let closes: Vec<f64> = buf.window().iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![10.0, 15.0, 20.0]);
    }

    #[test]
    fn readiness_threshold() {
        let mut buf = CandleBuffer::new(200);
        for m in 0..59 {
            buf.push(candle(m));
        }
        assert!(!buf.is_ready(DEFAULT_MIN_BARS));
        buf.push(candle(59));
        assert!(buf.is_ready(DEFAULT_MIN_BARS));
    }

    #[test]
    #[should_panic(expected = "capacity must be >= 1")]
    fn zero_capacity_rejected() {
        let _ = CandleBuffer::new(0);
    }
}
