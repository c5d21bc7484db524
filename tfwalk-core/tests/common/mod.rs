//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use tfwalk_core::domain::{Candle, Timeframe};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
}

/// Deterministic 5-minute random walk around 1.10 (forex-like prices).
pub fn walk_5m(n: usize, seed: u64) -> Vec<Candle> {
    let mut price = 1.1000;
    let mut state = seed.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
    (0..n)
        .map(|i| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let step = ((state >> 33) % 200) as f64 - 100.0;
            let open = price;
            price = (price + step * 0.00002).max(0.5);
            let close = price;
            let wick = 0.0002 + ((state >> 20) % 10) as f64 * 0.00002;
            Candle::new(
                t0() + Timeframe::M5.interval() * i as i32,
                open,
                open.max(close) + wick,
                open.min(close) - wick,
                close,
            )
        })
        .collect()
}

/// Aggregate 5-minute candles into a coarser timeframe. Buckets start at
/// `t0()`; a trailing partial bucket is dropped.
pub fn resample(candles: &[Candle], tf: Timeframe) -> Vec<Candle> {
    let per = (tf.minutes() / Timeframe::M5.minutes()) as usize;
    candles
        .chunks_exact(per)
        .map(|chunk| {
            let high = chunk.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let low = chunk.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            Candle::new(
                chunk[0].timestamp,
                chunk[0].open,
                high,
                low,
                chunk[chunk.len() - 1].close,
            )
        })
        .collect()
}

/// 5m / 15m / 1h series derived from one walk.
pub fn intraday_series(n_5m: usize, seed: u64) -> BTreeMap<Timeframe, Vec<Candle>> {
    let m5 = walk_5m(n_5m, seed);
    let mut out = BTreeMap::new();
    out.insert(Timeframe::M15, resample(&m5, Timeframe::M15));
    out.insert(Timeframe::H1, resample(&m5, Timeframe::H1));
    out.insert(Timeframe::M5, m5);
    out
}
