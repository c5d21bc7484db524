//! Raw record normalization and incremental feed merging.
//!
//! Records that cannot be placed on the time axis are dropped and counted,
//! never guessed. Order is preserved so the aligner still sees (and rejects)
//! out-of-order or duplicated input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::{Candle, CandleError, RawCandle, Timeframe};

/// Counts of records dropped during normalization, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropReport {
    pub missing_timestamp: u64,
    pub invalid_timestamp: u64,
    pub insane_prices: u64,
}

impl DropReport {
    pub fn total(&self) -> u64 {
        self.missing_timestamp + self.invalid_timestamp + self.insane_prices
    }

    pub fn absorb(&mut self, other: &DropReport) {
        self.missing_timestamp += other.missing_timestamp;
        self.invalid_timestamp += other.invalid_timestamp;
        self.insane_prices += other.insane_prices;
    }

    /// Reason-code view, suitable for merging into a rejection histogram.
    pub fn reasons(&self) -> [(&'static str, u64); 3] {
        [
            ("missing_timestamp", self.missing_timestamp),
            ("invalid_timestamp", self.invalid_timestamp),
            ("insane_prices", self.insane_prices),
        ]
    }
}

/// Convert source records into candles, dropping the ones that cannot be used.
pub fn normalize_raw(
    symbol: &str,
    timeframe: Timeframe,
    records: &[RawCandle],
) -> (Vec<Candle>, DropReport) {
    let mut report = DropReport::default();
    let mut candles = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        match record.parse() {
            Ok(candle) if candle.is_sane() => candles.push(candle),
            Ok(candle) => {
                report.insane_prices += 1;
                warn!(%symbol, %timeframe, index, timestamp = %candle.timestamp, "dropping candle with inconsistent prices");
            }
            Err(CandleError::MissingTimestamp) => {
                report.missing_timestamp += 1;
                warn!(%symbol, %timeframe, index, "dropping candle without timestamp");
            }
            Err(CandleError::InvalidTimestamp(raw)) => {
                report.invalid_timestamp += 1;
                warn!(%symbol, %timeframe, index, raw = %raw, "dropping candle with unparseable timestamp");
            }
        }
    }

    (candles, report)
}

/// Merge an incremental feed into an existing series.
///
/// Duplicate timestamps resolve last-write-wins (`incoming` beats `existing`,
/// later entries beat earlier ones). The result is strictly ascending.
pub fn merge_incremental(existing: &[Candle], incoming: &[Candle]) -> Vec<Candle> {
    let mut by_time: BTreeMap<_, Candle> = BTreeMap::new();
    for candle in existing.iter().chain(incoming) {
        by_time.insert(candle.timestamp, *candle);
    }
    by_time.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(ts: Option<&str>, close: f64) -> RawCandle {
        RawCandle {
            timestamp: ts.map(str::to_string),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
        }
    }

    #[test]
    fn drops_and_counts_bad_records() {
        let mut insane = raw(Some("2024-01-01T00:10:00Z"), 10.0);
        insane.high = 5.0;
        let records = vec![
            raw(Some("2024-01-01T00:00:00Z"), 10.0),
            raw(None, 11.0),
            raw(Some("not-a-time"), 12.0),
            insane,
            raw(Some("2024-01-01T00:05:00Z"), 13.0),
        ];
        let (candles, report) = normalize_raw("EURUSD", Timeframe::M5, &records);
        assert_eq!(candles.len(), 2);
        assert_eq!(report.missing_timestamp, 1);
        assert_eq!(report.invalid_timestamp, 1);
        assert_eq!(report.insane_prices, 1);
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn normalization_preserves_order() {
        let records = vec![
            raw(Some("2024-01-01T00:05:00Z"), 10.0),
            raw(Some("2024-01-01T00:00:00Z"), 11.0),
        ];
        let (candles, _) = normalize_raw("EURUSD", Timeframe::M5, &records);
        assert_eq!(candles[0].close, 10.0);
        assert_eq!(candles[1].close, 11.0);
    }

    #[test]
    fn merge_is_last_write_wins_and_sorted() {
        let (existing, _) = normalize_raw(
            "X",
            Timeframe::M5,
            &[
                raw(Some("2024-01-01T00:00:00Z"), 1.0),
                raw(Some("2024-01-01T00:05:00Z"), 2.0),
            ],
        );
        let (incoming, _) = normalize_raw(
            "X",
            Timeframe::M5,
            &[
                raw(Some("2024-01-01T00:10:00Z"), 3.0),
                raw(Some("2024-01-01T00:05:00Z"), 20.0),
            ],
        );
        let merged = merge_incremental(&existing, &incoming);
        let closes: Vec<f64> = merged.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![1.0, 20.0, 3.0]);
    }
}
