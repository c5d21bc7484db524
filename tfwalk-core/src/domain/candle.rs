//! Candle — the fundamental market data unit.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Timeframe;

/// Immutable OHLC bar.
///
/// `timestamp` is the bar OPEN instant. The bar is only complete (and
/// therefore observable without lookahead) at `close_time(tf)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// Instant the bar finished forming at the given resolution.
    pub fn close_time(&self, timeframe: Timeframe) -> DateTime<Utc> {
        self.timestamp + timeframe.interval()
    }

    /// Finite prices with a consistent high/low envelope.
    pub fn is_sane(&self) -> bool {
        let finite = self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite();
        finite
            && self.high >= self.low
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandleError {
    #[error("candle has no timestamp")]
    MissingTimestamp,
    #[error("unparseable timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// One record as delivered by the historical data source.
///
/// The timestamp stays a string until [`RawCandle::parse`] so records
/// lacking one can be dropped and counted instead of failing the whole feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    #[serde(default)]
    pub timestamp: Option<String>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl RawCandle {
    pub fn parse(&self) -> Result<Candle, CandleError> {
        let raw = self
            .timestamp
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(CandleError::MissingTimestamp)?;
        let timestamp = parse_timestamp(raw)?;
        Ok(Candle::new(timestamp, self.open, self.high, self.low, self.close))
    }
}

impl From<Candle> for RawCandle {
    fn from(candle: Candle) -> Self {
        Self {
            timestamp: Some(candle.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
        }
    }
}

/// Parse an ISO-8601 instant with whole-second precision.
///
/// Accepts RFC 3339 values with an offset and naive values (read as UTC).
/// Sub-second components are rejected.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CandleError> {
    let invalid = || CandleError::InvalidTimestamp(raw.to_string());

    let parsed = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
            .ok_or_else(invalid)?,
    };

    if parsed.timestamp_subsec_nanos() != 0 {
        return Err(invalid());
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Candle {
        Candle::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap(),
            1.1000,
            1.1010,
            1.0995,
            1.1005,
        )
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample().is_sane());
    }

    #[test]
    fn candle_detects_nan_and_inverted_range() {
        let mut c = sample();
        c.close = f64::NAN;
        assert!(!c.is_sane());

        let mut c = sample();
        c.high = 1.0990;
        assert!(!c.is_sane());
    }

    #[test]
    fn close_time_adds_interval() {
        let c = sample();
        assert_eq!(
            c.close_time(Timeframe::M15),
            Utc.with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap()
        );
    }

    #[test]
    fn parse_accepts_offset_and_naive_forms() {
        let a = parse_timestamp("2024-03-04T09:00:00Z").unwrap();
        let b = parse_timestamp("2024-03-04T10:00:00+01:00").unwrap();
        let c = parse_timestamp("2024-03-04T09:00:00").unwrap();
        let d = parse_timestamp("2024-03-04 09:00:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
    }

    #[test]
    fn parse_rejects_subsecond_and_garbage() {
        assert!(parse_timestamp("2024-03-04T09:00:00.250Z").is_err());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn raw_candle_without_timestamp() {
        let raw = RawCandle {
            timestamp: None,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
        };
        assert_eq!(raw.parse(), Err(CandleError::MissingTimestamp));

        let blank = RawCandle {
            timestamp: Some("   ".into()),
            ..raw
        };
        assert_eq!(blank.parse(), Err(CandleError::MissingTimestamp));
    }
}
