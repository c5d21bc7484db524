//! Timeframe — the fixed sampling resolutions a series can be recorded at.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sampling resolution of a candle series.
///
/// Variants are declared in ascending order so the derived `Ord` sorts
/// from the finest to the coarsest resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
    ];

    /// Nominal bar length in minutes.
    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
        }
    }

    /// Nominal bar length.
    pub fn interval(self) -> Duration {
        Duration::minutes(self.minutes())
    }

    pub fn label(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeframeError {
    #[error("unknown timeframe '{0}' (expected one of 1m, 5m, 15m, 30m, 1h, 4h)")]
    Unknown(String),
    #[error("timeframe triple must be strictly ascending, got {fast}/{mid}/{slow}")]
    NotAscending {
        fast: Timeframe,
        mid: Timeframe,
        slow: Timeframe,
    },
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TimeframeError::Unknown(s.to_string()))
    }
}

/// The three resolutions a rule-set reads: entry (`fast`), confirmation and
/// volatility (`mid`), trend context (`slow`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTriple")]
pub struct TimeframeTriple {
    pub fast: Timeframe,
    pub mid: Timeframe,
    pub slow: Timeframe,
}

#[derive(Deserialize)]
struct RawTriple {
    fast: Timeframe,
    mid: Timeframe,
    slow: Timeframe,
}

impl TryFrom<RawTriple> for TimeframeTriple {
    type Error = TimeframeError;

    fn try_from(raw: RawTriple) -> Result<Self, Self::Error> {
        TimeframeTriple::new(raw.fast, raw.mid, raw.slow)
    }
}

impl TimeframeTriple {
    pub fn new(fast: Timeframe, mid: Timeframe, slow: Timeframe) -> Result<Self, TimeframeError> {
        if fast < mid && mid < slow {
            Ok(Self { fast, mid, slow })
        } else {
            Err(TimeframeError::NotAscending { fast, mid, slow })
        }
    }

    /// 5m entries, 15m confirmation, 1h trend.
    pub fn intraday() -> Self {
        Self {
            fast: Timeframe::M5,
            mid: Timeframe::M15,
            slow: Timeframe::H1,
        }
    }

    pub fn as_array(&self) -> [Timeframe; 3] {
        [self.fast, self.mid, self.slow]
    }

    pub fn contains(&self, tf: Timeframe) -> bool {
        self.as_array().contains(&tf)
    }
}

impl Default for TimeframeTriple {
    fn default() -> Self {
        Self::intraday()
    }
}

impl fmt::Display for TimeframeTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.fast, self.mid, self.slow)
    }
}
