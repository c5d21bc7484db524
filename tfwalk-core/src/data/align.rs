//! Multi-timeframe time alignment.
//!
//! Given one candle series per timeframe for a single instrument, compute the
//! overlapping time window, clip every series to it and verify that each
//! series sits on its nominal grid. Violations are collected and reported
//! together; bad data is never silently dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::domain::{Candle, Timeframe};

/// A step larger than this many intervals starts a new session segment.
pub const SESSION_GAP_FACTOR: i32 = 10;

/// Sample offenders kept per (timeframe, violation kind).
pub const MAX_VIOLATION_SAMPLES: usize = 5;

/// The closed interval `[start, end]` shared by every timeframe of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignedWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AlignedWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Step of zero or less: duplicate or out-of-order timestamp.
    NonMonotonic,
    /// Step inside a segment that is not exactly the nominal interval.
    IrregularStep,
    /// Offset from the segment anchor not a multiple of the interval.
    Phase,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::NonMonotonic => "non_monotonic",
            ViolationKind::IrregularStep => "irregular_step",
            ViolationKind::Phase => "phase",
        }
    }
}

/// All offenders of one kind on one timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub timeframe: Timeframe,
    pub kind: ViolationKind,
    pub count: usize,
    pub samples: Vec<DateTime<Utc>>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} x{} [",
            self.timeframe,
            self.kind.as_str(),
            self.count
        )?;
        for (i, ts) in self.samples.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", ts.to_rfc3339())?;
        }
        f.write_str("]")
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fatal alignment failure for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignmentError {
    #[error("{symbol}: no timeframe series supplied")]
    EmptyInput { symbol: String },

    #[error("{symbol}: {timeframe} series is empty")]
    EmptySeries { symbol: String, timeframe: Timeframe },

    #[error("{symbol}: timeframes do not overlap (start {start} >= end {end})")]
    NoOverlap {
        symbol: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("{symbol}: {} alignment violation group(s): {}", .violations.len(), summarize(.violations))]
    Violations {
        symbol: String,
        violations: Vec<Violation>,
    },
}

/// Not enough history inside the aligned window for a required timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{symbol}: {timeframe} has {have} bar(s) in the aligned window, need at least {need}")]
pub struct InsufficientDataError {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub have: usize,
    pub need: usize,
}

/// Clipped, validated series for one instrument plus the shared window.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSeries {
    pub symbol: String,
    pub window: AlignedWindow,
    pub series: BTreeMap<Timeframe, Vec<Candle>>,
}

impl AlignedSeries {
    pub fn get(&self, timeframe: Timeframe) -> &[Candle] {
        self.series
            .get(&timeframe)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn timeframes(&self) -> impl Iterator<Item = Timeframe> + '_ {
        self.series.keys().copied()
    }

    /// Fail if any of `required` holds fewer than `min_bars` candles.
    pub fn require_min_bars(
        &self,
        required: &[Timeframe],
        min_bars: usize,
    ) -> Result<(), InsufficientDataError> {
        for &timeframe in required {
            let have = self.get(timeframe).len();
            if have < min_bars {
                return Err(InsufficientDataError {
                    symbol: self.symbol.clone(),
                    timeframe,
                    have,
                    need: min_bars,
                });
            }
        }
        Ok(())
    }
}

/// Align per-timeframe series for one instrument.
///
/// The window is `[max(first timestamp), min(last timestamp)]`. Every series
/// is clipped to it, then split into segments at gaps larger than
/// `SESSION_GAP_FACTOR` intervals; within a segment each step must equal the
/// interval and each offset from the segment anchor must be a whole number
/// of intervals.
pub fn align(
    symbol: &str,
    input: &BTreeMap<Timeframe, Vec<Candle>>,
) -> Result<AlignedSeries, AlignmentError> {
    if input.is_empty() {
        return Err(AlignmentError::EmptyInput {
            symbol: symbol.to_string(),
        });
    }

    let mut start: Option<DateTime<Utc>> = None;
    let mut end: Option<DateTime<Utc>> = None;
    for (&timeframe, candles) in input {
        let (first, last) = match (candles.first(), candles.last()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => {
                return Err(AlignmentError::EmptySeries {
                    symbol: symbol.to_string(),
                    timeframe,
                })
            }
        };
        start = Some(start.map_or(first, |s| s.max(first)));
        end = Some(end.map_or(last, |e| e.min(last)));
    }

    // Both are set: the map is non-empty and every series has a first/last bar.
    let (start, end) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(AlignmentError::EmptyInput {
                symbol: symbol.to_string(),
            })
        }
    };
    if start >= end {
        return Err(AlignmentError::NoOverlap {
            symbol: symbol.to_string(),
            start,
            end,
        });
    }
    let window = AlignedWindow { start, end };

    let mut series = BTreeMap::new();
    let mut violations: BTreeMap<(Timeframe, ViolationKind), Violation> = BTreeMap::new();

    for (&timeframe, candles) in input {
        let clipped: Vec<Candle> = candles
            .iter()
            .filter(|c| window.contains(c.timestamp))
            .copied()
            .collect();
        check_grid(timeframe, &clipped, &mut violations);
        series.insert(timeframe, clipped);
    }

    if !violations.is_empty() {
        return Err(AlignmentError::Violations {
            symbol: symbol.to_string(),
            violations: violations.into_values().collect(),
        });
    }

    debug!(
        %symbol,
        start = %window.start,
        end = %window.end,
        timeframes = series.len(),
        "aligned timeframe series"
    );

    Ok(AlignedSeries {
        symbol: symbol.to_string(),
        window,
        series,
    })
}

fn check_grid(
    timeframe: Timeframe,
    candles: &[Candle],
    violations: &mut BTreeMap<(Timeframe, ViolationKind), Violation>,
) {
    let interval = timeframe.interval();
    let interval_secs = interval.num_seconds();
    let session_gap = interval * SESSION_GAP_FACTOR;

    let mut record = |kind: ViolationKind, ts: DateTime<Utc>| {
        let entry = violations
            .entry((timeframe, kind))
            .or_insert_with(|| Violation {
                timeframe,
                kind,
                count: 0,
                samples: Vec::new(),
            });
        entry.count += 1;
        if entry.samples.len() < MAX_VIOLATION_SAMPLES {
            entry.samples.push(ts);
        }
    };

    let Some(first) = candles.first() else {
        return;
    };
    let mut anchor = first.timestamp;

    for pair in candles.windows(2) {
        let (prev, curr) = (pair[0].timestamp, pair[1].timestamp);
        let step = curr - prev;

        if step <= chrono::Duration::zero() {
            record(ViolationKind::NonMonotonic, curr);
            continue;
        }
        if step > session_gap {
            anchor = curr;
            continue;
        }
        if step != interval {
            record(ViolationKind::IrregularStep, curr);
        }
        if (curr - anchor).num_seconds() % interval_secs != 0 {
            record(ViolationKind::Phase, curr);
        }
    }
}
