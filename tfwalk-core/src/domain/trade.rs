//! Completed round-trip trades and equity samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::Direction;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    ReverseSignal,
    Timeout,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::ReverseSignal => "reverse_signal",
            ExitReason::Timeout => "timeout",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable closed-trade fact. Appended to the trade log, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub id: u64,
    pub symbol: String,
    pub direction: Direction,

    // ── Entry ──
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_reason: String,

    // ── Exit ──
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Levels ──
    pub initial_stop: f64,
    pub final_stop: f64,
    pub take_profit: f64,
    pub risk_distance: f64,
    pub breakeven_applied: bool,
    pub trailing_applied: bool,

    // ── Size / PnL ──
    pub size: f64,
    pub points: f64,
    pub pips: f64,
    pub pnl: f64,
    /// Realized R multiple: points / risk distance.
    pub rr: f64,

    // ── Duration / excursion ──
    pub hold_minutes: i64,
    pub mfe: f64,
    pub mae: f64,

    // ── Indicator context ──
    pub indicators_on_opening: BTreeMap<String, f64>,
    pub indicators_on_closing: BTreeMap<String, f64>,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}

/// One sample of the realized equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub cumulative_equity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_reason_labels() {
        assert_eq!(ExitReason::StopLoss.as_str(), "stop_loss");
        assert_eq!(
            serde_json::to_string(&ExitReason::EndOfData).unwrap(),
            "\"end_of_data\""
        );
    }
}
