//! Performance analytics — pure functions over closed trades and the equity curve.
//!
//! Every metric is a pure function: trade list and/or equity samples in,
//! scalar out. Empty inputs yield zeros, never NaN.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use tfwalk_core::domain::{EquityPoint, ExitReason, TradeRecord};
use tfwalk_core::engine::InstrumentRun;

/// Gross profit over gross loss. A run with profits and no losses has no
/// finite ratio and is reported as `Infinite` instead of dividing by zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitFactor {
    Finite(f64),
    Infinite,
}

impl ProfitFactor {
    pub fn value(self) -> f64 {
        match self {
            ProfitFactor::Finite(v) => v,
            ProfitFactor::Infinite => f64::INFINITY,
        }
    }

    /// Strictly above 1.0.
    pub fn is_profitable(self) -> bool {
        self.value() > 1.0
    }
}

impl fmt::Display for ProfitFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfitFactor::Finite(v) => write!(f, "{v:.2}"),
            ProfitFactor::Infinite => f.write_str("inf"),
        }
    }
}

/// Aggregate statistics for one instrument run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub symbol: String,
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_pnl: f64,
    pub profit_factor: ProfitFactor,
    /// Largest peak-to-trough drop of cumulative equity, in currency.
    pub max_drawdown: f64,
    /// Mean P&L per trade.
    pub expectancy: f64,
    pub average_rr: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub exit_reasons: BTreeMap<ExitReason, usize>,
    /// Why bars produced no signal (plus dropped-record counts).
    pub rejections: BTreeMap<String, u64>,
    pub bars_processed: u64,
    pub evaluations: u64,
    pub final_balance: f64,
    pub position_open_at_end: bool,
    pub equity_curve: Vec<EquityPoint>,
}

impl PerformanceReport {
    pub fn compute(run: &InstrumentRun) -> Self {
        let trades = &run.trades;
        let (gross_profit, gross_loss) = gross(trades);
        let wins = trades.iter().filter(|t| t.is_winner()).count();
        let equity: Vec<f64> = run.equity.iter().map(|p| p.cumulative_equity).collect();

        Self {
            symbol: run.symbol.clone(),
            trade_count: trades.len(),
            wins,
            losses: trades.len() - wins,
            win_rate: win_rate(trades),
            gross_profit,
            gross_loss,
            net_pnl: gross_profit - gross_loss,
            profit_factor: profit_factor(trades),
            max_drawdown: max_drawdown(&equity),
            expectancy: expectancy(trades),
            average_rr: average_rr(trades),
            max_consecutive_wins: max_consecutive_wins(trades),
            max_consecutive_losses: max_consecutive_losses(trades),
            exit_reasons: exit_reason_counts(trades),
            rejections: run.rejections.clone(),
            bars_processed: run.bars_processed,
            evaluations: run.evaluations,
            final_balance: run.final_balance,
            position_open_at_end: run.open_position.is_some(),
            equity_curve: run.equity.clone(),
        }
    }

    /// Share of closed trades that ended with `reason`.
    pub fn exit_share(&self, reason: ExitReason) -> f64 {
        if self.trade_count == 0 {
            return 0.0;
        }
        self.exit_reasons.get(&reason).copied().unwrap_or(0) as f64 / self.trade_count as f64
    }

    /// The most frequent rejection reason, ties broken alphabetically.
    pub fn dominant_rejection(&self) -> Option<(&str, u64)> {
        self.rejections
            .iter()
            .fold(None, |best: Option<(&str, u64)>, (reason, &count)| match best {
                Some((_, c)) if c >= count => best,
                _ => Some((reason.as_str(), count)),
            })
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Fraction of trades with positive P&L. 0.0 without trades.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

pub fn profit_factor(trades: &[TradeRecord]) -> ProfitFactor {
    let (gross_profit, gross_loss) = gross(trades);
    if gross_loss <= 0.0 {
        return if gross_profit > 0.0 {
            ProfitFactor::Infinite
        } else {
            ProfitFactor::Finite(0.0)
        };
    }
    ProfitFactor::Finite(gross_profit / gross_loss)
}

/// Maximum drawdown of an equity series, as a positive absolute amount.
///
/// Single forward scan: each sample is compared against the running peak
/// seen so far.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let Some(&first) = equity.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        if eq > peak {
            peak = eq;
        }
        max_dd = max_dd.max(peak - eq);
    }
    max_dd
}

/// Mean P&L per trade.
pub fn expectancy(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.pnl).sum::<f64>() / trades.len() as f64
}

/// Mean realized R multiple.
pub fn average_rr(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.rr).sum::<f64>() / trades.len() as f64
}

pub fn max_consecutive_wins(trades: &[TradeRecord]) -> usize {
    max_consecutive(trades, true)
}

pub fn max_consecutive_losses(trades: &[TradeRecord]) -> usize {
    max_consecutive(trades, false)
}

pub fn exit_reason_counts(trades: &[TradeRecord]) -> BTreeMap<ExitReason, usize> {
    let mut counts = BTreeMap::new();
    for trade in trades {
        *counts.entry(trade.exit_reason).or_insert(0) += 1;
    }
    counts
}

// ─── Helpers ────────────────────────────────────────────────────────

/// (gross profit, gross loss), both non-negative.
fn gross(trades: &[TradeRecord]) -> (f64, f64) {
    trades.iter().fold((0.0, 0.0), |(profit, loss), t| {
        if t.pnl > 0.0 {
            (profit + t.pnl, loss)
        } else {
            (profit, loss - t.pnl)
        }
    })
}

fn max_consecutive(trades: &[TradeRecord], winners: bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_winner() == winners {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}


#[cfg(test)]
mod tests {
    use super::test_support::trade;
    use super::*;
    use proptest::prelude::*;

    fn pnl_trades(pnls: &[f64]) -> Vec<TradeRecord> {
        pnls.iter()
            .enumerate()
            .map(|(i, &p)| {
                let reason = if p > 0.0 { ExitReason::TakeProfit } else { ExitReason::StopLoss };
                trade(i as u64 + 1, p, p / 100.0, reason)
            })
            .collect()
    }

    #[test]
    fn max_drawdown_uses_running_peak() {
        let equity = [0.0, 100.0, 40.0, 70.0, 130.0, 20.0];
        assert!((max_drawdown(&equity) - 110.0).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_edge_cases() {
        assert_eq!(max_drawdown(&[]), 0.0);
        assert_eq!(max_drawdown(&[5.0]), 0.0);
        assert_eq!(max_drawdown(&[0.0, 1.0, 2.0, 3.0]), 0.0);
        assert!((max_drawdown(&[0.0, -50.0, -20.0]) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn win_rate_empty_is_zero_not_nan() {
        assert_eq!(win_rate(&[]), 0.0);
        assert_eq!(expectancy(&[]), 0.0);
        assert_eq!(average_rr(&[]), 0.0);
        assert_eq!(profit_factor(&[]), ProfitFactor::Finite(0.0));
    }

    #[test]
    fn win_rate_mixed() {
        let trades = pnl_trades(&[100.0, -50.0, 200.0, -50.0]);
        assert!((win_rate(&trades) - 0.5).abs() < 1e-12);
        assert!((expectancy(&trades) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn profit_factor_without_losses_is_infinite() {
        let trades = pnl_trades(&[100.0, 50.0]);
        assert_eq!(profit_factor(&trades), ProfitFactor::Infinite);
        assert!(profit_factor(&trades).is_profitable());
        assert_eq!(ProfitFactor::Infinite.to_string(), "inf");
    }

    #[test]
    fn profit_factor_finite() {
        let trades = pnl_trades(&[300.0, -100.0, -50.0]);
        assert_eq!(profit_factor(&trades), ProfitFactor::Finite(2.0));
    }

    #[test]
    fn streaks() {
        let trades = pnl_trades(&[1.0, 1.0, -1.0, -1.0, -1.0, 1.0]);
        assert_eq!(max_consecutive_wins(&trades), 2);
        assert_eq!(max_consecutive_losses(&trades), 3);
    }

    #[test]
    fn exit_reasons_counted() {
        let trades = pnl_trades(&[1.0, -1.0, -2.0]);
        let counts = exit_reason_counts(&trades);
        assert_eq!(counts.get(&ExitReason::StopLoss), Some(&2));
        assert_eq!(counts.get(&ExitReason::TakeProfit), Some(&1));
    }

    #[test]
    fn profit_factor_serializes_tagged() {
        let json = serde_json::to_string(&ProfitFactor::Infinite).unwrap();
        assert_eq!(json, "\"infinite\"");
        let json = serde_json::to_string(&ProfitFactor::Finite(1.5)).unwrap();
        assert_eq!(json, "{\"finite\":1.5}");
    }

    proptest! {
        /// The single scan agrees with the exhaustive pairwise definition.
        #[test]
        fn drawdown_matches_pairwise(equity in prop::collection::vec(-1000.0..1000.0_f64, 0..40)) {
            let mut brute = 0.0_f64;
            for i in 0..equity.len() {
                for j in i..equity.len() {
                    brute = brute.max(equity[i] - equity[j]);
                }
            }
            prop_assert!((max_drawdown(&equity) - brute).abs() < 1e-9);
        }
    }
}
