//! Intrabar resolution of stop and target against one bar's range.
//!
//! A bar only reveals open, high, low and close, not the order in which the
//! extremes were reached. When both levels sit inside the range the path
//! policy decides. Gaps are handled first: a bar opening beyond the stop fills
//! at the open (worse than the stop); a bar opening beyond the target fills at
//! the target.

use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Direction, ExitReason, Position};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathPolicy {
    /// Stop before target when both are touched.
    #[default]
    WorstCase,
    /// Target before stop when both are touched.
    BestCase,
}

/// An exit triggered inside a bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitFill {
    pub reason: ExitReason,
    pub price: f64,
}

impl PathPolicy {
    /// Resolve whether `bar` closes `position`.
    pub fn resolve(self, position: &Position, bar: &Candle) -> Option<ExitFill> {
        let stop = position.stop_loss;
        let target = position.take_profit;
        let sign = position.direction.sign();

        // Gap through the stop: fill at the open.
        if sign * (bar.open - stop) <= 0.0 {
            return Some(ExitFill {
                reason: ExitReason::StopLoss,
                price: bar.open,
            });
        }
        if sign * (bar.open - target) >= 0.0 {
            return Some(ExitFill {
                reason: ExitReason::TakeProfit,
                price: target,
            });
        }

        let (stop_hit, target_hit) = match position.direction {
            Direction::Long => (bar.low <= stop, bar.high >= target),
            Direction::Short => (bar.high >= stop, bar.low <= target),
        };
        let stop_fill = ExitFill {
            reason: ExitReason::StopLoss,
            price: stop,
        };
        let target_fill = ExitFill {
            reason: ExitReason::TakeProfit,
            price: target,
        };

        match (stop_hit, target_hit, self) {
            (true, true, PathPolicy::WorstCase) => Some(stop_fill),
            (true, true, PathPolicy::BestCase) => Some(target_fill),
            (true, false, _) => Some(stop_fill),
            (false, true, _) => Some(target_fill),
            (false, false, _) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn position(direction: Direction, stop: f64, target: f64) -> Position {
        Position {
            direction,
            entry_price: 100.0,
            entry_time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            stop_loss: stop,
            take_profit: target,
            risk_distance: (100.0 - stop).abs(),
            initial_stop: stop,
            size: 1.0,
            breakeven_applied: false,
            trailing_applied: false,
            mfe: 0.0,
            mae: 0.0,
            entry_reason: "test".into(),
            entry_context: BTreeMap::new(),
        }
    }

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(Utc.with_ymd_and_hms(2024, 1, 2, 0, 5, 0).unwrap(), open, high, low, close)
    }

    #[test]
    fn both_touched_worst_case_takes_stop() {
        let pos = position(Direction::Long, 95.0, 110.0);
        let fill = PathPolicy::WorstCase.resolve(&pos, &bar(100.0, 111.0, 94.0, 105.0)).unwrap();
        assert_eq!(fill.reason, ExitReason::StopLoss);
        assert_eq!(fill.price, 95.0);
    }

    #[test]
    fn both_touched_best_case_takes_target() {
        let pos = position(Direction::Short, 105.0, 90.0);
        let fill = PathPolicy::BestCase.resolve(&pos, &bar(100.0, 106.0, 89.0, 95.0)).unwrap();
        assert_eq!(fill.reason, ExitReason::TakeProfit);
        assert_eq!(fill.price, 90.0);
    }

    #[test]
    fn gap_through_stop_fills_at_open() {
        let pos = position(Direction::Long, 95.0, 110.0);
        let fill = PathPolicy::WorstCase.resolve(&pos, &bar(92.0, 96.0, 91.0, 93.0)).unwrap();
        assert_eq!(fill.reason, ExitReason::StopLoss);
        assert_eq!(fill.price, 92.0);

        let short = position(Direction::Short, 105.0, 90.0);
        let fill = PathPolicy::WorstCase.resolve(&short, &bar(107.0, 108.0, 104.0, 106.0)).unwrap();
        assert_eq!(fill.price, 107.0);
    }

    #[test]
    fn gap_through_target_fills_at_target() {
        let pos = position(Direction::Long, 95.0, 110.0);
        let fill = PathPolicy::WorstCase.resolve(&pos, &bar(112.0, 113.0, 111.0, 112.0)).unwrap();
        assert_eq!(fill.reason, ExitReason::TakeProfit);
        assert_eq!(fill.price, 110.0);
    }

    #[test]
    fn quiet_bar_resolves_nothing() {
        let pos = position(Direction::Long, 95.0, 110.0);
        assert!(PathPolicy::WorstCase.resolve(&pos, &bar(100.0, 104.0, 97.0, 101.0)).is_none());
    }
}
