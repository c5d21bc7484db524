//! SignalEngine: aggregates fired rules into one decision per evaluated bar.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::rules::RuleContext;
use super::variants::RuleSet;
use crate::domain::{Candle, Direction, Signal};
use crate::indicators::IndicatorSnapshot;

/// Reason code when long and short rules fire on the same bar.
pub const CONFLICTING_RULES: &str = "conflicting_rules";
/// Reason code when no rule fires.
pub const NO_RULE_MATCH: &str = "no_rule_match";

/// Synchronized snapshots of the three timeframes of a variant, plus the most
/// recent candles of each (oldest first).
#[derive(Debug, Clone, PartialEq)]
pub struct MultiTfSnapshot {
    pub fast: IndicatorSnapshot,
    pub mid: IndicatorSnapshot,
    pub slow: IndicatorSnapshot,
    pub fast_candles: Vec<Candle>,
    pub mid_candles: Vec<Candle>,
    pub slow_candles: Vec<Candle>,
}

impl MultiTfSnapshot {
    pub fn new(fast: IndicatorSnapshot, mid: IndicatorSnapshot, slow: IndicatorSnapshot) -> Self {
        Self {
            fast,
            mid,
            slow,
            fast_candles: Vec::new(),
            mid_candles: Vec::new(),
            slow_candles: Vec::new(),
        }
    }

    /// Finite fields of all three snapshots, keyed `fast.rsi`, `mid.atr`, ...
    pub fn context(&self) -> BTreeMap<String, f64> {
        let mut ctx = BTreeMap::new();
        for (role, snap) in [("fast", &self.fast), ("mid", &self.mid), ("slow", &self.slow)] {
            for (field, value) in snap.to_context() {
                ctx.insert(format!("{role}.{field}"), value);
            }
        }
        ctx
    }
}

/// Outcome of evaluating one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDecision {
    pub signal: Signal,
    /// Name of the deciding rule, or a reason code when `signal` is `None`.
    pub reason: String,
    pub context: RuleContext,
}

impl SignalDecision {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::None,
            reason: reason.into(),
            context: RuleContext::new(),
        }
    }

    pub fn fire(direction: Direction, reason: impl Into<String>, context: RuleContext) -> Self {
        Self {
            signal: Signal::from_direction(direction),
            reason: reason.into(),
            context,
        }
    }
}

/// Anything that turns snapshots into a decision. The walk-forward loop only
/// sees this trait.
pub trait Decider: Send + Sync {
    fn decide(&self, snapshots: &MultiTfSnapshot) -> SignalDecision;
}

/// Rule-based decider over one [`RuleSet`] variant.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    rules: RuleSet,
}

impl SignalEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Evaluate every rule and aggregate.
    ///
    /// Both sides fired: `None` with `conflicting_rules`. One side fired: the
    /// first fired rule of that side decides. Nothing fired: `no_rule_match`.
    pub fn evaluate(&self, snapshots: &MultiTfSnapshot) -> SignalDecision {
        let asset_class = self.rules.asset_class();
        let mut first_long: Option<(&str, RuleContext)> = None;
        let mut first_short: Option<(&str, RuleContext)> = None;
        let (mut long_fired, mut short_fired) = (0u32, 0u32);

        for rule in self.rules.rules() {
            let Some(ctx) = rule.evaluate(snapshots, asset_class) else {
                continue;
            };
            let (slot, count) = match rule.bias {
                Direction::Long => (&mut first_long, &mut long_fired),
                Direction::Short => (&mut first_short, &mut short_fired),
            };
            *count += 1;
            if slot.is_none() {
                *slot = Some((rule.name.as_str(), ctx));
            }
        }

        match (first_long, first_short) {
            (Some(_), Some(_)) => {
                let mut decision = SignalDecision::none(CONFLICTING_RULES);
                decision.context.insert("long_fired".into(), f64::from(long_fired));
                decision.context.insert("short_fired".into(), f64::from(short_fired));
                decision
            }
            (Some((name, ctx)), None) => SignalDecision::fire(Direction::Long, name, ctx),
            (None, Some((name, ctx))) => SignalDecision::fire(Direction::Short, name, ctx),
            (None, None) => SignalDecision::none(NO_RULE_MATCH),
        }
    }
}

impl Decider for SignalEngine {
    fn decide(&self, snapshots: &MultiTfSnapshot) -> SignalDecision {
        self.evaluate(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetClass, TimeframeTriple};
    use crate::signal::fixtures::{bearish_mirror, bullish_pullback, conflicting};
    use crate::signal::variants::VariantKey;

    fn engine() -> SignalEngine {
        let key = VariantKey::new(TimeframeTriple::intraday(), AssetClass::Forex);
        SignalEngine::new(RuleSet::variant(key).unwrap())
    }

    #[test]
    fn single_long_rule_buys_with_its_context() {
        let decision = engine().evaluate(&bullish_pullback());
        assert_eq!(decision.signal, Signal::Buy);
        assert_eq!(decision.reason, "trend_pullback_long");
        assert_eq!(decision.context.get("fast.rsi"), Some(&52.0));
    }

    #[test]
    fn mirrored_snapshot_sells() {
        let decision = engine().evaluate(&bearish_mirror());
        assert_eq!(decision.signal, Signal::Sell);
        assert_eq!(decision.reason, "trend_pullback_short");
    }

    #[test]
    fn long_and_short_together_is_a_non_signal() {
        let decision = engine().evaluate(&conflicting());
        assert_eq!(decision.signal, Signal::None);
        assert_eq!(decision.reason, CONFLICTING_RULES);
        assert_eq!(decision.context.get("long_fired"), Some(&1.0));
        assert_eq!(decision.context.get("short_fired"), Some(&1.0));
    }

    #[test]
    fn empty_snapshots_match_nothing() {
        let s = bullish_pullback();
        let bare = MultiTfSnapshot::new(
            IndicatorSnapshot::new(s.fast.last_timestamp, s.fast.close),
            IndicatorSnapshot::new(s.mid.last_timestamp, s.mid.close),
            IndicatorSnapshot::new(s.slow.last_timestamp, s.slow.close),
        );
        let decision = engine().evaluate(&bare);
        assert_eq!(decision.signal, Signal::None);
        assert_eq!(decision.reason, NO_RULE_MATCH);
    }

    #[test]
    fn evaluation_is_pure() {
        let e = engine();
        let snaps = conflicting();
        assert_eq!(e.evaluate(&snaps), e.evaluate(&snaps));
    }
}
