//! Rule-set variants keyed by timeframe triple and asset class.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

use super::rules::{
    candle_reversal, momentum_burst, trend_pullback, Rule, RuleParams, VolatilityFloor,
    CANDLE_REVERSAL, MOMENTUM_BURST, TREND_PULLBACK,
};
use crate::domain::{AssetClass, Timeframe, TimeframeTriple};

/// Parameter overrides: rule name (or family) → parameter → value.
pub type ParamOverrides = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantKey {
    pub triple: TimeframeTriple,
    pub asset_class: AssetClass,
}

impl VariantKey {
    pub fn new(triple: TimeframeTriple, asset_class: AssetClass) -> Self {
        Self { triple, asset_class }
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let asset = match self.asset_class {
            AssetClass::Forex => "forex",
            AssetClass::Crypto => "crypto",
        };
        write!(f, "{} {asset}", self.triple)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VariantError {
    #[error("no rule-set variant registered for {0}")]
    Unknown(VariantKey),
}

/// Cadence profile of a registered triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Profile {
    Scalp,
    Intraday,
    Swing,
}

impl Profile {
    fn of(triple: TimeframeTriple) -> Option<(Profile, &'static str)> {
        use Timeframe::*;
        match triple.as_array() {
            [M1, M5, M15] => Some((Profile::Scalp, "scalp")),
            [M5, M15, H1] => Some((Profile::Intraday, "intraday")),
            [M15, H1, H4] => Some((Profile::Swing, "swing")),
            _ => None,
        }
    }
}

/// An ordered list of rules selected for one run.
#[derive(Debug, Clone)]
pub struct RuleSet {
    name: String,
    key: VariantKey,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>, key: VariantKey, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            key,
            rules,
        }
    }

    /// Every registered variant key.
    pub fn registered() -> Vec<VariantKey> {
        let triples = [
            [Timeframe::M1, Timeframe::M5, Timeframe::M15],
            [Timeframe::M5, Timeframe::M15, Timeframe::H1],
            [Timeframe::M15, Timeframe::H1, Timeframe::H4],
        ];
        let mut keys = Vec::new();
        for [fast, mid, slow] in triples {
            let triple = TimeframeTriple { fast, mid, slow };
            keys.push(VariantKey::new(triple, AssetClass::Forex));
            keys.push(VariantKey::new(triple, AssetClass::Crypto));
        }
        keys
    }

    /// Look up the registered variant for `key`.
    pub fn variant(key: VariantKey) -> Result<RuleSet, VariantError> {
        let (profile, label) = Profile::of(key.triple).ok_or(VariantError::Unknown(key))?;
        let vol_floor = VolatilityFloor::default_threshold(key.asset_class);

        let pullback = RuleParams {
            rsi_floor: if profile == Profile::Scalp { 42.0 } else { 40.0 },
            rsi_ceiling: if profile == Profile::Swing { 68.0 } else { 65.0 },
            ..RuleParams::open(vol_floor)
        };
        let reversal = RuleParams {
            rsi_ceiling: if profile == Profile::Scalp { 30.0 } else { 35.0 },
            max_body_atr: 1.5,
            ..RuleParams::open(vol_floor)
        };
        let burst = RuleParams {
            rsi_floor: 50.0,
            rsi_ceiling: 80.0,
            adx_min: match profile {
                Profile::Scalp => 18.0,
                Profile::Intraday => 20.0,
                Profile::Swing => 25.0,
            },
            percent_b_low: 0.55,
            percent_b_high: 1.0,
            composite_min: 0.2,
            ..RuleParams::open(vol_floor)
        };

        let mut rules = Vec::with_capacity(6);
        rules.extend(Rule::pair(TREND_PULLBACK, pullback, trend_pullback));
        rules.extend(Rule::pair(CANDLE_REVERSAL, reversal, candle_reversal));
        rules.extend(Rule::pair(MOMENTUM_BURST, burst, momentum_burst));

        let asset = match key.asset_class {
            AssetClass::Forex => "forex",
            AssetClass::Crypto => "crypto",
        };
        Ok(RuleSet::new(format!("{label}_{asset}"), key, rules))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> VariantKey {
        self.key
    }

    pub fn asset_class(&self) -> AssetClass {
        self.key.asset_class
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Copy of this rule set with `overrides` applied.
    ///
    /// Keys may name a single rule (`trend_pullback_long`) or a family
    /// (`trend_pullback`). Unknown rules and invalid parameters are logged and
    /// skipped. `self` is untouched.
    pub fn with_overrides(&self, overrides: &ParamOverrides) -> RuleSet {
        let mut scoped = self.clone();
        for (rule_key, params) in overrides {
            let mut matched = false;
            for rule in scoped.rules.iter_mut().filter(|r| r.matches(rule_key)) {
                matched = true;
                for (param, value) in params {
                    if let Err(err) = rule.params.set(param, *value) {
                        warn!(rule = %rule.name, %param, %err, "ignoring rule override");
                    }
                }
            }
            if !matched {
                warn!(rule = %rule_key, variant = %scoped.name, "override names no rule in this variant");
            }
        }
        scoped
    }
}
