//! Named rule predicates.
//!
//! A rule is a plain function over a strongly typed multi-timeframe snapshot.
//! It fires only when every field it reads is a finite number; anything
//! missing reads as "not satisfied". Long and short rules are mirrors of one
//! predicate, parameterised by the rule's bias.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::engine::MultiTfSnapshot;
use super::trend::pick_trend;
use crate::domain::{AssetClass, Direction};
use crate::indicators::{Field, IndicatorSnapshot};

/// Fields a fired rule captured, keyed `"<tf role>.<field>"` (e.g. `mid.atr`).
pub type RuleContext = BTreeMap<String, f64>;

pub const TREND_PULLBACK: &str = "trend_pullback";
pub const CANDLE_REVERSAL: &str = "candle_reversal";
pub const MOMENTUM_BURST: &str = "momentum_burst";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleParamError {
    #[error("unknown rule parameter '{0}'")]
    UnknownParam(String),

    #[error("rule parameter '{key}' must be finite, got {value}")]
    NonFinite { key: String, value: f64 },
}

/// Tunable thresholds of one rule.
///
/// Thresholds are written from the long side. Short rules mirror them:
/// an RSI band `[floor, ceiling]` becomes `[100 - ceiling, 100 - floor]`,
/// a %B band `[low, high]` becomes `[1 - high, 1 - low]`, and `composite_min`
/// becomes an upper bound of `-composite_min`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleParams {
    pub rsi_floor: f64,
    pub rsi_ceiling: f64,
    pub adx_min: f64,
    pub percent_b_low: f64,
    pub percent_b_high: f64,
    pub composite_min: f64,
    /// Largest candle body allowed, in multiples of the mid-timeframe ATR.
    pub max_body_atr: f64,
    /// Volatility floor threshold; absolute or relative per asset class.
    pub vol_floor: f64,
    pub enabled: bool,
}

impl RuleParams {
    pub const NAMES: [&'static str; 9] = [
        "rsi_floor",
        "rsi_ceiling",
        "adx_min",
        "percent_b_low",
        "percent_b_high",
        "composite_min",
        "max_body_atr",
        "vol_floor",
        "enabled",
    ];

    /// Neutral thresholds: every band wide open, rule enabled.
    pub fn open(vol_floor: f64) -> Self {
        Self {
            rsi_floor: 0.0,
            rsi_ceiling: 100.0,
            adx_min: 0.0,
            percent_b_low: 0.0,
            percent_b_high: 1.0,
            composite_min: 0.0,
            max_body_atr: 0.0,
            vol_floor,
            enabled: true,
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        Some(match key {
            "rsi_floor" => self.rsi_floor,
            "rsi_ceiling" => self.rsi_ceiling,
            "adx_min" => self.adx_min,
            "percent_b_low" => self.percent_b_low,
            "percent_b_high" => self.percent_b_high,
            "composite_min" => self.composite_min,
            "max_body_atr" => self.max_body_atr,
            "vol_floor" => self.vol_floor,
            "enabled" => {
                if self.enabled {
                    1.0
                } else {
                    0.0
                }
            }
            _ => return None,
        })
    }

    /// Apply one override. `enabled` treats any non-zero value as true.
    pub fn set(&mut self, key: &str, value: f64) -> Result<(), RuleParamError> {
        if !value.is_finite() {
            return Err(RuleParamError::NonFinite {
                key: key.to_string(),
                value,
            });
        }
        let slot = match key {
            "rsi_floor" => &mut self.rsi_floor,
            "rsi_ceiling" => &mut self.rsi_ceiling,
            "adx_min" => &mut self.adx_min,
            "percent_b_low" => &mut self.percent_b_low,
            "percent_b_high" => &mut self.percent_b_high,
            "composite_min" => &mut self.composite_min,
            "max_body_atr" => &mut self.max_body_atr,
            "vol_floor" => &mut self.vol_floor,
            "enabled" => {
                self.enabled = value != 0.0;
                return Ok(());
            }
            other => return Err(RuleParamError::UnknownParam(other.to_string())),
        };
        *slot = value;
        Ok(())
    }

    fn rsi_in_band(&self, rsi: f64, bias: Direction) -> bool {
        match bias {
            Direction::Long => rsi >= self.rsi_floor && rsi <= self.rsi_ceiling,
            Direction::Short => rsi >= 100.0 - self.rsi_ceiling && rsi <= 100.0 - self.rsi_floor,
        }
    }

    fn percent_b_in_band(&self, percent_b: f64, bias: Direction) -> bool {
        match bias {
            Direction::Long => percent_b >= self.percent_b_low && percent_b <= self.percent_b_high,
            Direction::Short => {
                percent_b >= 1.0 - self.percent_b_high && percent_b <= 1.0 - self.percent_b_low
            }
        }
    }
}

/// Minimum mid-timeframe volatility for a rule to fire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VolatilityFloor {
    /// ATR in price units.
    Absolute(f64),
    /// ATR as a fraction of the close.
    Relative(f64),
}

impl VolatilityFloor {
    pub const FOREX_DEFAULT: f64 = 0.0003;
    pub const CRYPTO_DEFAULT: f64 = 0.0015;

    /// Forex floors are absolute, crypto floors relative to price.
    pub fn for_asset(asset_class: AssetClass, threshold: f64) -> Self {
        match asset_class {
            AssetClass::Forex => VolatilityFloor::Absolute(threshold),
            AssetClass::Crypto => VolatilityFloor::Relative(threshold),
        }
    }

    pub fn default_threshold(asset_class: AssetClass) -> f64 {
        match asset_class {
            AssetClass::Forex => Self::FOREX_DEFAULT,
            AssetClass::Crypto => Self::CRYPTO_DEFAULT,
        }
    }

    pub fn passes(self, atr: f64, close: f64) -> bool {
        match self {
            VolatilityFloor::Absolute(min) => atr >= min,
            VolatilityFloor::Relative(min) => close > 0.0 && atr / close >= min,
        }
    }
}

/// Everything a predicate may read.
pub struct RuleInput<'a> {
    pub snapshots: &'a MultiTfSnapshot,
    pub params: &'a RuleParams,
    pub floor: VolatilityFloor,
    pub bias: Direction,
}

pub type Predicate = fn(&RuleInput<'_>) -> Option<RuleContext>;

/// A named, biased predicate with its thresholds.
#[derive(Clone)]
pub struct Rule {
    pub name: String,
    pub bias: Direction,
    pub params: RuleParams,
    predicate: Predicate,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("bias", &self.bias)
            .field("params", &self.params)
            .finish()
    }
}

impl Rule {
    pub fn new(name: impl Into<String>, bias: Direction, params: RuleParams, predicate: Predicate) -> Self {
        Self {
            name: name.into(),
            bias,
            params,
            predicate,
        }
    }

    /// `<family>_long` and `<family>_short` sharing one predicate.
    pub fn pair(family: &str, params: RuleParams, predicate: Predicate) -> [Rule; 2] {
        [
            Rule::new(format!("{family}_long"), Direction::Long, params, predicate),
            Rule::new(format!("{family}_short"), Direction::Short, params, predicate),
        ]
    }

    /// True when this rule belongs to `key`, given as a full rule name or a family.
    pub fn matches(&self, key: &str) -> bool {
        self.name == key
            || self
                .name
                .strip_prefix(key)
                .is_some_and(|rest| rest == "_long" || rest == "_short")
    }

    /// Evaluate; `Some(context)` when the rule fires.
    pub fn evaluate(&self, snapshots: &MultiTfSnapshot, asset_class: AssetClass) -> Option<RuleContext> {
        if !self.params.enabled {
            return None;
        }
        let input = RuleInput {
            snapshots,
            params: &self.params,
            floor: VolatilityFloor::for_asset(asset_class, self.params.vol_floor),
            bias: self.bias,
        };
        (self.predicate)(&input)
    }
}

/// Reads finite fields and records them as it goes.
#[derive(Default)]
struct Capture(RuleContext);

impl Capture {
    fn take(&mut self, role: &str, snapshot: &IndicatorSnapshot, field: Field) -> Option<f64> {
        let value = snapshot.finite_value(field)?;
        self.0.insert(format!("{role}.{field}"), value);
        Some(value)
    }

    fn note(&mut self, key: &str, value: f64) {
        self.0.insert(key.to_string(), value);
    }
}

/// Higher-timeframe EMA alignment, price above/below the mid trend and near
/// the fast EMA21, RSI guardrail, mid-timeframe volatility floor.
pub fn trend_pullback(input: &RuleInput<'_>) -> Option<RuleContext> {
    let s = input.snapshots;
    let sign = input.bias.sign();
    let mut cap = Capture::default();

    let slow_ema20 = cap.take("slow", &s.slow, Field::Ema20)?;
    let slow_ema50 = cap.take("slow", &s.slow, Field::Ema50)?;
    let mid_ema20 = cap.take("mid", &s.mid, Field::Ema20)?;
    let mid_ema50 = cap.take("mid", &s.mid, Field::Ema50)?;
    let close = cap.take("fast", &s.fast, Field::Close)?;
    let anchor = cap.take("fast", &s.fast, Field::Ema21)?;
    let rsi = cap.take("fast", &s.fast, Field::Rsi)?;
    let atr = cap.take("mid", &s.mid, Field::Atr)?;
    let mid_close = cap.take("mid", &s.mid, Field::Close)?;

    let aligned = sign * (slow_ema20 - slow_ema50) > 0.0 && sign * (mid_ema20 - mid_ema50) > 0.0;
    let price_ok = sign * (close - mid_ema50) > 0.0 && (close - anchor).abs() <= atr;

    (aligned
        && price_ok
        && input.params.rsi_in_band(rsi, input.bias)
        && input.floor.passes(atr, mid_close))
    .then_some(cap.0)
}

/// Two-candle engulfing reversal on the fast timeframe with a body no larger
/// than `max_body_atr` × mid ATR, stretched RSI, volatility floor, and a slow
/// trend that does not oppose the trade.
pub fn candle_reversal(input: &RuleInput<'_>) -> Option<RuleContext> {
    let s = input.snapshots;
    let sign = input.bias.sign();
    let [.., prev, cur] = s.fast_candles.as_slice() else {
        return None;
    };
    if !prev.is_sane() || !cur.is_sane() {
        return None;
    }

    let mut cap = Capture::default();
    let rsi = cap.take("fast", &s.fast, Field::Rsi)?;
    let atr = cap.take("mid", &s.mid, Field::Atr)?;
    let mid_close = cap.take("mid", &s.mid, Field::Close)?;
    cap.note("fast.body", cur.body());
    cap.note("fast.prev_body", prev.body());

    let engulfing = sign * (cur.close - cur.open) > 0.0
        && sign * (prev.close - prev.open) < 0.0
        && sign * (cur.close - prev.open) >= 0.0
        && sign * (cur.open - prev.close) <= 0.0;
    let bounded = cur.body() <= input.params.max_body_atr * atr;
    let trend_ok = pick_trend(&s.slow) != input.bias.adverse_trend();

    (engulfing
        && bounded
        && trend_ok
        && input.params.rsi_in_band(rsi, input.bias)
        && input.floor.passes(atr, mid_close))
    .then_some(cap.0)
}

/// MACD histogram agreement on fast and mid, ADX floor, %B band, composite
/// score threshold, RSI band, volatility floor.
pub fn momentum_burst(input: &RuleInput<'_>) -> Option<RuleContext> {
    let s = input.snapshots;
    let p = input.params;
    let sign = input.bias.sign();
    let mut cap = Capture::default();

    let fast_hist = cap.take("fast", &s.fast, Field::MacdHist)?;
    let mid_hist = cap.take("mid", &s.mid, Field::MacdHist)?;
    let adx = cap.take("mid", &s.mid, Field::Adx)?;
    let percent_b = cap.take("fast", &s.fast, Field::BbPercentB)?;
    let composite = cap.take("fast", &s.fast, Field::Composite)?;
    let rsi = cap.take("fast", &s.fast, Field::Rsi)?;
    let atr = cap.take("mid", &s.mid, Field::Atr)?;
    let mid_close = cap.take("mid", &s.mid, Field::Close)?;

    let momentum = sign * fast_hist > 0.0 && sign * mid_hist > 0.0;
    let strength = adx >= p.adx_min && sign * composite >= p.composite_min;

    (momentum
        && strength
        && p.percent_b_in_band(percent_b, input.bias)
        && p.rsi_in_band(rsi, input.bias)
        && input.floor.passes(atr, mid_close))
    .then_some(cap.0)
}
