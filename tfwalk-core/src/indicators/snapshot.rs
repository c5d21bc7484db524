//! IndicatorSnapshot: named-metric bag for one timeframe at one instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::Trend;

/// A named metric of an [`IndicatorSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Close,
    Rsi,
    Atr,
    Ema9,
    Ema20,
    Ema21,
    Ema50,
    MacdHist,
    BbPercentB,
    Adx,
    Composite,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::Close,
        Field::Rsi,
        Field::Atr,
        Field::Ema9,
        Field::Ema20,
        Field::Ema21,
        Field::Ema50,
        Field::MacdHist,
        Field::BbPercentB,
        Field::Adx,
        Field::Composite,
    ];

    /// Key used in rule contexts and trade logs.
    pub fn name(self) -> &'static str {
        match self {
            Field::Close => "close",
            Field::Rsi => "rsi",
            Field::Atr => "atr",
            Field::Ema9 => "ema9",
            Field::Ema20 => "ema20",
            Field::Ema21 => "ema21",
            Field::Ema50 => "ema50",
            Field::MacdHist => "macd_hist",
            Field::BbPercentB => "bb_percent_b",
            Field::Adx => "adx",
            Field::Composite => "composite",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Indicator values derived from a trailing candle window.
///
/// Every metric is optional: a provider that cannot compute a value (warmup,
/// degenerate input) leaves it `None` or `NaN`. Consumers go through
/// [`finite`](Self::finite) so both cases read as "unavailable".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// Open time of the newest candle in the window.
    pub last_timestamp: DateTime<Utc>,
    pub close: f64,

    // ── Momentum ──
    pub rsi: Option<f64>,
    pub macd_hist: Option<f64>,
    pub composite: Option<f64>,

    // ── Volatility ──
    pub atr: Option<f64>,
    pub bb_percent_b: Option<f64>,

    // ── Trend ──
    pub ema9: Option<f64>,
    pub ema20: Option<f64>,
    pub ema21: Option<f64>,
    pub ema50: Option<f64>,
    pub adx: Option<f64>,
    pub trend_label: Option<Trend>,
}

impl IndicatorSnapshot {
    /// A snapshot with only the close known.
    pub fn new(last_timestamp: DateTime<Utc>, close: f64) -> Self {
        Self {
            last_timestamp,
            close,
            rsi: None,
            macd_hist: None,
            composite: None,
            atr: None,
            bb_percent_b: None,
            ema9: None,
            ema20: None,
            ema21: None,
            ema50: None,
            adx: None,
            trend_label: None,
        }
    }

    /// Raw typed lookup.
    pub fn value(&self, field: Field) -> Option<f64> {
        match field {
            Field::Close => Some(self.close),
            Field::Rsi => self.rsi,
            Field::Atr => self.atr,
            Field::Ema9 => self.ema9,
            Field::Ema20 => self.ema20,
            Field::Ema21 => self.ema21,
            Field::Ema50 => self.ema50,
            Field::MacdHist => self.macd_hist,
            Field::BbPercentB => self.bb_percent_b,
            Field::Adx => self.adx,
            Field::Composite => self.composite,
        }
    }

    /// Typed lookup that treats `NaN` and infinities as missing.
    pub fn finite_value(&self, field: Field) -> Option<f64> {
        self.value(field).filter(|v| v.is_finite())
    }

    /// True when at least one metric besides the close is finite.
    pub fn has_indicators(&self) -> bool {
        Field::ALL
            .into_iter()
            .any(|f| f != Field::Close && self.finite_value(f).is_some())
    }

    /// Raw lookup by name. Unknown names return `None`.
    pub fn field(&self, name: &str) -> Option<f64> {
        Field::from_name(name).and_then(|f| self.value(f))
    }

    /// Lookup by name that treats `NaN` and infinities as missing.
    pub fn finite(&self, name: &str) -> Option<f64> {
        Field::from_name(name).and_then(|f| self.finite_value(f))
    }

    /// Typed builder-style setter.
    pub fn set(mut self, field: Field, value: f64) -> Self {
        let slot = match field {
            Field::Close => {
                self.close = value;
                return self;
            }
            Field::Rsi => &mut self.rsi,
            Field::Atr => &mut self.atr,
            Field::Ema9 => &mut self.ema9,
            Field::Ema20 => &mut self.ema20,
            Field::Ema21 => &mut self.ema21,
            Field::Ema50 => &mut self.ema50,
            Field::MacdHist => &mut self.macd_hist,
            Field::BbPercentB => &mut self.bb_percent_b,
            Field::Adx => &mut self.adx,
            Field::Composite => &mut self.composite,
        };
        *slot = Some(value);
        self
    }

    /// Builder-style setter by name. Unknown names are ignored.
    pub fn with(self, name: &str, value: f64) -> Self {
        match Field::from_name(name) {
            Some(field) => self.set(field, value),
            None => self,
        }
    }

    pub fn with_trend_label(mut self, trend: Trend) -> Self {
        self.trend_label = Some(trend);
        self
    }

    /// Finite fields keyed by name, for trade logs and diagnostics.
    pub fn to_context(&self) -> BTreeMap<String, f64> {
        Field::ALL
            .into_iter()
            .filter_map(|f| self.finite_value(f).map(|v| (f.name().to_string(), v)))
            .collect()
    }
}
