//! Risk parameters: stop placement, reward multiple, position management
//! thresholds and sizing.

use serde::{Deserialize, Serialize};

use crate::domain::{AssetClass, InstrumentSpec};

/// Minimum stop distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinStop {
    /// A fixed number of pips.
    Pips(f64),
    /// `max(price × fraction, spread × spread_mult)`.
    PriceFraction { fraction: f64, spread_mult: f64 },
}

impl MinStop {
    pub fn distance(&self, spec: &InstrumentSpec, price: f64) -> f64 {
        match *self {
            MinStop::Pips(pips) => pips * spec.pip_size,
            MinStop::PriceFraction {
                fraction,
                spread_mult,
            } => (price * fraction).max(spec.spread * spread_mult),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    // ── Entry levels ──
    /// Stop distance = max(mid ATR × this, min_stop).
    pub stop_atr_mult: f64,
    pub min_stop: MinStop,
    /// Target distance = stop distance × this.
    pub reward_multiple: f64,

    // ── Management ──
    /// Move the stop to entry once the move reaches this many R.
    pub breakeven_at_r: f64,
    /// Start trailing once the move reaches this many R.
    pub trail_at_r: f64,
    /// Trail distance in ATR multiples.
    pub trail_atr_mult: f64,
    /// Progress toward target (0..1) after which a trend flip against the
    /// position pulls the stop to entry.
    pub soft_exit_progress: f64,
    /// Force-close after this many minutes. `None` holds indefinitely.
    pub max_hold_minutes: Option<i64>,

    // ── Sizing ──
    /// Fraction of balance risked per trade.
    pub risk_per_trade: f64,
    pub initial_balance: f64,
}

impl RiskConfig {
    /// Defaults per asset class.
    ///
    /// Forex: 1.3 × ATR, floor 8 pips. Crypto: 2.3 × ATR, floor
    /// max(price × 0.0045, 3 × spread). Both use a 2.0 reward multiple.
    pub fn for_asset(asset_class: AssetClass) -> Self {
        let (stop_atr_mult, min_stop, max_hold_minutes) = match asset_class {
            AssetClass::Forex => (1.3, MinStop::Pips(8.0), 8 * 60),
            AssetClass::Crypto => (
                2.3,
                MinStop::PriceFraction {
                    fraction: 0.0045,
                    spread_mult: 3.0,
                },
                12 * 60,
            ),
        };
        Self {
            stop_atr_mult,
            min_stop,
            reward_multiple: 2.0,
            breakeven_at_r: 1.0,
            trail_at_r: 1.5,
            trail_atr_mult: 1.0,
            soft_exit_progress: 0.7,
            max_hold_minutes: Some(max_hold_minutes),
            risk_per_trade: 0.01,
            initial_balance: 10_000.0,
        }
    }

    /// Stop distance for an entry at `price`. A missing or non-positive ATR
    /// leaves only the floor.
    pub fn stop_distance(&self, spec: &InstrumentSpec, price: f64, atr: Option<f64>) -> f64 {
        let floor = self.min_stop.distance(spec, price);
        match atr.filter(|a| a.is_finite() && *a > 0.0) {
            Some(atr) => (atr * self.stop_atr_mult).max(floor),
            None => floor,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("stop_atr_mult", self.stop_atr_mult),
            ("reward_multiple", self.reward_multiple),
            ("risk_per_trade", self.risk_per_trade),
            ("initial_balance", self.initial_balance),
            ("trail_atr_mult", self.trail_atr_mult),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{name} must be positive, got {value}"));
            }
        }
        if self.trail_at_r < self.breakeven_at_r {
            return Err(format!(
                "trail_at_r ({}) must not be below breakeven_at_r ({})",
                self.trail_at_r, self.breakeven_at_r
            ));
        }
        if !(0.0..=1.0).contains(&self.soft_exit_progress) {
            return Err(format!(
                "soft_exit_progress must be within [0, 1], got {}",
                self.soft_exit_progress
            ));
        }
        if let Some(minutes) = self.max_hold_minutes {
            if minutes <= 0 {
                return Err(format!("max_hold_minutes must be positive, got {minutes}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forex_floor_is_eight_pips() {
        let risk = RiskConfig::for_asset(AssetClass::Forex);
        let spec = InstrumentSpec::forex("EURUSD");
        // 1.3 × 0.0004 = 0.00052 < 0.0008 floor
        assert!((risk.stop_distance(&spec, 1.1, Some(0.0004)) - 0.0008).abs() < 1e-12);
        assert!((risk.stop_distance(&spec, 1.1, Some(0.0010)) - 0.0013).abs() < 1e-12);
        assert!((risk.stop_distance(&spec, 1.1, None) - 0.0008).abs() < 1e-12);
    }

    #[test]
    fn crypto_floor_uses_price_or_spread() {
        let risk = RiskConfig::for_asset(AssetClass::Crypto);
        let spec = InstrumentSpec::crypto("BTCUSD").with_spread(100.0);
        // max(40_000 × 0.0045 = 180, 3 × 100 = 300)
        assert!((risk.stop_distance(&spec, 40_000.0, Some(50.0)) - 300.0).abs() < 1e-9);
        // 2.3 × 200 = 460 beats the floor
        assert!((risk.stop_distance(&spec, 40_000.0, Some(200.0)) - 460.0).abs() < 1e-9);
    }

    #[test]
    fn validation_rejects_nonsense() {
        let mut risk = RiskConfig::for_asset(AssetClass::Forex);
        assert!(risk.validate().is_ok());
        risk.reward_multiple = 0.0;
        assert!(risk.validate().is_err());
        let mut risk = RiskConfig::for_asset(AssetClass::Forex);
        risk.trail_at_r = 0.5;
        assert!(risk.validate().is_err());
    }
}
