//! Instrument metadata: asset class, pip size, spread.

use serde::{Deserialize, Serialize};

/// Asset class selects the volatility-floor and stop constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Forex,
    Crypto,
}

/// Static description of a tradable instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub asset_class: AssetClass,
    /// Price increment one "pip" represents. Used to express points as pips.
    pub pip_size: f64,
    /// Typical bid/ask spread in price units.
    #[serde(default)]
    pub spread: f64,
}

impl InstrumentSpec {
    /// Forex pair. Yen-quoted pairs use a 0.01 pip, all others 0.0001.
    pub fn forex(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let pip_size = if symbol.to_ascii_uppercase().ends_with("JPY") {
            0.01
        } else {
            0.0001
        };
        Self {
            symbol,
            asset_class: AssetClass::Forex,
            pip_size,
            spread: 0.0,
        }
    }

    /// Crypto pair. Pips are whole price units.
    pub fn crypto(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class: AssetClass::Crypto,
            pip_size: 1.0,
            spread: 0.0,
        }
    }

    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = spread;
        self
    }

    pub fn to_pips(&self, points: f64) -> f64 {
        if self.pip_size > 0.0 {
            points / self.pip_size
        } else {
            points
        }
    }
}
