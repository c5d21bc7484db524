//! Run configuration: a TOML document naming the instruments, their data
//! files and the engine, risk and feedback settings.
//!
//! ```toml
//! parallel = true
//! path_policy = "worst_case"
//!
//! [engine]
//! driver = "5m"
//! triple = { fast = "5m", mid = "15m", slow = "1h" }
//!
//! [risk]
//! reward_multiple = 1.8
//!
//! [[instruments]]
//! symbol = "EURUSD"
//! asset_class = "forex"
//! data = { "5m" = "data/EURUSD_5m.csv", "15m" = "data/EURUSD_15m.csv", "1h" = "data/EURUSD_1h.csv" }
//!
//! [feedback]
//! kind = "file"
//! dir = "feedback"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use tfwalk_core::domain::{AssetClass, InstrumentSpec, Timeframe};
use tfwalk_core::engine::EngineConfig;
use tfwalk_core::signal::{RuleSet, VariantKey};
use tfwalk_core::simulator::{MinStop, PathPolicy, RiskConfig};

use crate::export::symbol_dir_name;

/// Unique identifier for an instrument run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Partial risk settings layered over each instrument's asset-class defaults.
    #[serde(default)]
    pub risk: RiskOverrides,

    #[serde(default)]
    pub path_policy: PathPolicy,

    /// Run instruments on the rayon pool instead of one after another.
    #[serde(default)]
    pub parallel: bool,

    /// Where per-instrument artifacts are written. `None` skips export.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// JSONL trade log appended after each instrument. `None` skips it.
    #[serde(default)]
    pub trade_log: Option<PathBuf>,

    #[serde(default)]
    pub feedback: FeedbackConfig,

    pub instruments: Vec<InstrumentConfig>,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;

        // Relative data paths resolve against the config file's directory.
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.instruments.is_empty() {
            return Err(ConfigError::Invalid("no [[instruments]] configured".into()));
        }

        let mut seen = std::collections::BTreeSet::new();
        // Keyed case-insensitively: some file systems fold case.
        let mut dirs: BTreeMap<String, &str> = BTreeMap::new();
        for inst in &self.instruments {
            if inst.symbol.trim().is_empty() {
                return Err(ConfigError::Invalid("instrument with empty symbol".into()));
            }
            if !seen.insert(inst.symbol.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "instrument '{}' listed twice",
                    inst.symbol
                )));
            }
            let dir = symbol_dir_name(&inst.symbol);
            if let Some(other) = dirs.insert(dir.to_ascii_lowercase(), inst.symbol.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "instruments '{other}' and '{}' share storage directory '{dir}'",
                    inst.symbol
                )));
            }
            for tf in self.engine.required_timeframes() {
                if !inst.data.contains_key(&tf) {
                    return Err(ConfigError::Invalid(format!(
                        "{}: no data file for required timeframe {tf}",
                        inst.symbol
                    )));
                }
            }
            RuleSet::variant(self.variant_key(inst))
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            self.risk_for(inst)
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("{}: {e}", inst.symbol)))?;
        }
        Ok(())
    }

    /// Asset-class defaults with the `[risk]` section applied.
    pub fn risk_for(&self, instrument: &InstrumentConfig) -> RiskConfig {
        self.risk
            .apply(RiskConfig::for_asset(instrument.asset_class))
    }

    pub fn variant_key(&self, instrument: &InstrumentConfig) -> VariantKey {
        VariantKey::new(self.engine.triple, instrument.asset_class)
    }

    /// Deterministic id for one instrument under this configuration.
    ///
    /// Hashes what shapes the result (engine, risk, path policy and the
    /// instrument entry), not where output goes or how runs are scheduled.
    pub fn run_id(&self, symbol: &str) -> RunId {
        let instrument = self.instruments.iter().find(|i| i.symbol == symbol);
        let risk = instrument.map(|i| self.risk_for(i));
        let material = (&self.engine, risk, self.path_policy, instrument);
        let json = serde_json::to_string(&material).unwrap_or_default();

        let mut hasher = blake3::Hasher::new();
        hasher.update(json.as_bytes());
        hasher.update(b"\0");
        hasher.update(symbol.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    fn rebase(&mut self, base: &Path) {
        for inst in &mut self.instruments {
            for path in inst.data.values_mut().chain(inst.updates.values_mut()) {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
        for dir in [&mut self.output_dir, &mut self.trade_log].into_iter().flatten() {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        if let FeedbackConfig::File { dir } = &mut self.feedback {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

/// One instrument and where its per-timeframe candle files live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    pub asset_class: AssetClass,
    #[serde(default)]
    pub pip_size: Option<f64>,
    #[serde(default)]
    pub spread: Option<f64>,
    /// Candle file per timeframe (`.csv`, `.json` or `.jsonl`).
    pub data: BTreeMap<Timeframe, PathBuf>,
    /// Incremental feeds merged over `data`, last write wins.
    #[serde(default)]
    pub updates: BTreeMap<Timeframe, PathBuf>,
}

impl InstrumentConfig {
    pub fn spec(&self) -> InstrumentSpec {
        let mut spec = match self.asset_class {
            AssetClass::Forex => InstrumentSpec::forex(&self.symbol),
            AssetClass::Crypto => InstrumentSpec::crypto(&self.symbol),
        };
        if let Some(pip) = self.pip_size {
            spec.pip_size = pip;
        }
        if let Some(spread) = self.spread {
            spec = spec.with_spread(spread);
        }
        spec
    }
}

/// Optional risk fields. Anything left out keeps the asset-class default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskOverrides {
    pub stop_atr_mult: Option<f64>,
    pub min_stop: Option<MinStop>,
    pub reward_multiple: Option<f64>,
    pub breakeven_at_r: Option<f64>,
    pub trail_at_r: Option<f64>,
    pub trail_atr_mult: Option<f64>,
    pub soft_exit_progress: Option<f64>,
    pub max_hold_minutes: Option<i64>,
    pub risk_per_trade: Option<f64>,
    pub initial_balance: Option<f64>,
}

impl RiskOverrides {
    pub fn apply(&self, mut base: RiskConfig) -> RiskConfig {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field { base.$field = v; })*
            };
        }
        take!(
            stop_atr_mult,
            min_stop,
            reward_multiple,
            breakeven_at_r,
            trail_at_r,
            trail_atr_mult,
            soft_exit_progress,
            risk_per_trade,
            initial_balance
        );
        if let Some(minutes) = self.max_hold_minutes {
            base.max_hold_minutes = Some(minutes);
        }
        base
    }
}

/// Which feedback store backs the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedbackConfig {
    #[default]
    None,
    Memory,
    File { dir: PathBuf },
}
