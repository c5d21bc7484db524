//! Engine configuration, per-instrument input and run result types.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::data::{
    AlignedWindow, AlignmentError, DropReport, InsufficientDataError, DEFAULT_HISTORY_WINDOW,
    DEFAULT_MIN_BARS,
};
use crate::domain::{Candle, EquityPoint, InstrumentSpec, Position, RawCandle, Timeframe, TimeframeTriple, TradeRecord};
use crate::simulator::SimulationError;

/// Walk-forward loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeframe whose bar arrivals advance the simulation clock.
    pub driver: Timeframe,
    pub triple: TimeframeTriple,
    /// Candles retained per timeframe buffer.
    pub history_window: usize,
    /// Candles a buffer must hold before snapshots are trusted.
    pub min_bars: usize,
    /// Close a still-open position at the last bar with `end_of_data`.
    /// When false the position is reported as open.
    pub close_on_end_of_data: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            driver: Timeframe::M5,
            triple: TimeframeTriple::intraday(),
            history_window: DEFAULT_HISTORY_WINDOW,
            min_bars: DEFAULT_MIN_BARS,
            close_on_end_of_data: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.driver > self.triple.fast {
            return Err(EngineError::Config(format!(
                "driver {} is coarser than the fast timeframe {}",
                self.driver, self.triple.fast
            )));
        }
        if self.history_window == 0 {
            return Err(EngineError::Config("history_window must be >= 1".into()));
        }
        if self.min_bars > self.history_window {
            return Err(EngineError::Config(format!(
                "min_bars ({}) exceeds history_window ({})",
                self.min_bars, self.history_window
            )));
        }
        Ok(())
    }

    /// Driver plus the triple, finest first.
    pub fn required_timeframes(&self) -> Vec<Timeframe> {
        let mut set: BTreeSet<Timeframe> = self.triple.as_array().into_iter().collect();
        set.insert(self.driver);
        set.into_iter().collect()
    }
}

/// Raw per-timeframe records of one instrument, as delivered by the data source.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentInput {
    pub spec: InstrumentSpec,
    pub raw: BTreeMap<Timeframe, Vec<RawCandle>>,
}

impl InstrumentInput {
    pub fn new(spec: InstrumentSpec) -> Self {
        Self {
            spec,
            raw: BTreeMap::new(),
        }
    }

    pub fn with_series(mut self, timeframe: Timeframe, records: Vec<RawCandle>) -> Self {
        self.raw.insert(timeframe, records);
        self
    }

    /// Input from already-parsed candles.
    pub fn from_candles(spec: InstrumentSpec, series: BTreeMap<Timeframe, Vec<Candle>>) -> Self {
        let raw = series
            .into_iter()
            .map(|(tf, candles)| (tf, candles.into_iter().map(RawCandle::from).collect()))
            .collect();
        Self { spec, raw }
    }

    pub fn symbol(&self) -> &str {
        &self.spec.symbol
    }
}

/// Everything one instrument's walk-forward run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRun {
    pub symbol: String,
    pub window: AlignedWindow,
    pub trades: Vec<TradeRecord>,
    pub equity: Vec<EquityPoint>,
    /// Position still open at the end, when not force-closed.
    pub open_position: Option<Position>,
    /// Per-bar non-signal reasons and dropped-record reasons, with counts.
    pub rejections: BTreeMap<String, u64>,
    pub bars_processed: u64,
    pub evaluations: u64,
    pub drops: DropReport,
    pub final_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("{symbol}: no {timeframe} series supplied")]
    MissingTimeframe { symbol: String, timeframe: Timeframe },

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error(transparent)]
    InsufficientData(#[from] InsufficientDataError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}
