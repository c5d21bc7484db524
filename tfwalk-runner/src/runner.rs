//! Run orchestration: one instrument end to end, or every configured one.
//!
//! Per instrument:
//! 1. Load candle files (merging incremental updates)
//! 2. Read overrides from the feedback store and scope a rule set to them
//! 3. Walk forward through the engine
//! 4. Compute the performance report and improvement proposal
//! 5. Write the result and proposal back to the feedback store
//!
//! Overrides live only in the scoped rule set, so nothing leaks into the
//! next instrument or the next run.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use tfwalk_core::engine::{run_instrument, EngineError, InstrumentRun};
use tfwalk_core::indicators::StandardProvider;
use tfwalk_core::signal::{ParamOverrides, RuleSet, SignalEngine, VariantError};

use crate::analytics::PerformanceReport;
use crate::config::{ConfigError, InstrumentConfig, RunConfig, RunId};
use crate::data_loader::{load_instrument, LoadError, LoadedInstrument};
use crate::export::{save_artifacts, ExportError};
use crate::feedback::{FeedbackError, FeedbackStore, ImprovementProposal, RunSummary};
use crate::tradelog::{TradeLog, TradeLogEntry};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error(transparent)]
    Variant(#[from] VariantError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("feedback error: {0}")]
    Feedback(#[from] FeedbackError),
    #[error("export error: {0}")]
    Export(#[from] ExportError),
    #[error("cannot append trade log {path}: {source}")]
    TradeLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything one instrument run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentResult {
    pub symbol: String,
    pub run_id: RunId,
    pub variant: String,
    pub overrides_applied: ParamOverrides,
    pub run: InstrumentRun,
    pub report: PerformanceReport,
    pub proposal: ImprovementProposal,
}

impl InstrumentResult {
    /// Closed trades, then the still-open position if any, numbered as
    /// log run `run`.
    pub fn trade_log_entries(&self, run: u32) -> Vec<TradeLogEntry> {
        let mut entries: Vec<TradeLogEntry> = self
            .run
            .trades
            .iter()
            .map(|trade| TradeLogEntry::closed(run, trade))
            .collect();
        if let Some(position) = &self.run.open_position {
            let next_id = self.run.trades.last().map_or(1, |t| t.id + 1);
            entries.push(TradeLogEntry::open(run, &self.symbol, next_id, position));
        }
        entries
    }
}

/// Outcome for one configured instrument. A failure here never aborts the others.
#[derive(Debug)]
pub struct InstrumentOutcome {
    pub symbol: String,
    pub result: Result<InstrumentResult, RunError>,
}

/// Load one instrument's files and run it.
pub fn run_instrument_with_feedback(
    config: &RunConfig,
    instrument: &InstrumentConfig,
    store: &dyn FeedbackStore,
) -> Result<InstrumentResult, RunError> {
    let loaded = load_instrument(instrument)?;
    run_loaded(config, instrument, loaded, store)
}

/// Run already-loaded data. No file I/O besides the feedback store and export.
pub fn run_loaded(
    config: &RunConfig,
    instrument: &InstrumentConfig,
    loaded: LoadedInstrument,
    store: &dyn FeedbackStore,
) -> Result<InstrumentResult, RunError> {
    let symbol = instrument.symbol.clone();
    let run_id = config.run_id(&symbol);

    let overrides = store.load_overrides(&symbol)?;
    let rules = RuleSet::variant(config.variant_key(instrument))?.with_overrides(&overrides);
    let decider = SignalEngine::new(rules);
    let provider = StandardProvider::default();

    let mut run = run_instrument(
        loaded.input,
        &config.engine,
        &config.risk_for(instrument),
        config.path_policy,
        &provider,
        &decider,
    )?;

    // Records dropped while merging updates never reached the engine.
    run.drops.absorb(&loaded.drops);
    for (reason, count) in loaded.drops.reasons() {
        if count > 0 {
            *run.rejections.entry(reason.to_string()).or_default() += count;
        }
    }

    let report = PerformanceReport::compute(&run);
    let proposal = ImprovementProposal::derive(&report, decider.rules(), &run_id);

    store.save_result(&RunSummary {
        symbol: symbol.clone(),
        run_id: run_id.clone(),
        variant: decider.rules().name().to_string(),
        overrides_applied: overrides.clone(),
        report: report.clone(),
        trades: run.trades.clone(),
    })?;
    store.save_improvements(&proposal)?;

    info!(
        %symbol,
        variant = decider.rules().name(),
        trades = report.trade_count,
        win_rate = report.win_rate,
        profit_factor = %report.profit_factor,
        net_pnl = report.net_pnl,
        max_drawdown = report.max_drawdown,
        weaknesses = proposal.weaknesses.len(),
        "instrument finished"
    );

    let result = InstrumentResult {
        symbol,
        run_id,
        variant: decider.rules().name().to_string(),
        overrides_applied: overrides,
        run,
        report,
        proposal,
    };

    if let Some(dir) = &config.output_dir {
        save_artifacts(&result, dir)?;
    }
    Ok(result)
}

/// Run every configured instrument, in parallel when `config.parallel`.
///
/// Outcomes come back in configuration order either way. The trade log is
/// appended afterwards, also in configuration order, so its content does not
/// depend on scheduling. All entries of one call share the log's next run
/// number.
pub fn run_all(config: &RunConfig, store: &dyn FeedbackStore) -> Vec<InstrumentOutcome> {
    let run_one = |instrument: &InstrumentConfig| InstrumentOutcome {
        symbol: instrument.symbol.clone(),
        result: run_instrument_with_feedback(config, instrument, store),
    };

    let mut outcomes: Vec<InstrumentOutcome> = if config.parallel {
        config.instruments.par_iter().map(run_one).collect()
    } else {
        config.instruments.iter().map(run_one).collect()
    };

    if let Some(path) = &config.trade_log {
        let log = TradeLog::new(path.clone());
        let run = log.next_run();
        for outcome in &mut outcomes {
            let Ok(result) = &outcome.result else {
                continue;
            };
            let appended = match &run {
                Ok(run) => log.append(&result.trade_log_entries(*run)),
                Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
            };
            if let Err(source) = appended {
                outcome.result = Err(RunError::TradeLog {
                    path: path.clone(),
                    source,
                });
            }
        }
    }

    for outcome in &outcomes {
        if let Err(err) = &outcome.result {
            warn!(symbol = %outcome.symbol, %err, "instrument run failed");
        }
    }
    outcomes
}
