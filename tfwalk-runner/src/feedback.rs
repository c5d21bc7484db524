//! Evolution feedback: prior-run results in, rule-parameter overrides out.
//!
//! The runner reads overrides for one symbol before a run and writes the
//! run's result and an improvement proposal after it. The engine never sees
//! a file format; stores plug in behind [`FeedbackStore`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use tfwalk_core::domain::{ExitReason, TradeRecord};
use tfwalk_core::signal::{ParamOverrides, RuleSet, NO_RULE_MATCH};

use crate::analytics::PerformanceReport;
use crate::export::symbol_dir_name;

/// Fewer closed trades than this and rate-based weaknesses are not judged.
pub const MIN_TRADES_FOR_REVIEW: usize = 5;
pub const LOW_WIN_RATE: f64 = 0.40;
pub const STOP_DOMINANCE: f64 = 0.60;
pub const TIMEOUT_DOMINANCE: f64 = 0.40;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("feedback I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed feedback document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("feedback store lock poisoned")]
    Poisoned,
}

/// Narrow contract between a run and whatever remembers previous runs.
pub trait FeedbackStore: Send + Sync {
    /// Overrides for `symbol`'s next run. Empty when nothing is recorded.
    fn load_overrides(&self, symbol: &str) -> Result<ParamOverrides, FeedbackError>;

    fn load_previous(&self, symbol: &str) -> Result<Option<RunSummary>, FeedbackError>;

    fn save_result(&self, summary: &RunSummary) -> Result<(), FeedbackError>;

    fn save_improvements(&self, proposal: &ImprovementProposal) -> Result<(), FeedbackError>;
}

/// The JSON result payload of one instrument run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub symbol: String,
    pub run_id: String,
    pub variant: String,
    pub overrides_applied: ParamOverrides,
    pub report: PerformanceReport,
    pub trades: Vec<TradeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Weakness {
    LowWinRate { win_rate: f64 },
    LosingProfitFactor { profit_factor: f64 },
    StopLossDominated { share: f64 },
    TimeoutDominated { share: f64 },
    NoTrades { dominant_rejection: Option<String>, count: u64 },
}

/// One recommended parameter change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamNudge {
    pub rule: String,
    pub param: String,
    pub from: f64,
    pub to: f64,
}

/// Weaknesses found in a run and the parameter changes they suggest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementProposal {
    pub symbol: String,
    pub run_id: String,
    pub weaknesses: Vec<Weakness>,
    pub nudges: Vec<ParamNudge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjust {
    Tighten,
    Loosen,
}

impl ImprovementProposal {
    pub fn derive(report: &PerformanceReport, rules: &RuleSet, run_id: &str) -> Self {
        let mut weaknesses = Vec::new();
        let mut adjust = None;

        if report.trade_count == 0 {
            let dominant = report.dominant_rejection();
            weaknesses.push(Weakness::NoTrades {
                dominant_rejection: dominant.map(|(r, _)| r.to_string()),
                count: dominant.map_or(0, |(_, c)| c),
            });
            if dominant.is_some_and(|(r, _)| r == NO_RULE_MATCH) {
                adjust = Some(Adjust::Loosen);
            }
        } else if report.trade_count >= MIN_TRADES_FOR_REVIEW {
            if report.win_rate < LOW_WIN_RATE {
                weaknesses.push(Weakness::LowWinRate {
                    win_rate: report.win_rate,
                });
                adjust = Some(Adjust::Tighten);
            }
            if !report.profit_factor.is_profitable() {
                weaknesses.push(Weakness::LosingProfitFactor {
                    profit_factor: report.profit_factor.value(),
                });
                adjust = Some(Adjust::Tighten);
            }
            let stop_share = report.exit_share(ExitReason::StopLoss);
            if stop_share >= STOP_DOMINANCE {
                weaknesses.push(Weakness::StopLossDominated { share: stop_share });
                adjust = Some(Adjust::Tighten);
            }
            let timeout_share = report.exit_share(ExitReason::Timeout);
            if timeout_share >= TIMEOUT_DOMINANCE {
                weaknesses.push(Weakness::TimeoutDominated {
                    share: timeout_share,
                });
            }
        }

        let nudges = adjust.map(|a| nudges(rules, a)).unwrap_or_default();
        Self {
            symbol: report.symbol.clone(),
            run_id: run_id.to_string(),
            weaknesses,
            nudges,
        }
    }

    /// The nudges as overrides for the next run.
    pub fn to_overrides(&self) -> ParamOverrides {
        let mut out = ParamOverrides::new();
        for nudge in &self.nudges {
            out.entry(nudge.rule.clone())
                .or_default()
                .insert(nudge.param.clone(), nudge.to);
        }
        out
    }
}

/// Only active constraints (positive values) on enabled rules move.
fn nudges(rules: &RuleSet, adjust: Adjust) -> Vec<ParamNudge> {
    let mut out = Vec::new();
    for rule in rules.rules().iter().filter(|r| r.params.enabled) {
        for param in ["adx_min", "composite_min", "max_body_atr", "vol_floor"] {
            let Some(from) = rule.params.get(param).filter(|v| *v > 0.0) else {
                continue;
            };
            let to = match (param, adjust) {
                ("adx_min", Adjust::Tighten) => from + 2.0,
                ("adx_min", Adjust::Loosen) => (from - 2.0).max(0.0),
                ("composite_min", Adjust::Tighten) => (from + 0.05).min(1.0),
                ("composite_min", Adjust::Loosen) => (from - 0.05).max(0.0),
                // Smaller body cap and higher volatility floor both filter harder.
                ("max_body_atr", Adjust::Tighten) | ("vol_floor", Adjust::Loosen) => from * 0.9,
                _ => from * 1.1,
            };
            if to != from {
                out.push(ParamNudge {
                    rule: rule.name.clone(),
                    param: param.to_string(),
                    from,
                    to,
                });
            }
        }
    }
    out
}

// ─── Stores ─────────────────────────────────────────────────────────

/// Directory of JSON documents per symbol:
/// `<dir>/<symbol>/{overrides,result,improvements}.json`.
///
/// `overrides.json` wins when present; otherwise the last proposal's nudges
/// are applied.
pub struct FileFeedbackStore {
    dir: PathBuf,
}

impl FileFeedbackStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.dir.join(symbol_dir_name(symbol))
    }

    fn read<T: for<'de> Deserialize<'de>>(&self, path: &Path) -> Result<Option<T>, FeedbackError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(FeedbackError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| FeedbackError::Json {
                path: path.to_path_buf(),
                source,
            })
    }

    fn write<T: Serialize>(&self, symbol: &str, name: &str, value: &T) -> Result<(), FeedbackError> {
        let dir = self.symbol_dir(symbol);
        let path = dir.join(name);
        let io_err = |source| FeedbackError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&dir).map_err(io_err)?;
        let json = serde_json::to_vec_pretty(value).map_err(|source| FeedbackError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(io_err)?;
        debug!(path = %path.display(), "feedback document written");
        Ok(())
    }
}

impl FeedbackStore for FileFeedbackStore {
    fn load_overrides(&self, symbol: &str) -> Result<ParamOverrides, FeedbackError> {
        let dir = self.symbol_dir(symbol);
        if let Some(overrides) = self.read::<ParamOverrides>(&dir.join("overrides.json"))? {
            return Ok(overrides);
        }
        Ok(self
            .read::<ImprovementProposal>(&dir.join("improvements.json"))?
            .map(|p| p.to_overrides())
            .unwrap_or_default())
    }

    fn load_previous(&self, symbol: &str) -> Result<Option<RunSummary>, FeedbackError> {
        self.read(&self.symbol_dir(symbol).join("result.json"))
    }

    fn save_result(&self, summary: &RunSummary) -> Result<(), FeedbackError> {
        self.write(&summary.symbol, "result.json", summary)
    }

    fn save_improvements(&self, proposal: &ImprovementProposal) -> Result<(), FeedbackError> {
        self.write(&proposal.symbol, "improvements.json", proposal)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    overrides: BTreeMap<String, ParamOverrides>,
    results: BTreeMap<String, RunSummary>,
    improvements: BTreeMap<String, ImprovementProposal>,
}

/// Process-local store, same precedence as the file store.
#[derive(Debug, Default)]
pub struct InMemoryFeedbackStore {
    state: Mutex<MemoryState>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_overrides(&self, symbol: &str, overrides: ParamOverrides) -> Result<(), FeedbackError> {
        let mut state = self.state.lock().map_err(|_| FeedbackError::Poisoned)?;
        state.overrides.insert(symbol.to_string(), overrides);
        Ok(())
    }

    pub fn improvements(&self, symbol: &str) -> Option<ImprovementProposal> {
        self.state.lock().ok()?.improvements.get(symbol).cloned()
    }
}

impl FeedbackStore for InMemoryFeedbackStore {
    fn load_overrides(&self, symbol: &str) -> Result<ParamOverrides, FeedbackError> {
        let state = self.state.lock().map_err(|_| FeedbackError::Poisoned)?;
        if let Some(overrides) = state.overrides.get(symbol) {
            return Ok(overrides.clone());
        }
        Ok(state
            .improvements
            .get(symbol)
            .map(ImprovementProposal::to_overrides)
            .unwrap_or_default())
    }

    fn load_previous(&self, symbol: &str) -> Result<Option<RunSummary>, FeedbackError> {
        let state = self.state.lock().map_err(|_| FeedbackError::Poisoned)?;
        Ok(state.results.get(symbol).cloned())
    }

    fn save_result(&self, summary: &RunSummary) -> Result<(), FeedbackError> {
        let mut state = self.state.lock().map_err(|_| FeedbackError::Poisoned)?;
        state.results.insert(summary.symbol.clone(), summary.clone());
        Ok(())
    }

    fn save_improvements(&self, proposal: &ImprovementProposal) -> Result<(), FeedbackError> {
        let mut state = self.state.lock().map_err(|_| FeedbackError::Poisoned)?;
        state
            .improvements
            .insert(proposal.symbol.clone(), proposal.clone());
        Ok(())
    }
}

/// Remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFeedbackStore;

impl FeedbackStore for NoopFeedbackStore {
    fn load_overrides(&self, _symbol: &str) -> Result<ParamOverrides, FeedbackError> {
        Ok(ParamOverrides::new())
    }

    fn load_previous(&self, _symbol: &str) -> Result<Option<RunSummary>, FeedbackError> {
        Ok(None)
    }

    fn save_result(&self, _summary: &RunSummary) -> Result<(), FeedbackError> {
        Ok(())
    }

    fn save_improvements(&self, _proposal: &ImprovementProposal) -> Result<(), FeedbackError> {
        Ok(())
    }
}
