//! tfwalk runner — configuration, data loading, orchestration, analytics.
//!
//! This crate builds on `tfwalk-core` to provide:
//! - TOML run configuration with per-asset risk defaults
//! - Candle file loading (CSV / JSON / JSONL) with incremental updates
//! - Per-instrument and multi-instrument runs, sequential or rayon-parallel
//! - Performance analytics and improvement proposals
//! - Evolution-feedback stores (file, in-memory, no-op)
//! - JSONL trade log and artifact export
//! - Seeded synthetic multi-timeframe data

pub mod analytics;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod feedback;
pub mod runner;
pub mod synthetic;
pub mod tradelog;

pub use analytics::{PerformanceReport, ProfitFactor};
pub use config::{ConfigError, FeedbackConfig, InstrumentConfig, RiskOverrides, RunConfig, RunId};
pub use data_loader::{load_instrument, load_records, save_csv, LoadError, LoadedInstrument};
pub use export::{save_artifacts, ExportError};
pub use feedback::{
    FeedbackError, FeedbackStore, FileFeedbackStore, ImprovementProposal, InMemoryFeedbackStore,
    NoopFeedbackStore, ParamNudge, RunSummary, Weakness,
};
pub use runner::{
    run_all, run_instrument_with_feedback, run_loaded, InstrumentOutcome, InstrumentResult,
    RunError,
};
pub use synthetic::{generate, seed_for, SynthConfig};
pub use tradelog::{TradeLog, TradeLogEntry, TradeStatus};

/// Build the feedback store a configuration asks for.
pub fn feedback_store(config: &FeedbackConfig) -> Box<dyn FeedbackStore> {
    match config {
        FeedbackConfig::None => Box::new(NoopFeedbackStore),
        FeedbackConfig::Memory => Box::new(InMemoryFeedbackStore::new()),
        FeedbackConfig::File { dir } => Box::new(FileFeedbackStore::new(dir.clone())),
    }
}

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn results_are_send_sync() {
        assert_send::<InstrumentResult>();
        assert_sync::<InstrumentResult>();
        assert_send::<PerformanceReport>();
        assert_sync::<PerformanceReport>();
        assert_send::<RunError>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<InstrumentConfig>();
        assert_sync::<InstrumentConfig>();
    }

    #[test]
    fn stores_are_send_sync() {
        assert_send::<FileFeedbackStore>();
        assert_sync::<FileFeedbackStore>();
        assert_send::<InMemoryFeedbackStore>();
        assert_sync::<InMemoryFeedbackStore>();
        assert_send::<Box<dyn FeedbackStore>>();
        assert_sync::<Box<dyn FeedbackStore>>();
    }

    #[test]
    fn feedback_store_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = feedback_store(&FeedbackConfig::File {
            dir: dir.path().to_path_buf(),
        });
        assert!(store.load_overrides("EURUSD").unwrap().is_empty());
        assert!(feedback_store(&FeedbackConfig::None)
            .load_previous("EURUSD")
            .unwrap()
            .is_none());
    }
}
