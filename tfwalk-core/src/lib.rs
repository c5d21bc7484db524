//! tfwalk core: multi-timeframe walk-forward strategy evaluation.
//!
//! This crate contains the simulation engine:
//! - Domain types (candles, timeframes, positions, trade records)
//! - Multi-timeframe alignment and rolling candle buffers
//! - Indicator snapshot contract plus a reference provider
//! - Rule-based signal engine with per-variant rule sets
//! - Position simulator with intrabar path policies and stop ratcheting
//! - The walk-forward loop tying them together

pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod signal;
pub mod simulator;
