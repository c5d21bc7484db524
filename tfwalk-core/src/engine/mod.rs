//! Walk-forward engine: drives one instrument through aligned data.
//!
//! The loop advances on the driver timeframe. Non-driver candles only become
//! visible once they have closed, so every decision is made from data that
//! existed at the decision instant.

pub mod state;
pub mod walk;

pub use state::{EngineConfig, EngineError, InstrumentInput, InstrumentRun};
pub use walk::{
    run_instrument, REASON_INDICATOR_UNAVAILABLE, REASON_INSUFFICIENT_BALANCE, REASON_INVALID_STOP,
    REASON_WARMUP, RECENT_CANDLES,
};
