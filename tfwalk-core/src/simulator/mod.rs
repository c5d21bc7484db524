//! Position simulation: risk parameters, intrabar path resolution, the
//! per-run context, and the position lifecycle.

pub mod context;
pub mod lifecycle;
pub mod path;
pub mod risk;

pub use context::SimulationContext;
pub use lifecycle::{EntryOrder, ManageInput, ManageOutcome, PositionSimulator};
pub use path::{ExitFill, PathPolicy};
pub use risk::{MinStop, RiskConfig};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("{symbol}: a position is already open")]
    PositionAlreadyOpen { symbol: String },

    #[error("{symbol}: no open position to close")]
    NoOpenPosition { symbol: String },

    #[error("{symbol}: stop distance {distance} is not positive")]
    InvalidStopDistance { symbol: String, distance: f64 },

    #[error("{symbol}: balance {balance} cannot fund a position")]
    InsufficientBalance { symbol: String, balance: f64 },
}
