//! Per-instrument, per-run simulation state.

use chrono::{DateTime, Utc};

use crate::domain::{EquityPoint, Position, TradeRecord};

/// Everything the walk-forward loop mutates for one instrument.
///
/// Passed by `&mut` through the loop; never shared between instruments.
#[derive(Debug, Clone)]
pub struct SimulationContext {
    pub symbol: String,
    pub balance: f64,
    /// Running sum of realized trade P&L. Unrealized P&L never enters it.
    pub realized_pnl: f64,
    pub position: Option<Position>,
    pub trades: Vec<TradeRecord>,
    pub equity: Vec<EquityPoint>,
    pub next_trade_id: u64,
}

impl SimulationContext {
    /// Fresh context with the equity curve seeded at zero.
    pub fn new(symbol: impl Into<String>, initial_balance: f64, start: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            balance: initial_balance,
            realized_pnl: 0.0,
            position: None,
            trades: Vec::new(),
            equity: vec![EquityPoint {
                time: start,
                cumulative_equity: 0.0,
            }],
            next_trade_id: 1,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// Number of open positions: 0 or 1.
    pub fn open_positions(&self) -> usize {
        usize::from(self.position.is_some())
    }
}
