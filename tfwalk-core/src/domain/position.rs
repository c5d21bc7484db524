//! Position — mutable state of the single open trade of an instrument.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Direction;

/// An open position. Owned exclusively by the simulation context while open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Distance between entry and the initial stop. Fixed for the trade's life.
    pub risk_distance: f64,
    pub initial_stop: f64,
    pub size: f64,
    pub breakeven_applied: bool,
    pub trailing_applied: bool,
    /// Best and worst signed move seen so far, in points.
    pub mfe: f64,
    pub mae: f64,
    /// Name of the rule that opened the position.
    pub entry_reason: String,
    pub entry_context: BTreeMap<String, f64>,
}

impl Position {
    /// Signed move in the position's favour at `price`.
    pub fn favorable_move(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price)
    }

    /// Favourable move expressed in multiples of the risk distance.
    pub fn r_multiple(&self, price: f64) -> f64 {
        if self.risk_distance > 0.0 {
            self.favorable_move(price) / self.risk_distance
        } else {
            0.0
        }
    }

    /// Fraction of the way from entry to target at `price` (may be negative).
    pub fn progress_to_target(&self, price: f64) -> f64 {
        let span = (self.take_profit - self.entry_price).abs();
        if span > 0.0 {
            self.favorable_move(price) / span
        } else {
            0.0
        }
    }

    /// Track maximum favourable / adverse excursion from one bar's range.
    pub fn record_excursion(&self, high: f64, low: f64) -> (f64, f64) {
        let (best, worst) = match self.direction {
            Direction::Long => (high, low),
            Direction::Short => (low, high),
        };
        (
            self.mfe.max(self.favorable_move(best)),
            self.mae.min(self.favorable_move(worst)),
        )
    }

    /// True when moving the stop to `candidate` would tighten it.
    pub fn tightens(&self, candidate: f64) -> bool {
        match self.direction {
            Direction::Long => candidate > self.stop_loss,
            Direction::Short => candidate < self.stop_loss,
        }
    }
}
