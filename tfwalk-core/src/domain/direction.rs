//! Directional vocabulary shared by the signal engine and the simulator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short. Multiplying a price delta by this gives the
    /// signed move in the position's favour.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// The trend label that works against this direction.
    pub fn adverse_trend(self) -> Trend {
        match self {
            Direction::Long => Trend::Bearish,
            Direction::Short => Trend::Bullish,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("long"),
            Direction::Short => f.write_str("short"),
        }
    }
}

/// Trade decision emitted for one evaluated bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    None,
}

impl Signal {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Buy => Some(Direction::Long),
            Signal::Sell => Some(Direction::Short),
            Signal::None => None,
        }
    }

    pub fn from_direction(direction: Direction) -> Self {
        match direction {
            Direction::Long => Signal::Buy,
            Direction::Short => Signal::Sell,
        }
    }

    pub fn is_none(self) -> bool {
        matches!(self, Signal::None)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => f.write_str("BUY"),
            Signal::Sell => f.write_str("SELL"),
            Signal::None => f.write_str("NONE"),
        }
    }
}

/// Trend classification of a single timeframe snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_direction_mapping() {
        assert_eq!(Signal::Buy.direction(), Some(Direction::Long));
        assert_eq!(Signal::Sell.direction(), Some(Direction::Short));
        assert_eq!(Signal::None.direction(), None);
        assert_eq!(Signal::from_direction(Direction::Short), Signal::Sell);
    }

    #[test]
    fn adverse_trend_mirrors_direction() {
        assert_eq!(Direction::Long.adverse_trend(), Trend::Bearish);
        assert_eq!(Direction::Short.adverse_trend(), Trend::Bullish);
        assert_eq!(Direction::Long.opposite(), Direction::Short);
    }

    #[test]
    fn signal_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Signal::Buy).unwrap(), "\"BUY\"");
    }
}
