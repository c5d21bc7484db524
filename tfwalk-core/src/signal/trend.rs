//! The shared trend classifier.
//!
//! Both the signal rules and the simulator's soft-invalidation check call
//! [`pick_trend`]; there is no second implementation.

use crate::domain::Trend;
use crate::indicators::{Field, IndicatorSnapshot};

/// Classify a snapshot's trend.
///
/// EMA20 vs EMA50 on strict inequality; when the pair is missing or equal,
/// the provider's precomputed label; otherwise neutral.
pub fn pick_trend(snapshot: &IndicatorSnapshot) -> Trend {
    if let (Some(fast), Some(slow)) = (
        snapshot.finite_value(Field::Ema20),
        snapshot.finite_value(Field::Ema50),
    ) {
        if fast > slow {
            return Trend::Bullish;
        }
        if fast < slow {
            return Trend::Bearish;
        }
    }
    snapshot.trend_label.unwrap_or(Trend::Neutral)
}
