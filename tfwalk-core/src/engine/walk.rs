//! Walk-forward loop for one instrument.
//!
//! Per driver bar:
//! 1. Intrabar: resolve the open position's stop/target against the bar
//! 2. Feed: push the driver bar and every non-driver candle that has closed
//! 3. Decide: on a fresh driver bar, snapshot each timeframe and ask the decider
//! 4. Act: open, reverse-close or ignore
//! 5. Manage: breakeven, trail, soft invalidation, max hold

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::data::{align, normalize_raw, CandleBuffer, DropReport};
use crate::domain::{Candle, ExitReason, Timeframe, TimeframeTriple};
use crate::indicators::{Field, IndicatorSnapshot, SnapshotCache, SnapshotProvider};
use crate::signal::{pick_trend, Decider, MultiTfSnapshot};
use crate::simulator::{
    EntryOrder, ManageInput, PathPolicy, PositionSimulator, RiskConfig, SimulationContext,
    SimulationError,
};

use super::state::{EngineConfig, EngineError, InstrumentInput, InstrumentRun};

/// Raw candles per timeframe handed to the decider alongside the snapshots.
pub const RECENT_CANDLES: usize = 5;

pub const REASON_WARMUP: &str = "warmup";
pub const REASON_INDICATOR_UNAVAILABLE: &str = "indicator_unavailable";
pub const REASON_INSUFFICIENT_BALANCE: &str = "insufficient_balance";
pub const REASON_INVALID_STOP: &str = "invalid_stop_distance";

/// Run one instrument from raw records to closed trades.
///
/// This:
/// 1. Normalizes the raw records of every required timeframe
/// 2. Aligns them and checks the minimum history
/// 3. Walks the driver series bar by bar
/// 4. Closes (or reports) whatever is still open at the end of data
///
/// Fatal errors surface before the first bar is simulated.
pub fn run_instrument(
    input: InstrumentInput,
    config: &EngineConfig,
    risk: &RiskConfig,
    policy: PathPolicy,
    provider: &dyn SnapshotProvider,
    decider: &dyn Decider,
) -> Result<InstrumentRun, EngineError> {
    config.validate()?;
    risk.validate().map_err(EngineError::Config)?;

    let symbol = input.spec.symbol.clone();
    let required = config.required_timeframes();

    // ─── Phase 1: normalize ───
    let mut drops = DropReport::default();
    let mut series = BTreeMap::new();
    for &tf in &required {
        let records = input
            .raw
            .get(&tf)
            .ok_or_else(|| EngineError::MissingTimeframe {
                symbol: symbol.clone(),
                timeframe: tf,
            })?;
        let (candles, report) = normalize_raw(&symbol, tf, records);
        drops.absorb(&report);
        series.insert(tf, candles);
    }

    let mut rejections: BTreeMap<String, u64> = BTreeMap::new();
    for (reason, count) in drops.reasons() {
        if count > 0 {
            rejections.insert(reason.to_string(), count);
        }
    }

    // ─── Phase 2: align ───
    let aligned = align(&symbol, &series)?;
    aligned.require_min_bars(&required, config.min_bars)?;
    debug!(
        %symbol,
        start = %aligned.window.start,
        end = %aligned.window.end,
        "aligned window"
    );

    let driver_bars = aligned.get(config.driver);
    let start = driver_bars
        .first()
        .map(|c| c.timestamp)
        .unwrap_or(aligned.window.start);

    let mut walk = Walk {
        triple: config.triple,
        min_bars: config.min_bars,
        buffers: required
            .iter()
            .map(|&tf| (tf, CandleBuffer::new(config.history_window)))
            .collect(),
        cursors: required.iter().map(|&tf| (tf, 0)).collect(),
        cache: SnapshotCache::new(),
        provider,
    };

    let sim = PositionSimulator::new(input.spec, risk.clone(), policy);
    let mut ctx = SimulationContext::new(symbol.clone(), risk.initial_balance, start);
    let mut last_context: BTreeMap<String, f64> = BTreeMap::new();
    let mut bars_processed = 0u64;
    let mut evaluations = 0u64;

    // ─── Phase 3: walk ───
    for bar in driver_bars {
        let now = bar.close_time(config.driver);
        bars_processed += 1;

        sim.resolve_bar(&mut ctx, bar, now, &last_context);

        let advanced = walk.feed(config.driver, bar, &aligned.series, now);
        if !advanced {
            continue;
        }

        let snapshots = match walk.snapshots() {
            Ok(snapshots) => snapshots,
            Err(reason) => {
                bump(&mut rejections, reason);
                sim.check_timeout(&mut ctx, bar.close, now, &last_context);
                continue;
            }
        };

        last_context = snapshots.context();
        evaluations += 1;
        let decision = decider.decide(&snapshots);

        match decision.signal.direction() {
            None => bump(&mut rejections, &decision.reason),
            Some(direction) => match ctx.position.as_ref().map(|p| p.direction) {
                None => {
                    let order = EntryOrder {
                        direction,
                        price: bar.close,
                        time: now,
                        atr: snapshots.mid.finite_value(Field::Atr),
                        reason: decision.reason.clone(),
                        context: last_context.clone(),
                    };
                    match sim.open(&mut ctx, order) {
                        Ok(_) => {}
                        Err(SimulationError::InsufficientBalance { balance, .. }) => {
                            warn!(%symbol, balance, time = %now, "entry skipped: balance exhausted");
                            bump(&mut rejections, REASON_INSUFFICIENT_BALANCE);
                        }
                        Err(SimulationError::InvalidStopDistance { distance, .. }) => {
                            warn!(%symbol, distance, time = %now, "entry skipped: unusable stop distance");
                            bump(&mut rejections, REASON_INVALID_STOP);
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                Some(open) if open != direction => {
                    sim.close(&mut ctx, bar.close, now, ExitReason::ReverseSignal, &last_context)?;
                }
                Some(_) => {}
            },
        }

        if ctx.position.is_some() {
            sim.manage(
                &mut ctx,
                ManageInput {
                    close: bar.close,
                    atr: snapshots.mid.finite_value(Field::Atr),
                    fast_trend: pick_trend(&snapshots.fast),
                    confirm_trend: pick_trend(&snapshots.mid),
                },
            );
        }
        sim.check_timeout(&mut ctx, bar.close, now, &last_context);
    }

    // ─── Phase 4: end of data ───
    let mut open_position = None;
    if let Some(last) = driver_bars.last() {
        if ctx.position.is_some() {
            if config.close_on_end_of_data {
                let now = last.close_time(config.driver);
                sim.close(&mut ctx, last.close, now, ExitReason::EndOfData, &last_context)?;
            } else {
                open_position = ctx.position.clone();
            }
        }
    }

    info!(
        %symbol,
        bars = bars_processed,
        evaluations,
        trades = ctx.trades.len(),
        cache_hits = walk.cache.hits(),
        cache_misses = walk.cache.misses(),
        balance = ctx.balance,
        "instrument run complete"
    );

    Ok(InstrumentRun {
        symbol,
        window: aligned.window,
        trades: ctx.trades,
        equity: ctx.equity,
        open_position,
        rejections,
        bars_processed,
        evaluations,
        drops,
        final_balance: ctx.balance,
    })
}

fn bump(rejections: &mut BTreeMap<String, u64>, reason: &str) {
    *rejections.entry(reason.to_string()).or_insert(0) += 1;
}

/// Buffers, cursors and snapshot cache owned by one run.
struct Walk<'p> {
    triple: TimeframeTriple,
    min_bars: usize,
    buffers: BTreeMap<Timeframe, CandleBuffer>,
    cursors: BTreeMap<Timeframe, usize>,
    cache: SnapshotCache,
    provider: &'p dyn SnapshotProvider,
}

impl Walk<'_> {
    /// Push the driver bar plus every non-driver candle closed by `now`.
    /// Returns the driver buffer's push result.
    fn feed(
        &mut self,
        driver: Timeframe,
        bar: &Candle,
        series: &BTreeMap<Timeframe, Vec<Candle>>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut advanced = false;
        for (&tf, buffer) in self.buffers.iter_mut() {
            if tf == driver {
                advanced = buffer.push(*bar);
                continue;
            }
            let Some(candles) = series.get(&tf) else {
                continue;
            };
            let Some(cursor) = self.cursors.get_mut(&tf) else {
                continue;
            };
            while let Some(candle) = candles.get(*cursor) {
                if candle.close_time(tf) > now {
                    break;
                }
                buffer.push(*candle);
                *cursor += 1;
            }
        }
        advanced
    }

    fn snapshots(&mut self) -> Result<MultiTfSnapshot, &'static str> {
        let roles = self.triple.as_array();
        for tf in roles {
            let ready = self
                .buffers
                .get(&tf)
                .is_some_and(|b| !b.is_empty() && b.is_ready(self.min_bars));
            if !ready {
                return Err(REASON_WARMUP);
            }
        }

        let mut snaps: Vec<IndicatorSnapshot> = Vec::with_capacity(3);
        let mut recent: Vec<Vec<Candle>> = Vec::with_capacity(3);
        for tf in roles {
            let Some(buffer) = self.buffers.get(&tf) else {
                return Err(REASON_WARMUP);
            };
            match self.cache.get_or_compute(tf, buffer, self.provider) {
                Some(snap) if snap.close.is_finite() && snap.has_indicators() => snaps.push(snap),
                _ => {
                    debug!(timeframe = %tf, "indicator snapshot unavailable");
                    return Err(REASON_INDICATOR_UNAVAILABLE);
                }
            }
            let skip = buffer.len().saturating_sub(RECENT_CANDLES);
            recent.push(buffer.iter().skip(skip).copied().collect());
        }

        let mut recent = recent.into_iter();
        let mut snaps = snaps.into_iter();
        let (Some(fast), Some(mid), Some(slow)) = (snaps.next(), snaps.next(), snaps.next()) else {
            return Err(REASON_INDICATOR_UNAVAILABLE);
        };
        // Mid ATR sizes every stop.
        if mid.finite_value(Field::Atr).is_none() {
            debug!(timeframe = %self.triple.mid, "mid ATR unavailable");
            return Err(REASON_INDICATOR_UNAVAILABLE);
        }
        let mut out = MultiTfSnapshot::new(fast, mid, slow);
        out.fast_candles = recent.next().unwrap_or_default();
        out.mid_candles = recent.next().unwrap_or_default();
        out.slow_candles = recent.next().unwrap_or_default();
        Ok(out)
    }
}
