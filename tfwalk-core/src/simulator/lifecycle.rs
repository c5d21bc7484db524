//! PositionSimulator: Flat → Open → Closed state machine for one instrument.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use super::{PathPolicy, RiskConfig, SimulationContext, SimulationError};
use crate::domain::{Candle, Direction, EquityPoint, ExitReason, InstrumentSpec, Position, TradeRecord, Trend};

/// A confirmed entry request.
#[derive(Debug, Clone)]
pub struct EntryOrder {
    pub direction: Direction,
    pub price: f64,
    pub time: DateTime<Utc>,
    /// Mid-timeframe ATR at decision time.
    pub atr: Option<f64>,
    pub reason: String,
    pub context: BTreeMap<String, f64>,
}

/// Inputs to per-bar position management, observed at the bar close.
#[derive(Debug, Clone, Copy)]
pub struct ManageInput {
    pub close: f64,
    pub atr: Option<f64>,
    /// Trend on the fast timeframe.
    pub fast_trend: Trend,
    /// Trend on the slower confirmation timeframe.
    pub confirm_trend: Trend,
}

/// What `manage` changed on this bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManageOutcome {
    pub breakeven: bool,
    pub trailed: bool,
    pub soft_invalidated: bool,
}

#[derive(Debug, Clone)]
pub struct PositionSimulator {
    spec: InstrumentSpec,
    risk: RiskConfig,
    policy: PathPolicy,
}

impl PositionSimulator {
    pub fn new(spec: InstrumentSpec, risk: RiskConfig, policy: PathPolicy) -> Self {
        Self { spec, risk, policy }
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn spec(&self) -> &InstrumentSpec {
        &self.spec
    }

    /// Open a position. Fails if one is already open; never stacks.
    pub fn open<'c>(
        &self,
        ctx: &'c mut SimulationContext,
        order: EntryOrder,
    ) -> Result<&'c Position, SimulationError> {
        if ctx.position.is_some() {
            return Err(SimulationError::PositionAlreadyOpen {
                symbol: ctx.symbol.clone(),
            });
        }

        let distance = self.risk.stop_distance(&self.spec, order.price, order.atr);
        if !(distance.is_finite() && distance > 0.0) {
            return Err(SimulationError::InvalidStopDistance {
                symbol: ctx.symbol.clone(),
                distance,
            });
        }
        let size = ctx.balance * self.risk.risk_per_trade / distance;
        if !(size.is_finite() && size > 0.0) {
            return Err(SimulationError::InsufficientBalance {
                symbol: ctx.symbol.clone(),
                balance: ctx.balance,
            });
        }

        let sign = order.direction.sign();
        let stop_loss = order.price - sign * distance;
        let take_profit = order.price + sign * distance * self.risk.reward_multiple;

        debug!(
            symbol = %ctx.symbol,
            direction = %order.direction,
            entry = order.price,
            stop = stop_loss,
            target = take_profit,
            size,
            reason = %order.reason,
            "position opened"
        );

        Ok(ctx.position.insert(Position {
            direction: order.direction,
            entry_price: order.price,
            entry_time: order.time,
            stop_loss,
            take_profit,
            risk_distance: distance,
            initial_stop: stop_loss,
            size,
            breakeven_applied: false,
            trailing_applied: false,
            mfe: 0.0,
            mae: 0.0,
            entry_reason: order.reason,
            entry_context: order.context,
        }))
    }

    /// Check the open position's stop and target against `bar`.
    ///
    /// Records excursion, then closes on a hit. Returns the trade if closed.
    pub fn resolve_bar(
        &self,
        ctx: &mut SimulationContext,
        bar: &Candle,
        time: DateTime<Utc>,
        closing_context: &BTreeMap<String, f64>,
    ) -> Option<TradeRecord> {
        let position = ctx.position.as_mut()?;
        let (mfe, mae) = position.record_excursion(bar.high, bar.low);
        position.mfe = mfe;
        position.mae = mae;

        let fill = self.policy.resolve(position, bar)?;
        self.close(ctx, fill.price, time, fill.reason, closing_context).ok()
    }

    /// Breakeven shift, trailing, soft invalidation. Stops only tighten.
    pub fn manage(&self, ctx: &mut SimulationContext, input: ManageInput) -> ManageOutcome {
        let mut outcome = ManageOutcome::default();
        let Some(position) = ctx.position.as_mut() else {
            return outcome;
        };
        let r = position.r_multiple(input.close);
        let entry = position.entry_price;

        if !position.breakeven_applied && r >= self.risk.breakeven_at_r {
            position.breakeven_applied = true;
            outcome.breakeven = ratchet(position, entry);
        }

        if r >= self.risk.trail_at_r {
            if let Some(atr) = input.atr.filter(|a| a.is_finite() && *a > 0.0) {
                let candidate =
                    input.close - position.direction.sign() * self.risk.trail_atr_mult * atr;
                if ratchet(position, candidate) {
                    position.trailing_applied = true;
                    outcome.trailed = true;
                }
            }
        }

        let adverse = position.direction.adverse_trend();
        if input.fast_trend == adverse
            && input.confirm_trend == adverse
            && position.progress_to_target(input.close) >= self.risk.soft_exit_progress
        {
            position.breakeven_applied = true;
            outcome.soft_invalidated = ratchet(position, entry);
        }

        if outcome != ManageOutcome::default() {
            debug!(
                symbol = %ctx.symbol,
                stop = position.stop_loss,
                breakeven = outcome.breakeven,
                trailed = outcome.trailed,
                soft_invalidated = outcome.soft_invalidated,
                "stop adjusted"
            );
        }
        outcome
    }

    /// Close with `timeout` once the position has been held for the maximum.
    pub fn check_timeout(
        &self,
        ctx: &mut SimulationContext,
        price: f64,
        time: DateTime<Utc>,
        closing_context: &BTreeMap<String, f64>,
    ) -> Option<TradeRecord> {
        let max_hold = self.risk.max_hold_minutes?;
        let held = (time - ctx.position.as_ref()?.entry_time).num_minutes();
        if held < max_hold {
            return None;
        }
        self.close(ctx, price, time, ExitReason::Timeout, closing_context)
            .ok()
    }

    /// Close the open position at `price`, appending one trade record and one
    /// equity point.
    pub fn close(
        &self,
        ctx: &mut SimulationContext,
        price: f64,
        time: DateTime<Utc>,
        reason: ExitReason,
        closing_context: &BTreeMap<String, f64>,
    ) -> Result<TradeRecord, SimulationError> {
        let position = ctx.position.take().ok_or_else(|| SimulationError::NoOpenPosition {
            symbol: ctx.symbol.clone(),
        })?;

        let points = position.favorable_move(price);
        let pnl = points * position.size;
        let rr = if position.risk_distance > 0.0 {
            points / position.risk_distance
        } else {
            0.0
        };

        let trade = TradeRecord {
            id: ctx.next_trade_id,
            symbol: ctx.symbol.clone(),
            direction: position.direction,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            entry_reason: position.entry_reason,
            exit_time: time,
            exit_price: price,
            exit_reason: reason,
            initial_stop: position.initial_stop,
            final_stop: position.stop_loss,
            take_profit: position.take_profit,
            risk_distance: position.risk_distance,
            breakeven_applied: position.breakeven_applied,
            trailing_applied: position.trailing_applied,
            size: position.size,
            points,
            pips: self.spec.to_pips(points),
            pnl,
            rr,
            hold_minutes: (time - position.entry_time).num_minutes(),
            mfe: position.mfe,
            mae: position.mae,
            indicators_on_opening: position.entry_context,
            indicators_on_closing: closing_context.clone(),
        };

        ctx.next_trade_id += 1;
        ctx.balance += pnl;
        ctx.realized_pnl += pnl;
        ctx.equity.push(EquityPoint {
            time,
            cumulative_equity: ctx.realized_pnl,
        });
        ctx.trades.push(trade.clone());

        debug!(
            symbol = %ctx.symbol,
            id = trade.id,
            reason = %reason,
            exit = price,
            pnl,
            rr,
            "position closed"
        );
        Ok(trade)
    }
}

/// Move the stop to `candidate` only if that tightens it. Returns whether it moved.
fn ratchet(position: &mut Position, candidate: f64) -> bool {
    if candidate.is_finite() && position.tightens(candidate) {
        position.stop_loss = candidate;
        true
    } else {
        false
    }
}
