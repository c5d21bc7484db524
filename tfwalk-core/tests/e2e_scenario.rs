//! End-to-end scenario: three scripted 5-minute bars, one forced entry.
//!
//! A fixed ATR of 0.0010, a 1.0 ATR stop multiple and a 1.5 reward multiple
//! put the stop at entry - 0.0010 and the target at entry + 0.0015. The bar
//! after entry reaches the target; the trade must close there with rr 1.5.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use tfwalk_core::domain::{AssetClass, Candle, Direction, ExitReason, InstrumentSpec, Timeframe};
use tfwalk_core::engine::{run_instrument, EngineConfig, InstrumentInput, InstrumentRun};
use tfwalk_core::indicators::{IndicatorSnapshot, SnapshotProvider};
use tfwalk_core::signal::{Decider, MultiTfSnapshot, SignalDecision};
use tfwalk_core::simulator::{MinStop, PathPolicy, RiskConfig};

const ATR: f64 = 0.0010;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
}

/// Snapshot with the window's close and a constant ATR.
struct FixedAtr;

impl SnapshotProvider for FixedAtr {
    fn compute(&self, window: &[Candle]) -> Option<IndicatorSnapshot> {
        let last = window.last()?;
        Some(IndicatorSnapshot::new(last.timestamp, last.close).with("atr", ATR))
    }
}

/// Buys once, when the fast window's newest bar is the given one.
struct BuyAt(DateTime<Utc>);

impl Decider for BuyAt {
    fn decide(&self, snapshots: &MultiTfSnapshot) -> SignalDecision {
        if snapshots.fast.last_timestamp == self.0 {
            SignalDecision::fire(Direction::Long, "scripted_buy", BTreeMap::new())
        } else {
            SignalDecision::none("no_rule_match")
        }
    }
}

fn flat(ts: DateTime<Utc>) -> Candle {
    Candle::new(ts, 1.1000, 1.1002, 1.0998, 1.1000)
}

/// One hour of flat 5m warmup from 09:00, then the scenario bars from 10:00.
fn input(scenario: &[(f64, f64, f64, f64)]) -> InstrumentInput {
    let mut m5: Vec<Candle> = (0..12).map(|i| flat(at(9, 0) + Duration::minutes(5 * i))).collect();
    for (i, &(o, h, l, c)) in scenario.iter().enumerate() {
        m5.push(Candle::new(at(10, 0) + Duration::minutes(5 * i as i64), o, h, l, c));
    }
    let m15: Vec<Candle> = (0..6).map(|i| flat(at(9, 0) + Duration::minutes(15 * i))).collect();
    let h1: Vec<Candle> = (0..3).map(|i| flat(at(9, 0) + Duration::hours(i))).collect();

    let mut series = BTreeMap::new();
    series.insert(Timeframe::M5, m5);
    series.insert(Timeframe::M15, m15);
    series.insert(Timeframe::H1, h1);
    InstrumentInput::from_candles(InstrumentSpec::forex("EURUSD"), series)
}

fn risk() -> RiskConfig {
    RiskConfig {
        stop_atr_mult: 1.0,
        min_stop: MinStop::Pips(0.0),
        reward_multiple: 1.5,
        ..RiskConfig::for_asset(AssetClass::Forex)
    }
}

fn run(scenario: &[(f64, f64, f64, f64)], policy: PathPolicy) -> InstrumentRun {
    let config = EngineConfig {
        min_bars: 1,
        ..EngineConfig::default()
    };
    run_instrument(
        input(scenario),
        &config,
        &risk(),
        policy,
        &FixedAtr,
        &BuyAt(at(10, 0)),
    )
    .unwrap()
}

const SCENARIO: [(f64, f64, f64, f64); 3] = [
    (1.1000, 1.1010, 1.0995, 1.1005),
    (1.1005, 1.1020, 1.1000, 1.1015),
    (1.1015, 1.1030, 1.1010, 1.1025),
];

#[test]
fn forced_buy_closes_at_target_on_next_bar() {
    let result = run(&SCENARIO, PathPolicy::WorstCase);

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.direction, Direction::Long);
    assert_eq!(trade.entry_reason, "scripted_buy");

    // Entry at the close of bar 1, observed when it closes.
    assert!((trade.entry_price - 1.1005).abs() < 1e-12);
    assert_eq!(trade.entry_time, at(10, 5));

    assert!((trade.risk_distance - ATR).abs() < 1e-12);
    assert!((trade.initial_stop - 1.0995).abs() < 1e-12);
    assert!((trade.take_profit - 1.1020).abs() < 1e-12);

    // Bar 2 (10:05..10:10) touches the target, not the stop.
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert_eq!(trade.exit_time, at(10, 10));
    assert!((trade.exit_price - 1.1020).abs() < 1e-12);
    assert!((trade.rr - 1.5).abs() < 1e-9);
    assert!((trade.pips - 15.0).abs() < 1e-6);
    assert_eq!(trade.hold_minutes, 5);

    assert!(result.open_position.is_none());
    assert_eq!(result.equity.len(), 2);
    assert!((result.equity[1].cumulative_equity - trade.pnl).abs() < 1e-9);
}

#[test]
fn bar_touching_both_levels_closes_at_stop() {
    let scenario = [
        (1.1000, 1.1010, 1.0995, 1.1005),
        (1.1005, 1.1025, 1.0990, 1.1010),
        (1.1010, 1.1030, 1.1010, 1.1025),
    ];

    let worst = run(&scenario, PathPolicy::WorstCase);
    assert_eq!(worst.trades.len(), 1);
    assert_eq!(worst.trades[0].exit_reason, ExitReason::StopLoss);
    assert!((worst.trades[0].rr + 1.0).abs() < 1e-9);

    let best = run(&scenario, PathPolicy::BestCase);
    assert_eq!(best.trades[0].exit_reason, ExitReason::TakeProfit);
}

#[test]
fn untouched_levels_close_at_end_of_data() {
    let scenario = [
        (1.1000, 1.1010, 1.0995, 1.1005),
        (1.1005, 1.1012, 1.1000, 1.1008),
        (1.1008, 1.1011, 1.1001, 1.1009),
    ];
    let result = run(&scenario, PathPolicy::WorstCase);
    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::EndOfData);
    assert_eq!(trade.exit_time, at(10, 15));
    assert!((trade.exit_price - 1.1009).abs() < 1e-12);
}

#[test]
fn warmup_and_non_signals_are_counted() {
    let result = run(&SCENARIO, PathPolicy::WorstCase);
    // 09:00..09:50 close before the 09:00 hourly bar does.
    assert_eq!(result.rejections.get("warmup"), Some(&11));
    // 09:55, 10:05 and 10:10 evaluate to nothing; 10:00 buys.
    assert_eq!(result.evaluations, 4);
    assert_eq!(result.rejections.get("no_rule_match"), Some(&3));
    assert_eq!(result.bars_processed, 15);
}
