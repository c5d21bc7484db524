//! Trade log — JSONL append-only persistence for downstream reporting.
//!
//! One JSON object per closed (or still open) trade, camelCase fields with a
//! stable schema. Each line is independent, so a partially written file
//! stays readable.
//!
//! Every `run_all` that appends to a log takes the next run number in that
//! file; deal IDs are `{symbol}-R{run:04}-{trade id:06}` and never repeat
//! across runs sharing one log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use tfwalk_core::domain::{ExitReason, Position, Signal, TradeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// One line of the trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLogEntry {
    pub deal_id: String,
    /// Run number within this log. Entries written before numbering read as 0.
    #[serde(default)]
    pub run: u32,
    pub symbol: String,
    pub signal: Signal,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: DateTime<Utc>,
    pub status: TradeStatus,
    pub close_reason: Option<ExitReason>,
    pub close_price: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
    pub indicators_on_opening: BTreeMap<String, f64>,
    pub indicators_on_closing: Option<BTreeMap<String, f64>>,
}

impl TradeLogEntry {
    /// `stop_loss` is the stop in force at exit.
    pub fn closed(run: u32, trade: &TradeRecord) -> Self {
        Self {
            deal_id: deal_id(&trade.symbol, run, trade.id),
            run,
            symbol: trade.symbol.clone(),
            signal: Signal::from_direction(trade.direction),
            entry_price: trade.entry_price,
            stop_loss: trade.final_stop,
            take_profit: trade.take_profit,
            opened_at: trade.entry_time,
            status: TradeStatus::Closed,
            close_reason: Some(trade.exit_reason),
            close_price: Some(trade.exit_price),
            closed_at: Some(trade.exit_time),
            indicators_on_opening: trade.indicators_on_opening.clone(),
            indicators_on_closing: Some(trade.indicators_on_closing.clone()),
        }
    }

    /// A position still open when the data ran out.
    pub fn open(run: u32, symbol: &str, id: u64, position: &Position) -> Self {
        Self {
            deal_id: deal_id(symbol, run, id),
            run,
            symbol: symbol.to_string(),
            signal: Signal::from_direction(position.direction),
            entry_price: position.entry_price,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            opened_at: position.entry_time,
            status: TradeStatus::Open,
            close_reason: None,
            close_price: None,
            closed_at: None,
            indicators_on_opening: position.entry_context.clone(),
            indicators_on_closing: None,
        }
    }
}

fn deal_id(symbol: &str, run: u32, id: u64) -> String {
    format!("{symbol}-R{run:04}-{id:06}")
}

/// JSONL trade log file.
pub struct TradeLog {
    path: PathBuf,
}

impl TradeLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append entries, creating the file (and its directory) if needed.
    pub fn append(&self, entries: &[TradeLogEntry]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for entry in entries {
            let json = serde_json::to_string(entry)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(file, "{json}")?;
        }
        file.flush()
    }

    /// Read every entry. Malformed lines are skipped with a warning.
    pub fn read_all(&self) -> io::Result<Vec<TradeLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TradeLogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(path = %self.path.display(), line = index + 1, error = %e, "skipping malformed trade log line");
                }
            }
        }
        Ok(entries)
    }

    /// One past the highest run number already in the file; 1 for a new log.
    pub fn next_run(&self) -> io::Result<u32> {
        let last = self.read_all()?.iter().map(|e| e.run).max().unwrap_or(0);
        Ok(last.saturating_add(1))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::trade;

    #[test]
    fn closed_entry_uses_stable_camel_case_fields() {
        let entry = TradeLogEntry::closed(3, &trade(7, 120.0, 1.2, ExitReason::TakeProfit));
        let value = serde_json::to_value(&entry).unwrap();
        for key in [
            "dealId",
            "symbol",
            "signal",
            "entryPrice",
            "stopLoss",
            "takeProfit",
            "openedAt",
            "status",
            "closeReason",
            "closePrice",
            "closedAt",
            "indicatorsOnOpening",
            "indicatorsOnClosing",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["dealId"], "EURUSD-R0003-000007");
        assert_eq!(value["run"], 3);
        assert_eq!(value["signal"], "BUY");
        assert_eq!(value["status"], "closed");
        assert_eq!(value["closeReason"], "take_profit");
    }

    #[test]
    fn append_then_read_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let log = TradeLog::new(dir.path().join("logs/trades.jsonl"));
        assert!(log.read_all().unwrap().is_empty());

        let first = TradeLogEntry::closed(1, &trade(1, 50.0, 0.5, ExitReason::Timeout));
        let second = TradeLogEntry::closed(1, &trade(2, -80.0, -1.0, ExitReason::StopLoss));
        log.append(&[first.clone()]).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .and_then(|mut f| writeln!(f, "{{not json"))
            .unwrap();
        log.append(&[second.clone()]).unwrap();

        let read = log.read_all().unwrap();
        let ids: Vec<&str> = read.iter().map(|e| e.deal_id.as_str()).collect();
        assert_eq!(ids, vec![first.deal_id.as_str(), second.deal_id.as_str()]);
        assert_eq!(read[1].close_reason, Some(ExitReason::StopLoss));
        assert_eq!(read[1].closed_at, second.closed_at);
    }

    #[test]
    fn run_numbers_continue_from_the_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = TradeLog::new(dir.path().join("trades.jsonl"));
        assert_eq!(log.next_run().unwrap(), 1);

        let trade = trade(1, 50.0, 0.5, ExitReason::Timeout);
        log.append(&[TradeLogEntry::closed(1, &trade)]).unwrap();
        assert_eq!(log.next_run().unwrap(), 2);

        let second = TradeLogEntry::closed(2, &trade);
        log.append(&[second.clone()]).unwrap();
        assert_eq!(log.next_run().unwrap(), 3);

        let read = log.read_all().unwrap();
        assert_ne!(read[0].deal_id, read[1].deal_id);
        assert_eq!(read[1], second);
    }

    #[test]
    fn entries_without_run_number_still_parse() {
        let dir = tempfile::tempdir().unwrap();
        let log = TradeLog::new(dir.path().join("trades.jsonl"));
        let mut value =
            serde_json::to_value(TradeLogEntry::closed(1, &trade(4, 10.0, 0.1, ExitReason::Timeout)))
                .unwrap();
        value.as_object_mut().unwrap().remove("run");
        fs::write(log.path(), format!("{value}\n")).unwrap();

        let read = log.read_all().unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].run, 0);
        assert_eq!(log.next_run().unwrap(), 1);
    }
}
