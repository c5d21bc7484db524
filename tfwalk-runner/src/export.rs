//! Per-instrument artifact export.
//!
//! `save_artifacts` writes one directory per symbol:
//! - `trades.jsonl`: one closed trade per line
//! - `equity.csv`: `time,cumulative_equity`
//! - `report.json`: the performance report and improvement proposal

use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use tfwalk_core::domain::{EquityPoint, TradeRecord};

use crate::analytics::PerformanceReport;
use crate::feedback::ImprovementProposal;
use crate::runner::InstrumentResult;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot write CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// File-system safe directory name for a symbol (`EUR/USD` -> `EUR_USD`).
///
/// Never `.` or `..`: a name made only of dots becomes underscores. The
/// mapping is not one-to-one; config validation rejects instruments whose
/// names collide.
pub fn symbol_dir_name(symbol: &str) -> String {
    if symbol.chars().all(|c| c == '.') {
        return "_".repeat(symbol.len().max(1));
    }
    symbol
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    symbol: &'a str,
    run_id: &'a str,
    variant: &'a str,
    report: &'a PerformanceReport,
    proposal: &'a ImprovementProposal,
}

/// Write the artifacts of one instrument under `output_dir/<symbol>/`.
pub fn save_artifacts(result: &InstrumentResult, output_dir: &Path) -> Result<PathBuf, ExportError> {
    let run_dir = output_dir.join(symbol_dir_name(&result.symbol));
    fs::create_dir_all(&run_dir).map_err(|source| ExportError::Io {
        path: run_dir.clone(),
        source,
    })?;

    write_trades_jsonl(&run_dir.join("trades.jsonl"), &result.run.trades)?;
    write_equity_csv(&run_dir.join("equity.csv"), &result.run.equity)?;

    let report_path = run_dir.join("report.json");
    let doc = ReportDocument {
        symbol: &result.symbol,
        run_id: &result.run_id,
        variant: &result.variant,
        report: &result.report,
        proposal: &result.proposal,
    };
    let json = serde_json::to_string_pretty(&doc).map_err(|source| ExportError::Json {
        path: report_path.clone(),
        source,
    })?;
    fs::write(&report_path, json).map_err(|source| ExportError::Io {
        path: report_path.clone(),
        source,
    })?;

    debug!(symbol = %result.symbol, dir = %run_dir.display(), "artifacts written");
    Ok(run_dir)
}

pub fn write_trades_jsonl(path: &Path, trades: &[TradeRecord]) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut out = BufWriter::new(fs::File::create(path).map_err(io_err)?);
    for trade in trades {
        let line = serde_json::to_string(trade).map_err(|source| ExportError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writeln!(out, "{line}").map_err(io_err)?;
    }
    out.flush().map_err(io_err)
}

pub fn write_equity_csv(path: &Path, equity: &[EquityPoint]) -> Result<(), ExportError> {
    let csv_err = |source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(["time", "cumulative_equity"]).map_err(csv_err)?;
    for point in equity {
        wtr.write_record([point.time.to_rfc3339(), point.cumulative_equity.to_string()])
            .map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
