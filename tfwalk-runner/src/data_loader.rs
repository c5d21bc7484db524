//! Candle file loading for the runner.
//!
//! Each (instrument, timeframe) lives in its own file:
//! - `.csv`: header `timestamp,open,high,low,close`
//! - `.json`: an array of `{timestamp, open, high, low, close}` objects
//! - `.jsonl`: one such object per line
//!
//! Records are handed to the engine untouched; dropping and counting bad
//! records is the engine's job. The exception is an incremental update
//! file: base and update are normalized here and merged last-write-wins.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use tfwalk_core::data::{merge_incremental, normalize_raw, DropReport};
use tfwalk_core::domain::{Candle, RawCandle};
use tfwalk_core::engine::InstrumentInput;

use crate::config::InstrumentConfig;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported candle file extension: {0}")]
    UnsupportedFormat(PathBuf),
}

/// An instrument's raw input plus records dropped while merging updates.
#[derive(Debug, Clone)]
pub struct LoadedInstrument {
    pub input: InstrumentInput,
    pub drops: DropReport,
}

/// Load every configured timeframe of one instrument.
pub fn load_instrument(config: &InstrumentConfig) -> Result<LoadedInstrument, LoadError> {
    let mut input = InstrumentInput::new(config.spec());
    let mut drops = DropReport::default();

    for (&tf, path) in &config.data {
        let records = load_records(path)?;
        let records = match config.updates.get(&tf) {
            None => records,
            Some(update_path) => {
                let (base, base_drops) = normalize_raw(&config.symbol, tf, &records);
                let (incoming, inc_drops) =
                    normalize_raw(&config.symbol, tf, &load_records(update_path)?);
                drops.absorb(&base_drops);
                drops.absorb(&inc_drops);
                let merged = merge_incremental(&base, &incoming);
                debug!(
                    symbol = %config.symbol,
                    timeframe = %tf,
                    base = base.len(),
                    incoming = incoming.len(),
                    merged = merged.len(),
                    "merged incremental update"
                );
                merged.into_iter().map(RawCandle::from).collect()
            }
        };
        input = input.with_series(tf, records);
    }

    Ok(LoadedInstrument { input, drops })
}

/// Read one candle file, dispatching on its extension.
pub fn load_records(path: &Path) -> Result<Vec<RawCandle>, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv") => read_csv(path),
        Some("json") => read_json(path),
        Some("jsonl") => read_jsonl(path),
        _ => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Write candles as CSV with the header `load_records` expects.
pub fn save_csv(path: &Path, candles: &[Candle]) -> Result<(), LoadError> {
    let csv_err = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| LoadError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for candle in candles {
        writer.serialize(RawCandle::from(*candle)).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_csv(path: &Path) -> Result<Vec<RawCandle>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(open(path)?);
    reader
        .deserialize::<RawCandle>()
        .map(|row| {
            row.map_err(|source| LoadError::Csv {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

fn read_json(path: &Path) -> Result<Vec<RawCandle>, LoadError> {
    serde_json::from_reader(BufReader::new(open(path)?)).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn read_jsonl(path: &Path) -> Result<Vec<RawCandle>, LoadError> {
    let mut out = Vec::new();
    for line in BufReader::new(open(path)?).lines() {
        let line = line.map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: RawCandle = serde_json::from_str(&line).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Write;
    use tfwalk_core::domain::{AssetClass, Timeframe};

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn csv_with_blank_timestamp_keeps_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "a.csv",
            "timestamp,open,high,low,close\n\
             2024-03-04T09:00:00Z,1.1,1.2,1.0,1.15\n\
             ,1.1,1.2,1.0,1.15\n",
        );
        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp.as_deref(), Some("2024-03-04T09:00:00Z"));
        assert_eq!(records[1].timestamp, None);
    }

    #[test]
    fn json_and_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let json = write(
            dir.path(),
            "a.json",
            r#"[{"timestamp":"2024-03-04T09:00:00Z","open":1,"high":2,"low":0.5,"close":1.5},
               {"open":1,"high":2,"low":0.5,"close":1.5}]"#,
        );
        let records = load_records(&json).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].timestamp.is_none());

        let jsonl = write(
            dir.path(),
            "a.jsonl",
            "{\"timestamp\":\"2024-03-04T09:00:00Z\",\"open\":1,\"high\":2,\"low\":0.5,\"close\":1.5}\n\n",
        );
        assert_eq!(load_records(&jsonl).unwrap().len(), 1);
    }

    #[test]
    fn unsupported_extension_and_missing_file() {
        assert!(matches!(
            load_records(Path::new("candles.parquet")),
            Err(LoadError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            load_records(Path::new("/definitely/not/here.csv")),
            Err(LoadError::Io { .. })
        ));
    }

    #[test]
    fn csv_round_trip_through_save() {
        let dir = tempfile::tempdir().unwrap();
        let candles: Vec<Candle> = (0..3)
            .map(|i| {
                let ts = chrono::DateTime::parse_from_rfc3339("2024-03-04T09:00:00Z")
                    .unwrap()
                    .with_timezone(&chrono::Utc)
                    + Timeframe::M5.interval() * i;
                Candle::new(ts, 1.0, 1.2, 0.9, 1.1)
            })
            .collect();
        let path = dir.path().join("nested/out.csv");
        save_csv(&path, &candles).unwrap();
        let parsed: Vec<Candle> = load_records(&path)
            .unwrap()
            .iter()
            .map(|r| r.parse().unwrap())
            .collect();
        assert_eq!(parsed, candles);
    }

    #[test]
    fn update_file_merges_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let header = "timestamp,open,high,low,close\n";
        let base = write(
            dir.path(),
            "base.csv",
            &format!(
                "{header}2024-03-04T09:00:00Z,1,2,0.5,1\n2024-03-04T09:05:00Z,1,2,0.5,1\n"
            ),
        );
        let update = write(
            dir.path(),
            "update.csv",
            &format!(
                "{header}2024-03-04T09:05:00Z,1,2,0.5,1.8\n2024-03-04T09:10:00Z,1,2,0.5,1.2\n,1,2,0.5,1\n"
            ),
        );
        let config = InstrumentConfig {
            symbol: "EURUSD".into(),
            asset_class: AssetClass::Forex,
            pip_size: None,
            spread: None,
            data: BTreeMap::from([(Timeframe::M5, base)]),
            updates: BTreeMap::from([(Timeframe::M5, update)]),
        };
        let loaded = load_instrument(&config).unwrap();
        assert_eq!(loaded.drops.missing_timestamp, 1);
        let closes: Vec<f64> = loaded.input.raw[&Timeframe::M5]
            .iter()
            .map(|r| r.close)
            .collect();
        assert_eq!(closes, vec![1.0, 1.8, 1.2]);
    }
}
