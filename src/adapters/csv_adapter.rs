//! CSV bar files, one `<symbol>.csv` per symbol under a base directory.
//!
//! Header: `timestamp,open,high,low,close,volume`. Volume may be omitted.

use crate::domain::error::TradesimError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    /// Read one file directly, outside any base directory.
    pub fn read_file(path: &Path) -> Result<Vec<Bar>, TradesimError> {
        let content = fs::read_to_string(path).map_err(|e| TradesimError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        parse_bars(&content).map_err(|e| match e {
            TradesimError::Data { reason } => TradesimError::Data {
                reason: format!("{}: {}", path.display(), reason),
            },
            other => other,
        })
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TradesimError> {
        let bars = Self::read_file(&self.csv_path(symbol))?;
        log::debug!("loaded {} bars for {}", bars.len(), symbol);
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TradesimError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| TradesimError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Parse CSV text into bars sorted by timestamp. Duplicate timestamps and
/// bars whose high is below their low are rejected.
pub fn parse_bars(content: &str) -> Result<Vec<Bar>, TradesimError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut bars = Vec::new();
    for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|e| TradesimError::Data {
            reason: format!("CSV parse error: {}", e),
        })?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| TradesimError::Data {
            reason: format!("row {}: invalid timestamp '{}'", line + 1, row.timestamp),
        })?;
        if row.high < row.low {
            return Err(TradesimError::Data {
                reason: format!("row {}: high {} below low {}", line + 1, row.high, row.low),
            });
        }
        bars.push(Bar {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    if let Some(pair) = bars.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
        return Err(TradesimError::Data {
            reason: format!("duplicate timestamp {}", pair[0].timestamp),
        });
    }
    Ok(bars)
}
