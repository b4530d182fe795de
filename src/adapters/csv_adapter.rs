//! CSV file bar store.
//!
//! One file per instrument and resolution, `<dir>/<instrument>_<code>.csv`,
//! with a header row and columns `timestamp,open,high,low,close,volume` plus
//! an optional `logr`. Missing log returns are computed from the previous
//! close in the file.

use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::domain::bar::{log_return, Bar};
use crate::domain::error::ReplayError;
use crate::domain::resolution::Resolution;
use crate::ports::bar_store::BarStore;
use crate::ports::config_port::ConfigPort;

const RESOLUTIONS: [Resolution; 4] = [
    Resolution::Daily,
    Resolution::ThirtyMinute,
    Resolution::FiveMinute,
    Resolution::OneMinute,
];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ReplayError> {
        let dir = config
            .get_string("csv", "dir")
            .ok_or_else(|| ReplayError::ConfigMissing {
                section: "csv".into(),
                key: "dir".into(),
            })?;
        Ok(Self::new(PathBuf::from(dir)))
    }

    fn csv_path(&self, instrument: &str, resolution: Resolution) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", instrument, resolution.code()))
    }

    /// Every bar in the file, sorted by time. A missing file holds no bars.
    fn read_all(&self, instrument: &str, resolution: Resolution) -> Result<Vec<Bar>, ReplayError> {
        let path = self.csv_path(instrument, resolution);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| ReplayError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut rows: Vec<(Bar, Option<f64>)> = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| ReplayError::Database {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            let field = |i: usize, name: &str| {
                record.get(i).ok_or_else(|| ReplayError::Database {
                    reason: format!("missing {} column", name),
                })
            };
            let number = |i: usize, name: &str| -> Result<f64, ReplayError> {
                field(i, name)?
                    .trim()
                    .parse()
                    .map_err(|e| ReplayError::Database {
                        reason: format!("invalid {} value: {}", name, e),
                    })
            };

            let timestamp = parse_timestamp(field(0, "timestamp")?)?;
            let close = number(4, "close")?;
            let volume: i64 = field(5, "volume")?
                .trim()
                .parse()
                .map_err(|e| ReplayError::Database {
                    reason: format!("invalid volume value: {}", e),
                })?;
            let logr = match record.get(6).map(str::trim).filter(|s| !s.is_empty()) {
                Some(_) => Some(number(6, "logr")?),
                None => None,
            };

            let bar = Bar {
                instrument: instrument.to_string(),
                timestamp,
                open: number(1, "open")?,
                high: number(2, "high")?,
                low: number(3, "low")?,
                close,
                volume,
                logr: 0.0,
            };
            rows.push((bar, logr));
        }

        // Derived returns need the previous bar in time, not in file order.
        rows.sort_by_key(|(b, _)| b.timestamp);
        let mut prev: Option<f64> = None;
        let bars = rows
            .into_iter()
            .map(|(mut bar, logr)| {
                bar.logr = logr.unwrap_or_else(|| log_return(prev, bar.close));
                prev = Some(bar.close);
                bar
            })
            .collect();
        Ok(bars)
    }
}

/// `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or a bare date (midnight).
fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ReplayError> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|e| ReplayError::Database {
            reason: format!("invalid timestamp '{}': {}", raw, e),
        })
}

impl BarStore for CsvAdapter {
    fn fetch_bars(
        &self,
        instrument: &str,
        resolution: Resolution,
        begin: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, ReplayError> {
        Ok(self
            .read_all(instrument, resolution)?
            .into_iter()
            .filter(|b| b.timestamp >= begin && b.timestamp <= end)
            .collect())
    }

    fn latest_timestamp(
        &self,
        instrument: &str,
        resolution: Resolution,
    ) -> Result<Option<NaiveDateTime>, ReplayError> {
        Ok(self
            .read_all(instrument, resolution)?
            .last()
            .map(|b| b.timestamp))
    }

    fn list_instruments(&self) -> Result<Vec<String>, ReplayError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| ReplayError::Database {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut instruments = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ReplayError::Database {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(stem) = name.strip_suffix(".csv") else {
                continue;
            };
            let Some((instrument, code)) = stem.rsplit_once('_') else {
                continue;
            };
            if RESOLUTIONS.iter().any(|r| r.code() == code) {
                instruments.push(instrument.to_string());
            }
        }

        instruments.sort();
        instruments.dedup();
        Ok(instruments)
    }
}
