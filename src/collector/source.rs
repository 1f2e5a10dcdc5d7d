//! Daily bar sources
//!
//! The broker connector itself is an external collaborator; this module
//! defines the seam the collector consumes. Feeds deliver numeric fields
//! as text (sign markers, thousands separators), so raw bars stay
//! stringly-typed until the collector cleans them up. A CSV-backed source
//! ships for offline imports and tests.

use crate::error::{AppError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One raw daily bar as delivered by a feed (unparsed text fields)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDailyBar {
    pub date: String,
    #[serde(default)]
    pub open: String,
    #[serde(default)]
    pub high: String,
    #[serde(default)]
    pub low: String,
    #[serde(default)]
    pub close: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub turnover: String,
}

/// A source of daily bars, keyed by instrument code
pub trait DailyBarSource {
    /// Display name for an instrument, if the source knows it
    fn instrument_name(&self, code: &str) -> Result<Option<String>>;

    /// All available daily bars for an instrument, in any order
    fn fetch_daily_bars(&self, code: &str) -> Result<Vec<RawDailyBar>>;
}

/// CSV-backed bar source: one `<code>.csv` file per instrument
///
/// Expected header: `date,open,high,low,close,volume,turnover`.
pub struct CsvBarSource {
    dir: PathBuf,
}

impl CsvBarSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_path(&self, code: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", code))
    }
}

impl DailyBarSource for CsvBarSource {
    fn instrument_name(&self, _code: &str) -> Result<Option<String>> {
        // CSV files carry no instrument metadata
        Ok(None)
    }

    fn fetch_daily_bars(&self, code: &str) -> Result<Vec<RawDailyBar>> {
        let path = self.file_path(code);
        if !path.exists() {
            return Err(AppError::NotFound(format!(
                "no CSV file for instrument {} at {}",
                code,
                path.display()
            )));
        }

        read_bars_csv(&path)
    }
}

fn read_bars_csv(path: &Path) -> Result<Vec<RawDailyBar>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut bars = Vec::new();
    for record in reader.deserialize() {
        let bar: RawDailyBar = record?;
        bars.push(bar);
    }
    tracing::debug!("Read {} raw bars from {}", bars.len(), path.display());
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_source_reads_bars() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("005930.csv"),
            "date,open,high,low,close,volume,turnover\n\
             20250102,54900,55400,54700,55000,\"1,234,567\",67890000000\n\
             20250103,+55100,55600,54900,55500,1300000,72000000000\n",
        )
        .unwrap();

        let source = CsvBarSource::new(dir.path());
        let bars = source.fetch_daily_bars("005930").unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, "20250102");
        assert_eq!(bars[0].volume, "1,234,567");
        assert_eq!(bars[1].open, "+55100");
    }

    #[test]
    fn test_csv_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvBarSource::new(dir.path());
        let result = source.fetch_daily_bars("999999");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_csv_source_has_no_names() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvBarSource::new(dir.path());
        assert!(source.instrument_name("005930").unwrap().is_none());
    }
}
