//! Daily bar collection pipeline
//!
//! Pulls raw bars from a [`DailyBarSource`], cleans them up, writes them
//! through the bar store's upsert path, and refreshes registry stats.
//! Batch collection never aborts on a single instrument's failure.

pub mod source;

pub use source::{CsvBarSource, DailyBarSource, RawDailyBar};

use crate::calendar::{parse_ymd, TradingCalendar};
use crate::db::models::DailyBar;
use crate::db::Database;
use crate::error::Result;
use chrono::NaiveDate;
use serde::Serialize;

/// Strip feed formatting from a numeric field and parse it
///
/// Feeds deliver values like `"+55,100"` or `"-1,234"`; sign markers,
/// separators and padding are removed and the magnitude parsed. Empty or
/// unparsable input yields 0.
pub fn clean_numeric(value: &str) -> i64 {
    let cleaned: String = value
        .chars()
        .filter(|c| !matches!(c, '+' | '-' | ',') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return 0;
    }
    cleaned.parse().unwrap_or(0)
}

/// Parse a numeric field, treating an empty field as absent
fn parse_field(value: &str) -> Option<i64> {
    if value.trim().is_empty() {
        None
    } else {
        Some(clean_numeric(value))
    }
}

/// Turn a raw feed row into a storable bar
///
/// Rows without a date or with a non-positive close are dropped (the feed
/// emits such rows for halted or not-yet-settled sessions). Derived
/// fields are left at zero; [`compute_derived_fields`] fills them in once
/// the batch is sorted.
pub fn parse_raw_bar(raw: &RawDailyBar) -> Option<DailyBar> {
    let date = raw.date.trim();
    if date.is_empty() {
        return None;
    }

    let close = clean_numeric(&raw.close);
    if close <= 0 {
        return None;
    }

    Some(DailyBar {
        date: date.to_string(),
        open: parse_field(&raw.open),
        high: parse_field(&raw.high),
        low: parse_field(&raw.low),
        close: Some(close),
        volume: parse_field(&raw.volume),
        turnover: parse_field(&raw.turnover),
        prev_day_diff: 0,
        change_rate: 0,
    })
}

/// Fill previous-day difference and change rate from consecutive closes
///
/// `bars` must already be sorted by date ascending. The change rate is
/// the percentage move scaled by 100 (two decimal places).
pub fn compute_derived_fields(bars: &mut [DailyBar]) {
    for i in 1..bars.len() {
        let prev_close = bars[i - 1].close;
        let close = bars[i].close;
        if let (Some(prev), Some(current)) = (prev_close, close) {
            if prev > 0 {
                let diff = current - prev;
                bars[i].prev_day_diff = diff;
                bars[i].change_rate = (diff as f64 / prev as f64 * 10000.0).round() as i64;
            }
        }
    }
}

/// Whether an instrument's data is current enough to skip re-collection
///
/// Fresh means the latest stored date is on or after the most recent
/// trading day at or before `today`. An unparsable date is never fresh.
pub fn is_fresh(latest_date: &str, today: NaiveDate, calendar: &TradingCalendar) -> bool {
    match parse_ymd(latest_date) {
        Ok(latest) => latest >= calendar.last_trading_day(today),
        Err(_) => false,
    }
}

/// Outcome of collecting a single instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    /// Bars were written (count)
    Collected(usize),
    /// Data was already fresh
    Skipped,
    /// The source returned nothing usable
    NoData,
}

/// Batch collection summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectSummary {
    pub success: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    pub total_saved: usize,
}

/// Daily bar collector over one database and one source
pub struct DailyBarCollector<'a, S: DailyBarSource> {
    db: &'a Database,
    source: &'a S,
    calendar: TradingCalendar,
}

impl<'a, S: DailyBarSource> DailyBarCollector<'a, S> {
    pub fn new(db: &'a Database, source: &'a S) -> Self {
        Self {
            db,
            source,
            calendar: TradingCalendar::default(),
        }
    }

    /// Register the instrument and provision its bar table
    ///
    /// Pulls the display name from the source when the registry has none.
    fn prepare_instrument(&self, code: &str) -> Result<()> {
        let known_name = self
            .db
            .instrument(code)?
            .and_then(|instrument| instrument.name);

        let name = match known_name {
            Some(name) => Some(name),
            None => self.source.instrument_name(code)?,
        };

        self.db.register_instrument(code, name.as_deref(), None)?;

        if !self.db.bar_table_exists(code)? {
            self.db.create_bar_table(code)?;
        }
        self.db.mark_table_created(code)?;

        Ok(())
    }

    /// Collect one instrument as of today
    pub fn collect_one(&self, code: &str, force: bool) -> Result<CollectOutcome> {
        self.collect_one_as_of(code, force, chrono::Local::now().date_naive())
    }

    /// Collect one instrument as of an explicit date
    pub fn collect_one_as_of(
        &self,
        code: &str,
        force: bool,
        today: NaiveDate,
    ) -> Result<CollectOutcome> {
        self.prepare_instrument(code)?;

        if !force {
            if let Some(latest) = self.db.latest_bar_date(code)? {
                if is_fresh(&latest, today, &self.calendar) {
                    tracing::info!("{}: data is fresh (latest {}), skipping", code, latest);
                    return Ok(CollectOutcome::Skipped);
                }
            }
        }

        let raw_bars = self.source.fetch_daily_bars(code)?;
        let mut bars: Vec<DailyBar> = raw_bars.iter().filter_map(parse_raw_bar).collect();

        if bars.is_empty() {
            tracing::warn!("{}: source returned no usable bars", code);
            return Ok(CollectOutcome::NoData);
        }

        bars.sort_by(|a, b| a.date.cmp(&b.date));
        compute_derived_fields(&mut bars);

        for bar in &bars {
            self.db.upsert_bar(code, bar)?;
        }
        self.db.update_stats(code)?;

        tracing::info!("{}: saved {} bars", code, bars.len());
        Ok(CollectOutcome::Collected(bars.len()))
    }

    /// Collect a list of instruments, continuing past failures
    pub fn collect_many(&self, codes: &[String], force: bool) -> CollectSummary {
        let mut summary = CollectSummary::default();

        for (index, code) in codes.iter().enumerate() {
            tracing::info!("Collecting {} [{}/{}]", code, index + 1, codes.len());

            match self.collect_one(code, force) {
                Ok(CollectOutcome::Collected(count)) => {
                    summary.success.push(code.clone());
                    summary.total_saved += count;
                }
                Ok(CollectOutcome::Skipped) => summary.skipped.push(code.clone()),
                Ok(CollectOutcome::NoData) => summary.failed.push(code.clone()),
                Err(e) => {
                    tracing::error!("{}: collection failed: {}", code, e);
                    summary.failed.push(code.clone());
                }
            }
        }

        tracing::info!(
            "Collection finished: {} ok, {} failed, {} skipped, {} bars saved",
            summary.success.len(),
            summary.failed.len(),
            summary.skipped.len(),
            summary.total_saved
        );

        summary
    }

    /// Collect every active instrument from the registry
    pub fn collect_all_active(&self, force: bool) -> Result<CollectSummary> {
        let codes: Vec<String> = self
            .db
            .list_active_instruments()?
            .into_iter()
            .map(|instrument| instrument.code)
            .collect();

        if codes.is_empty() {
            tracing::warn!("No active instruments registered");
            return Ok(CollectSummary::default());
        }

        Ok(self.collect_many(&codes, force))
    }

    /// Refresh cached registry stats for every active instrument
    ///
    /// Returns the number of instruments refreshed; instruments without a
    /// bar table are skipped.
    pub fn refresh_all_stats(&self) -> Result<usize> {
        let mut refreshed = 0;
        for instrument in self.db.list_active_instruments()? {
            if self.db.bar_table_exists(&instrument.code)? {
                self.db.update_stats(&instrument.code)?;
                refreshed += 1;
            }
        }
        tracing::info!("Refreshed stats for {} instruments", refreshed);
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn raw(date: &str, close: &str, volume: &str) -> RawDailyBar {
        RawDailyBar {
            date: date.to_string(),
            open: close.to_string(),
            high: close.to_string(),
            low: close.to_string(),
            close: close.to_string(),
            volume: volume.to_string(),
            turnover: String::new(),
        }
    }

    #[test]
    fn test_clean_numeric() {
        assert_eq!(clean_numeric("55000"), 55000);
        assert_eq!(clean_numeric("+55,100"), 55100);
        assert_eq!(clean_numeric("-1,234"), 1234);
        assert_eq!(clean_numeric("  1 234 "), 1234);
        assert_eq!(clean_numeric(""), 0);
        assert_eq!(clean_numeric("abc"), 0);
    }

    #[test]
    fn test_parse_raw_bar_skips_bad_rows() {
        assert!(parse_raw_bar(&raw("", "55000", "1000")).is_none());
        assert!(parse_raw_bar(&raw("20250102", "0", "1000")).is_none());
        assert!(parse_raw_bar(&raw("20250102", "", "1000")).is_none());

        let bar = parse_raw_bar(&raw("20250102", "+55,000", "1000")).unwrap();
        assert_eq!(bar.close, Some(55000));
        assert_eq!(bar.turnover, None);
    }

    #[test]
    fn test_compute_derived_fields() {
        let mut bars: Vec<DailyBar> = [
            raw("20250102", "50000", "1000"),
            raw("20250103", "51000", "1000"),
            raw("20250106", "49980", "1000"),
        ]
        .iter()
        .filter_map(parse_raw_bar)
        .collect();

        compute_derived_fields(&mut bars);

        assert_eq!(bars[0].prev_day_diff, 0);
        assert_eq!(bars[1].prev_day_diff, 1000);
        // +2.00% stored as 200
        assert_eq!(bars[1].change_rate, 200);
        assert_eq!(bars[2].prev_day_diff, -1020);
        // -2.00% stored as -200
        assert_eq!(bars[2].change_rate, -200);
    }

    #[test]
    fn test_is_fresh_follows_last_trading_day() {
        let cal = TradingCalendar::default();
        // Friday data on a Sunday is fresh
        assert!(is_fresh("20250103", d(2025, 1, 5), &cal));
        // Thursday data on a Monday is stale
        assert!(!is_fresh("20250102", d(2025, 1, 6), &cal));
        // Same-day data is fresh
        assert!(is_fresh("20250106", d(2025, 1, 6), &cal));
        // Garbage dates are never fresh
        assert!(!is_fresh("not-a-date", d(2025, 1, 6), &cal));
    }

    fn csv_fixture(dir: &std::path::Path) {
        std::fs::write(
            dir.join("005930.csv"),
            "date,open,high,low,close,volume,turnover\n\
             20250103,55100,55600,54900,55500,1300000,72000000000\n\
             20250102,54900,55400,54700,55000,1234567,67890000000\n",
        )
        .unwrap();
    }

    #[test]
    fn test_collect_one_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        csv_fixture(dir.path());

        let db = Database::open_in_memory().unwrap();
        let source = CsvBarSource::new(dir.path());
        let collector = DailyBarCollector::new(&db, &source);

        let outcome = collector
            .collect_one_as_of("005930", false, d(2025, 1, 6))
            .unwrap();
        assert_eq!(outcome, CollectOutcome::Collected(2));

        let instrument = db.instrument("005930").unwrap().unwrap();
        assert!(instrument.table_created);
        assert_eq!(instrument.data_count, 2);
        assert_eq!(instrument.first_date.as_deref(), Some("20250102"));
        assert_eq!(instrument.latest_date.as_deref(), Some("20250103"));
    }

    #[test]
    fn test_collect_one_skips_fresh_data() {
        let dir = tempfile::tempdir().unwrap();
        csv_fixture(dir.path());

        let db = Database::open_in_memory().unwrap();
        let source = CsvBarSource::new(dir.path());
        let collector = DailyBarCollector::new(&db, &source);

        collector
            .collect_one_as_of("005930", false, d(2025, 1, 3))
            .unwrap();
        // Latest bar is 20250103; on the same day the data is fresh
        let outcome = collector
            .collect_one_as_of("005930", false, d(2025, 1, 3))
            .unwrap();
        assert_eq!(outcome, CollectOutcome::Skipped);

        // Forcing bypasses the freshness policy
        let outcome = collector
            .collect_one_as_of("005930", true, d(2025, 1, 3))
            .unwrap();
        assert_eq!(outcome, CollectOutcome::Collected(2));
    }

    #[test]
    fn test_collect_many_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        csv_fixture(dir.path());

        let db = Database::open_in_memory().unwrap();
        let source = CsvBarSource::new(dir.path());
        let collector = DailyBarCollector::new(&db, &source);

        let codes = vec!["005930".to_string(), "999999".to_string()];
        let summary = collector.collect_many(&codes, true);

        assert_eq!(summary.success, vec!["005930"]);
        assert_eq!(summary.failed, vec!["999999"]);
        assert_eq!(summary.total_saved, 2);
    }

    #[test]
    fn test_refresh_all_stats() {
        let dir = tempfile::tempdir().unwrap();
        csv_fixture(dir.path());

        let db = Database::open_in_memory().unwrap();
        db.register_instrument("000660", Some("SK hynix"), Some("KOSPI"))
            .unwrap();
        let source = CsvBarSource::new(dir.path());
        let collector = DailyBarCollector::new(&db, &source);
        collector
            .collect_one_as_of("005930", true, d(2025, 1, 6))
            .unwrap();

        // 000660 has no bar table and is skipped without error
        let refreshed = collector.refresh_all_stats().unwrap();
        assert_eq!(refreshed, 1);
    }
}
