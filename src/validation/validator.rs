//! Data quality validator
//!
//! Runs the check battery against one instrument's bar table and registry
//! entry. Storage failures inside a check degrade to an ERROR result for
//! that check; validation never aborts the batch.

use super::{CheckType, Severity, ValidationResult};
use crate::calendar::{format_ymd, parse_ymd, TradingCalendar};
use crate::db::bars::BarField;
use crate::db::Database;
use crate::error::Result;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};

/// Sample size caps for detail payloads
const MAX_SAMPLE_DATES: usize = 10;
const MAX_SAMPLE_ANOMALIES: usize = 10;
const MAX_SAMPLE_DUPLICATES: usize = 10;

/// Missing-day count above which the check escalates to ERROR
const MISSING_DAYS_ERROR_THRESHOLD: i64 = 5;

/// Zero-volume ratio (percent) at or above which the check is an ERROR
const ZERO_VOLUME_ERROR_RATIO: f64 = 10.0;

/// Close prices outside `[mean * LOW, mean * HIGH]` count as anomalies
const ANOMALY_LOW_FACTOR: f64 = 0.5;
const ANOMALY_HIGH_FACTOR: f64 = 3.0;

/// Data quality validator over one database
pub struct DataQualityValidator<'a> {
    db: &'a Database,
    calendar: TradingCalendar,
}

impl<'a> DataQualityValidator<'a> {
    /// Validator with the default KRX calendar
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            calendar: TradingCalendar::default(),
        }
    }

    /// Validator with an explicit calendar
    pub fn with_calendar(db: &'a Database, calendar: TradingCalendar) -> Self {
        Self { db, calendar }
    }

    /// Run all checks for one instrument, in order
    ///
    /// Short-circuits after the table-existence check when the bar table
    /// is missing. Always returns a result list, never an error.
    pub fn validate(&self, code: &str) -> Vec<ValidationResult> {
        let mut results = Vec::new();

        match self.db.bar_table_exists(code) {
            Ok(true) => {}
            Ok(false) => {
                results.push(ValidationResult::new(
                    code,
                    CheckType::TableExists,
                    Severity::Error,
                    "bar table does not exist",
                ));
                return results;
            }
            Err(e) => {
                results.push(ValidationResult::new(
                    code,
                    CheckType::TableExists,
                    Severity::Error,
                    format!("table existence check failed: {}", e),
                ));
                return results;
            }
        }

        results.extend(self.run_check(code, CheckType::BasicCheck, self.check_basic_quality(code)));
        results.extend(self.run_check(
            code,
            CheckType::MissingTradingDays,
            self.check_missing_trading_days(code),
        ));
        results.extend(self.run_check(
            code,
            CheckType::PriceAnomalies,
            self.check_price_anomalies(code),
        ));
        results.extend(self.run_check(code, CheckType::VolumeCheck, self.check_volume(code)));
        results.extend(self.run_check(
            code,
            CheckType::DuplicateCheck,
            self.check_duplicate_dates(code),
        ));

        results
    }

    /// Validate every active instrument
    ///
    /// A failing registry read yields an empty map; a failing instrument
    /// contributes its ERROR results and iteration continues.
    pub fn validate_all(&self) -> BTreeMap<String, Vec<ValidationResult>> {
        let active = match self.db.list_active_instruments() {
            Ok(list) => list,
            Err(e) => {
                tracing::error!("Failed to list active instruments: {}", e);
                return BTreeMap::new();
            }
        };

        if active.is_empty() {
            tracing::warn!("No active instruments to validate");
            return BTreeMap::new();
        }

        tracing::info!("Validating {} instruments", active.len());

        let mut all_results = BTreeMap::new();
        for (index, instrument) in active.iter().enumerate() {
            tracing::info!(
                "Validating {} ({}) [{}/{}]",
                instrument.code,
                instrument.name.as_deref().unwrap_or("unknown"),
                index + 1,
                active.len()
            );

            let results = self.validate(&instrument.code);

            let errors = results
                .iter()
                .filter(|r| r.severity == Severity::Error)
                .count();
            let warnings = results
                .iter()
                .filter(|r| r.severity == Severity::Warning)
                .count();
            if errors > 0 || warnings > 0 {
                tracing::warn!(
                    "{}: {} errors, {} warnings",
                    instrument.code,
                    errors,
                    warnings
                );
            }

            all_results.insert(instrument.code.clone(), results);
        }

        all_results
    }

    /// Degrade a failed check into a single ERROR result
    fn run_check(
        &self,
        code: &str,
        check: CheckType,
        outcome: Result<Vec<ValidationResult>>,
    ) -> Vec<ValidationResult> {
        match outcome {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("{} failed for {}: {}", check, code, e);
                vec![ValidationResult::new(
                    code,
                    check,
                    Severity::Error,
                    format!("check failed: {}", e),
                )]
            }
        }
    }

    /// Row count and per-field NULL checks
    fn check_basic_quality(&self, code: &str) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::new();
        let total = self.db.bar_count(code)?;

        if total == 0 {
            results.push(
                ValidationResult::new(
                    code,
                    CheckType::DataCount,
                    Severity::Warning,
                    "no data collected",
                )
                .with_details(json!({ "total_count": 0 })),
            );
            return Ok(results);
        }

        for field in BarField::ALL {
            let nulls = self.db.null_count(code, field)?;
            if nulls > 0 {
                results.push(
                    ValidationResult::new(
                        code,
                        CheckType::NullData,
                        Severity::Warning,
                        format!("{} is NULL in {} rows", field.column(), nulls),
                    )
                    .with_details(json!({
                        "field": field.column(),
                        "null_count": nulls,
                        "total_count": total,
                    })),
                );
            }
        }

        results.push(
            ValidationResult::new(
                code,
                CheckType::DataCount,
                Severity::Pass,
                format!("{} rows collected", total),
            )
            .with_details(json!({ "total_count": total })),
        );

        Ok(results)
    }

    /// Expected-vs-actual trading day coverage over the stored date range
    fn check_missing_trading_days(&self, code: &str) -> Result<Vec<ValidationResult>> {
        let Some((first, last)) = self.db.bar_date_range(code)? else {
            return Ok(Vec::new());
        };

        let start = parse_ymd(&first)?;
        let end = parse_ymd(&last)?;

        let expected_days = self.calendar.trading_days_between(start, end);
        let expected_count = expected_days.len() as i64;
        let actual_count = self.db.distinct_date_count(code)?;
        let missing_count = expected_count - actual_count;

        if missing_count > 0 {
            let existing: HashSet<String> = self.db.bar_dates(code)?.into_iter().collect();
            let missing_dates: Vec<String> = expected_days
                .iter()
                .map(|d| format_ymd(*d))
                .filter(|d| !existing.contains(d))
                .take(MAX_SAMPLE_DATES)
                .collect();

            let severity = if missing_count <= MISSING_DAYS_ERROR_THRESHOLD {
                Severity::Warning
            } else {
                Severity::Error
            };

            Ok(vec![ValidationResult::new(
                code,
                CheckType::MissingTradingDays,
                severity,
                format!("{} trading days missing", missing_count),
            )
            .with_details(json!({
                "expected_count": expected_count,
                "actual_count": actual_count,
                "missing_count": missing_count,
                "missing_dates": missing_dates,
                "date_range": format!("{} ~ {}", first, last),
            }))])
        } else {
            Ok(vec![ValidationResult::new(
                code,
                CheckType::MissingTradingDays,
                Severity::Pass,
                format!("trading day coverage complete ({} days)", actual_count),
            )
            .with_details(json!({
                "expected_count": expected_count,
                "actual_count": actual_count,
            }))])
        }
    }

    /// Statistical close-price band check plus zero/NULL close detection
    ///
    /// A structurally absent price is always an error; a present but
    /// out-of-band price is only a warning.
    fn check_price_anomalies(&self, code: &str) -> Result<Vec<ValidationResult>> {
        let Some(stats) = self.db.close_price_stats(code)? else {
            return Ok(Vec::new());
        };

        let low_threshold = stats.avg * ANOMALY_LOW_FACTOR;
        let high_threshold = stats.avg * ANOMALY_HIGH_FACTOR;

        let anomalies =
            self.db
                .price_outliers(code, low_threshold, high_threshold, MAX_SAMPLE_ANOMALIES)?;
        let zero_count = self.db.zero_close_count(code)?;

        let mut results = Vec::new();

        if !anomalies.is_empty() {
            results.push(
                ValidationResult::new(
                    code,
                    CheckType::PriceAnomalies,
                    Severity::Warning,
                    format!("{} close prices outside the expected band", anomalies.len()),
                )
                .with_details(json!({
                    "avg_price": stats.avg as i64,
                    "threshold_low": low_threshold as i64,
                    "threshold_high": high_threshold as i64,
                    "anomalies": anomalies,
                })),
            );
        }

        if zero_count > 0 {
            results.push(
                ValidationResult::new(
                    code,
                    CheckType::ZeroPrice,
                    Severity::Error,
                    format!("{} rows with zero or NULL close", zero_count),
                )
                .with_details(json!({ "zero_count": zero_count })),
            );
        }

        if anomalies.is_empty() && zero_count == 0 {
            results.push(
                ValidationResult::new(
                    code,
                    CheckType::PriceQuality,
                    Severity::Pass,
                    "close prices within the expected band",
                )
                .with_details(json!({
                    "avg_price": stats.avg as i64,
                    "min_price": stats.min,
                    "max_price": stats.max,
                })),
            );
        }

        Ok(results)
    }

    /// Zero/NULL volume ratio check
    fn check_volume(&self, code: &str) -> Result<Vec<ValidationResult>> {
        let zero_count = self.db.zero_volume_count(code)?;

        if zero_count > 0 {
            let total = self.db.bar_count(code)?;
            let zero_ratio = zero_count as f64 / total as f64 * 100.0;
            let severity = if zero_ratio < ZERO_VOLUME_ERROR_RATIO {
                Severity::Warning
            } else {
                Severity::Error
            };

            Ok(vec![ValidationResult::new(
                code,
                CheckType::ZeroVolume,
                severity,
                format!(
                    "{} rows with zero or NULL volume ({:.1}%)",
                    zero_count, zero_ratio
                ),
            )
            .with_details(json!({
                "zero_count": zero_count,
                "total_count": total,
                "zero_ratio": zero_ratio,
            }))])
        } else {
            let avg_volume = self.db.average_volume(code)?;
            Ok(vec![ValidationResult::new(
                code,
                CheckType::VolumeQuality,
                Severity::Pass,
                "volume data healthy",
            )
            .with_details(json!({ "avg_volume": avg_volume as i64 }))])
        }
    }

    /// Duplicate date detection
    fn check_duplicate_dates(&self, code: &str) -> Result<Vec<ValidationResult>> {
        let duplicates = self.db.duplicate_dates(code)?;

        if duplicates.is_empty() {
            return Ok(vec![ValidationResult::new(
                code,
                CheckType::DuplicateDates,
                Severity::Pass,
                "no duplicate dates",
            )]);
        }

        let total_duplicate_records: i64 = duplicates.iter().map(|(_, count)| count - 1).sum();
        let sample: Vec<_> = duplicates
            .iter()
            .take(MAX_SAMPLE_DUPLICATES)
            .cloned()
            .collect();

        Ok(vec![ValidationResult::new(
            code,
            CheckType::DuplicateDates,
            Severity::Error,
            format!(
                "{} duplicated dates, {} extra rows",
                duplicates.len(),
                total_duplicate_records
            ),
        )
        .with_details(json!({
            "duplicate_dates": sample,
            "total_duplicate_records": total_duplicate_records,
        }))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DailyBar;

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.register_instrument("005930", Some("Samsung Electronics"), Some("KOSPI"))
            .unwrap();
        db
    }

    fn bar(date: &str, close: i64, volume: i64) -> DailyBar {
        DailyBar {
            date: date.to_string(),
            open: Some(close),
            high: Some(close),
            low: Some(close),
            close: Some(close),
            volume: Some(volume),
            turnover: Some(close * volume),
            prev_day_diff: 0,
            change_rate: 0,
        }
    }

    fn results_of(db: &Database, code: &str) -> Vec<ValidationResult> {
        DataQualityValidator::new(db).validate(code)
    }

    #[test]
    fn test_missing_table_short_circuits() {
        let db = setup_db();
        let results = results_of(&db, "005930");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].check, CheckType::TableExists);
        assert_eq!(results[0].severity, Severity::Error);
    }

    #[test]
    fn test_empty_table_warns_and_tolerates_remaining_checks() {
        let db = setup_db();
        db.create_bar_table("005930").unwrap();
        db.mark_table_created("005930").unwrap();

        let results = results_of(&db, "005930");

        let data_count: Vec<_> = results
            .iter()
            .filter(|r| r.check == CheckType::DataCount)
            .collect();
        assert_eq!(data_count.len(), 1);
        assert_eq!(data_count[0].severity, Severity::Warning);

        // Empty-table runs of the data checks produce no failures
        assert!(results
            .iter()
            .all(|r| r.severity != Severity::Error));
        assert!(!results
            .iter()
            .any(|r| r.check == CheckType::MissingTradingDays));
    }

    #[test]
    fn test_clean_data_passes_every_check() {
        let db = setup_db();
        for (date, close) in [("20250102", 55000), ("20250103", 55500), ("20250106", 56000)] {
            db.upsert_bar("005930", &bar(date, close, 1000)).unwrap();
        }

        let results = results_of(&db, "005930");
        assert!(results.iter().all(|r| r.severity == Severity::Pass));

        let checks: Vec<_> = results.iter().map(|r| r.check).collect();
        assert!(checks.contains(&CheckType::DataCount));
        assert!(checks.contains(&CheckType::MissingTradingDays));
        assert!(checks.contains(&CheckType::PriceQuality));
        assert!(checks.contains(&CheckType::VolumeQuality));
        assert!(checks.contains(&CheckType::DuplicateDates));
    }

    #[test]
    fn test_missing_trading_day_reported() {
        let db = setup_db();
        // 20250103 is a Friday trading day with no bar
        db.upsert_bar("005930", &bar("20250102", 55000, 1000)).unwrap();
        db.upsert_bar("005930", &bar("20250106", 56000, 1000)).unwrap();

        let results = results_of(&db, "005930");
        let missing = results
            .iter()
            .find(|r| r.check == CheckType::MissingTradingDays)
            .unwrap();

        assert_eq!(missing.severity, Severity::Warning);
        let details = missing.details.as_ref().unwrap();
        assert_eq!(details["missing_count"], 1);
        assert!(details["missing_dates"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("20250103")));
        assert_eq!(details["date_range"], "20250102 ~ 20250106");
    }

    #[test]
    fn test_many_missing_days_escalate_to_error() {
        let db = setup_db();
        // Two bars spanning a month leave far more than five gaps
        db.upsert_bar("005930", &bar("20250102", 55000, 1000)).unwrap();
        db.upsert_bar("005930", &bar("20250213", 56000, 1000)).unwrap();

        let results = results_of(&db, "005930");
        let missing = results
            .iter()
            .find(|r| r.check == CheckType::MissingTradingDays)
            .unwrap();
        assert_eq!(missing.severity, Severity::Error);
    }

    #[test]
    fn test_price_anomaly_is_warning_only() {
        let db = setup_db();
        for (date, close) in [
            ("20250102", 50000),
            ("20250103", 51000),
            ("20250106", 50500),
            ("20250107", 50200),
            // Way above three times the mean
            ("20250108", 500000),
        ] {
            db.upsert_bar("005930", &bar(date, close, 1000)).unwrap();
        }

        let results = results_of(&db, "005930");
        let anomalies = results
            .iter()
            .find(|r| r.check == CheckType::PriceAnomalies)
            .unwrap();
        assert_eq!(anomalies.severity, Severity::Warning);
        assert!(!results.iter().any(|r| r.check == CheckType::ZeroPrice));
    }

    #[test]
    fn test_zero_price_is_error() {
        let db = setup_db();
        db.upsert_bar("005930", &bar("20250102", 55000, 1000)).unwrap();
        let mut zero = bar("20250103", 0, 1000);
        zero.close = Some(0);
        db.upsert_bar("005930", &zero).unwrap();

        let results = results_of(&db, "005930");
        let zero_price = results
            .iter()
            .find(|r| r.check == CheckType::ZeroPrice)
            .unwrap();
        assert_eq!(zero_price.severity, Severity::Error);
        assert_eq!(zero_price.details.as_ref().unwrap()["zero_count"], 1);
    }

    #[test]
    fn test_null_fields_reported_as_warnings() {
        let db = setup_db();
        let mut nulled = bar("20250102", 55000, 1000);
        nulled.high = None;
        db.upsert_bar("005930", &nulled).unwrap();

        let results = results_of(&db, "005930");
        let null_data = results
            .iter()
            .find(|r| r.check == CheckType::NullData)
            .unwrap();
        assert_eq!(null_data.severity, Severity::Warning);
        assert_eq!(null_data.details.as_ref().unwrap()["field"], "high");
    }

    #[test]
    fn test_high_zero_volume_ratio_is_error() {
        let db = setup_db();
        // 18 of 20 rows with zero volume: 90% ratio
        let days = TradingCalendar::default().trading_days_between(
            chrono::NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2025, 3, 28).unwrap(),
        );
        assert_eq!(days.len(), 20);
        for (i, day) in days.iter().enumerate() {
            let volume = if i < 2 { 1000 } else { 0 };
            db.upsert_bar("005930", &bar(&format_ymd(*day), 55000, volume))
                .unwrap();
        }

        let results = results_of(&db, "005930");
        let volume = results
            .iter()
            .find(|r| r.check == CheckType::ZeroVolume)
            .unwrap();
        assert_eq!(volume.severity, Severity::Error);
        let details = volume.details.as_ref().unwrap();
        assert_eq!(details["zero_count"], 18);
        assert!((details["zero_ratio"].as_f64().unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_zero_volume_ratio_is_warning() {
        let db = setup_db();
        let days = TradingCalendar::default().trading_days_between(
            chrono::NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2025, 3, 28).unwrap(),
        );
        for (i, day) in days.iter().enumerate() {
            let volume = if i == 0 { 0 } else { 1000 };
            db.upsert_bar("005930", &bar(&format_ymd(*day), 55000, volume))
                .unwrap();
        }

        let results = results_of(&db, "005930");
        let volume = results
            .iter()
            .find(|r| r.check == CheckType::ZeroVolume)
            .unwrap();
        // 1 of 20 rows: 5%, below the 10% error threshold
        assert_eq!(volume.severity, Severity::Warning);
    }

    #[test]
    fn test_duplicate_dates_detected() {
        let db = setup_db();
        db.create_bar_table("005930").unwrap();
        db.upsert_bar("005930", &bar("20250103", 55000, 1000)).unwrap();
        // Insert a duplicate behind the upsert path's back
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO daily_bars_005930 (date, close, volume) VALUES ('20250102', 55000, 100)",
                [],
            )?;
            conn.execute(
                "INSERT INTO daily_bars_005930 (date, close, volume) VALUES ('20250102', 55100, 200)",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let results = results_of(&db, "005930");
        let dupes = results
            .iter()
            .find(|r| r.check == CheckType::DuplicateDates)
            .unwrap();
        assert_eq!(dupes.severity, Severity::Error);
        let details = dupes.details.as_ref().unwrap();
        assert_eq!(details["total_duplicate_records"], 1);
        assert_eq!(details["duplicate_dates"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_validate_all_covers_active_instruments() {
        let db = setup_db();
        db.register_instrument("000660", Some("SK hynix"), Some("KOSPI"))
            .unwrap();
        db.upsert_bar("005930", &bar("20250102", 55000, 1000)).unwrap();
        // 000660 has no table: contributes a single TABLE_EXISTS error

        let all = DataQualityValidator::new(&db).validate_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["000660"].len(), 1);
        assert_eq!(all["000660"][0].check, CheckType::TableExists);
        assert!(all["005930"].len() > 1);
    }

    #[test]
    fn test_validate_all_empty_registry() {
        let db = Database::open_in_memory().unwrap();
        let all = DataQualityValidator::new(&db).validate_all();
        assert!(all.is_empty());
    }
}
