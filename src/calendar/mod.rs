//! Trading calendar for the Korean stock market
//!
//! Determines trading days (weekends and holidays excluded) and enumerates
//! expected trading days over a date range. Holiday determination is a pure
//! function of the date: a fixed per-year holiday set plus a year-specific
//! override table for lunar-calendar and substitute holidays. Accuracy is
//! only guaranteed from [`EPOCH_YEAR`] forward.

use crate::error::{AppError, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Earliest year with verified holiday data
pub const EPOCH_YEAR: i32 = 2020;

/// Canonical external date format (8-digit YYYYMMDD)
const DATE_FORMAT: &str = "%Y%m%d";

/// Market region served by the calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarketRegion {
    /// Korea Exchange (KOSPI/KOSDAQ)
    #[default]
    Krx,
}

/// Trading day calculator for a market region
#[derive(Debug, Clone, Copy, Default)]
pub struct TradingCalendar {
    region: MarketRegion,
}

impl TradingCalendar {
    /// Create a calendar for the given market region
    pub fn new(region: MarketRegion) -> Self {
        Self { region }
    }

    /// Fixed holidays observed every year
    fn fixed_holidays(year: i32) -> impl Iterator<Item = NaiveDate> {
        // New Year's Day, Independence Movement Day, Children's Day,
        // Memorial Day, Liberation Day, National Foundation Day,
        // Hangul Day, Christmas
        const FIXED: [(u32, u32); 8] = [
            (1, 1),
            (3, 1),
            (5, 5),
            (6, 6),
            (8, 15),
            (10, 3),
            (10, 9),
            (12, 25),
        ];
        FIXED
            .iter()
            .filter_map(move |&(m, d)| NaiveDate::from_ymd_opt(year, m, d))
    }

    /// Year-specific holidays that shift (lunar holidays, substitutes)
    fn holiday_overrides(&self, year: i32) -> &'static [(u32, u32)] {
        match self.region {
            MarketRegion::Krx => match year {
                // Seollal holidays plus Children's Day and National
                // Foundation Day substitutes
                2025 => &[(1, 28), (1, 29), (1, 30), (5, 6), (10, 6)],
                _ => &[],
            },
        }
    }

    /// All holidays for a year
    pub fn holidays(&self, year: i32) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = Self::fixed_holidays(year).collect();
        days.extend(
            self.holiday_overrides(year)
                .iter()
                .filter_map(|&(m, d)| NaiveDate::from_ymd_opt(year, m, d)),
        );
        days.sort();
        days
    }

    /// Whether the market is open on the given date
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        !self.holidays(date.year()).contains(&date)
    }

    /// All trading days in `[start, end]`, sorted ascending
    ///
    /// Returns an empty list when `start > end`.
    pub fn trading_days_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut current = start;
        while current <= end {
            if self.is_trading_day(current) {
                days.push(current);
            }
            current += Duration::days(1);
        }
        days
    }

    /// Most recent trading day at or before `base`
    ///
    /// Searches back up to two weeks; falls back to the previous calendar
    /// day if no trading day is found in that window.
    pub fn last_trading_day(&self, base: NaiveDate) -> NaiveDate {
        for offset in 0..14 {
            let candidate = base - Duration::days(offset);
            if self.is_trading_day(candidate) {
                return candidate;
            }
        }
        tracing::warn!("No trading day found within 14 days of {}", base);
        base - Duration::days(1)
    }

    /// Closest trading day strictly before `date`
    pub fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut current = date - Duration::days(1);
        for _ in 0..10 {
            if self.is_trading_day(current) {
                return current;
            }
            current -= Duration::days(1);
        }
        date - Duration::days(1)
    }

    /// Closest trading day strictly after `date`
    pub fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut current = date + Duration::days(1);
        for _ in 0..10 {
            if self.is_trading_day(current) {
                return current;
            }
            current += Duration::days(1);
        }
        date + Duration::days(1)
    }

    /// The `count` most recent trading days at or before `base`, newest
    /// first, as YYYYMMDD strings
    ///
    /// The search stops at the epoch year boundary.
    pub fn recent_trading_days(&self, count: usize, base: NaiveDate) -> Vec<String> {
        let Some(floor) = NaiveDate::from_ymd_opt(EPOCH_YEAR, 1, 1) else {
            return Vec::new();
        };
        let mut days = Vec::with_capacity(count);
        let mut current = base;
        while days.len() < count && current >= floor {
            if self.is_trading_day(current) {
                days.push(format_ymd(current));
            }
            current -= Duration::days(1);
        }
        days
    }

    /// Whether the market session (09:00-15:30 KST) is open at the given
    /// local date and time
    pub fn is_market_open_at(&self, date: NaiveDate, time: NaiveTime) -> bool {
        if !self.is_trading_day(date) {
            return false;
        }
        match (
            NaiveTime::from_hms_opt(9, 0, 0),
            NaiveTime::from_hms_opt(15, 30, 0),
        ) {
            (Some(open), Some(close)) => time >= open && time <= close,
            _ => false,
        }
    }

    /// Whether the market session is open right now (KST)
    pub fn is_market_open_now(&self) -> bool {
        let now = chrono::Utc::now().with_timezone(&chrono_tz::Asia::Seoul);
        self.is_market_open_at(now.date_naive(), now.time())
    }
}

/// Format a date in the canonical YYYYMMDD form
pub fn format_ymd(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a canonical YYYYMMDD date string
pub fn parse_ymd(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| AppError::Validation(format!("invalid YYYYMMDD date: '{}'", s)))
}
