//! Database row models

use serde::{Deserialize, Serialize};

/// Registered instrument with cached collection statistics
///
/// `data_count`, `first_date` and `latest_date` are refreshed only by an
/// explicit stats update, never by bar writes themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub code: String,
    pub name: Option<String>,
    pub market: Option<String>,
    pub table_created: bool,
    pub data_count: i64,
    pub first_date: Option<String>,
    pub latest_date: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One day's OHLCV bar for an instrument
///
/// Dates are canonical 8-digit YYYYMMDD strings. Prices are stored in won
/// as integers; `change_rate` is the percentage change scaled by 100 for
/// two decimal places. Measured fields are nullable because upstream feeds
/// occasionally omit them; the validator reports such rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: String,
    pub open: Option<i64>,
    pub high: Option<i64>,
    pub low: Option<i64>,
    pub close: Option<i64>,
    pub volume: Option<i64>,
    pub turnover: Option<i64>,
    pub prev_day_diff: i64,
    pub change_rate: i64,
}

/// Aggregate collection progress over all active instruments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStatus {
    pub total_instruments: i64,
    pub created_tables: i64,
    pub total_records: i64,
    /// `created_tables / total_instruments * 100`, 0 when nothing is registered
    pub completion_rate: f64,
}

/// Close-price statistics over rows with a positive close
#[derive(Debug, Clone, Copy)]
pub struct PriceStats {
    pub avg: f64,
    pub min: i64,
    pub max: i64,
    pub count: i64,
}
