//! Per-instrument daily bar storage
//!
//! Each instrument gets its own physical table named `daily_bars_<code>`,
//! provisioned on demand. Instrument codes flow into table names, so they
//! are strictly validated before any SQL is built from them: short ASCII
//! alphanumerics only. Date uniqueness is enforced by the upsert path
//! (update-else-insert) rather than a constraint, so the validator can
//! detect duplicates introduced by out-of-band writes.

use crate::error::{AppError, Result};
use crate::db::models::{DailyBar, PriceStats};
use rusqlite::{params, Connection};

/// Prefix shared by all per-instrument bar tables
pub const TABLE_PREFIX: &str = "daily_bars_";

/// Maximum accepted instrument code length
const MAX_CODE_LEN: usize = 12;

/// Validate an instrument code for use in identifiers
///
/// Codes are short ASCII alphanumerics (KRX codes are 6 digits; ETF/ETN
/// codes may carry letters). Anything else is rejected up front.
pub fn validate_code(code: &str) -> Result<()> {
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return Err(AppError::Validation(format!(
            "invalid instrument code '{}': must be 1-{} characters",
            code, MAX_CODE_LEN
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::Validation(format!(
            "invalid instrument code '{}': only ASCII alphanumerics allowed",
            code
        )));
    }
    Ok(())
}

/// Physical table name for an instrument's bars
pub fn table_name(code: &str) -> Result<String> {
    validate_code(code)?;
    Ok(format!("{}{}", TABLE_PREFIX, code))
}

/// Whether the instrument's bar table exists
pub fn table_exists(conn: &Connection, code: &str) -> Result<bool> {
    let table = table_name(code)?;
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Provision the instrument's bar table
///
/// Idempotent: succeeds without touching data if the table already exists.
pub fn create_table(conn: &Connection, code: &str) -> Result<()> {
    let table = table_name(code)?;
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            open INTEGER,
            high INTEGER,
            low INTEGER,
            close INTEGER,
            volume INTEGER,
            turnover INTEGER,
            prev_day_diff INTEGER NOT NULL DEFAULT 0,
            change_rate INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS "idx_{table}_date" ON "{table}"(date);
        "#
    ))?;
    tracing::debug!("Ensured bar table {}", table);
    Ok(())
}

/// Drop the instrument's bar table
///
/// Does not touch the registry row; callers reconcile `table_created`
/// themselves.
pub fn drop_table(conn: &Connection, code: &str) -> Result<()> {
    let table = table_name(code)?;
    conn.execute_batch(&format!(r#"DROP TABLE IF EXISTS "{table}""#))?;
    tracing::info!("Dropped bar table {}", table);
    Ok(())
}

/// Insert or overwrite the bar for its date
///
/// Re-collection may resend already-seen dates, so an existing row is
/// overwritten (all measured fields plus the ingestion timestamp) instead
/// of erroring. Provisions the table on first write.
pub fn upsert_bar(conn: &Connection, code: &str, bar: &DailyBar) -> Result<()> {
    if !table_exists(conn, code)? {
        create_table(conn, code)?;
    }
    let table = table_name(code)?;

    let updated = conn.execute(
        &format!(
            r#"
            UPDATE "{table}"
            SET open = ?1, high = ?2, low = ?3, close = ?4, volume = ?5,
                turnover = ?6, prev_day_diff = ?7, change_rate = ?8,
                created_at = datetime('now')
            WHERE date = ?9
            "#
        ),
        params![
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
            bar.turnover,
            bar.prev_day_diff,
            bar.change_rate,
            bar.date,
        ],
    )?;

    if updated == 0 {
        conn.execute(
            &format!(
                r#"
                INSERT INTO "{table}" (date, open, high, low, close, volume,
                                       turnover, prev_day_diff, change_rate)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#
            ),
            params![
                bar.date,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume,
                bar.turnover,
                bar.prev_day_diff,
                bar.change_rate,
            ],
        )?;
    }

    Ok(())
}

/// Total row count
pub fn bar_count(conn: &Connection, code: &str) -> Result<i64> {
    let table = table_name(code)?;
    let count: i64 = conn.query_row(&format!(r#"SELECT COUNT(*) FROM "{table}""#), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

/// Count of distinct dates present
pub fn distinct_date_count(conn: &Connection, code: &str) -> Result<i64> {
    let table = table_name(code)?;
    let count: i64 = conn.query_row(
        &format!(r#"SELECT COUNT(DISTINCT date) FROM "{table}""#),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// First and last dates present, or `None` for an empty table
pub fn date_range(conn: &Connection, code: &str) -> Result<Option<(String, String)>> {
    let table = table_name(code)?;
    let range: (Option<String>, Option<String>) = conn.query_row(
        &format!(r#"SELECT MIN(date), MAX(date) FROM "{table}""#),
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    match range {
        (Some(first), Some(last)) => Ok(Some((first, last))),
        _ => Ok(None),
    }
}

/// Latest date present, or `None` for an empty table
pub fn latest_date(conn: &Connection, code: &str) -> Result<Option<String>> {
    let table = table_name(code)?;
    let date: Option<String> = conn.query_row(
        &format!(r#"SELECT MAX(date) FROM "{table}""#),
        [],
        |row| row.get(0),
    )?;
    Ok(date)
}

/// All dates present, ascending, duplicates included
pub fn dates(conn: &Connection, code: &str) -> Result<Vec<String>> {
    let table = table_name(code)?;
    let mut stmt = conn.prepare(&format!(r#"SELECT date FROM "{table}" ORDER BY date"#))?;
    let dates = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(dates)
}

/// Measured bar fields subject to NULL checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl BarField {
    /// All checked fields, in reporting order
    pub const ALL: [BarField; 5] = [
        BarField::Close,
        BarField::Volume,
        BarField::Open,
        BarField::High,
        BarField::Low,
    ];

    /// Column name in the bar table
    pub fn column(self) -> &'static str {
        match self {
            BarField::Open => "open",
            BarField::High => "high",
            BarField::Low => "low",
            BarField::Close => "close",
            BarField::Volume => "volume",
        }
    }
}

/// Count of rows where the given field is NULL
pub fn null_count(conn: &Connection, code: &str, field: BarField) -> Result<i64> {
    let table = table_name(code)?;
    let column = field.column();
    let count: i64 = conn.query_row(
        &format!(r#"SELECT COUNT(*) FROM "{table}" WHERE {column} IS NULL"#),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Close-price statistics over rows with a positive close
///
/// Returns `None` when no such row exists.
pub fn close_price_stats(conn: &Connection, code: &str) -> Result<Option<PriceStats>> {
    let table = table_name(code)?;
    let row: (Option<f64>, Option<i64>, Option<i64>, i64) = conn.query_row(
        &format!(
            r#"
            SELECT AVG(close), MIN(close), MAX(close), COUNT(*)
            FROM "{table}"
            WHERE close IS NOT NULL AND close > 0
            "#
        ),
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    match row {
        (Some(avg), Some(min), Some(max), count) if count > 0 => Ok(Some(PriceStats {
            avg,
            min,
            max,
            count,
        })),
        _ => Ok(None),
    }
}

/// Rows whose close falls outside `[low, high]`, most recent first
pub fn price_outliers(
    conn: &Connection,
    code: &str,
    low: f64,
    high: f64,
    limit: usize,
) -> Result<Vec<(String, i64)>> {
    let table = table_name(code)?;
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT date, close
        FROM "{table}"
        WHERE close < ?1 OR close > ?2
        ORDER BY date DESC
        LIMIT ?3
        "#
    ))?;
    let rows = stmt
        .query_map(params![low, high, limit as i64], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Count of rows with a zero or NULL close
pub fn zero_close_count(conn: &Connection, code: &str) -> Result<i64> {
    let table = table_name(code)?;
    let count: i64 = conn.query_row(
        &format!(r#"SELECT COUNT(*) FROM "{table}" WHERE close = 0 OR close IS NULL"#),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Count of rows with a zero or NULL volume
pub fn zero_volume_count(conn: &Connection, code: &str) -> Result<i64> {
    let table = table_name(code)?;
    let count: i64 = conn.query_row(
        &format!(r#"SELECT COUNT(*) FROM "{table}" WHERE volume = 0 OR volume IS NULL"#),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Average volume over rows with positive volume, 0 when there are none
pub fn average_volume(conn: &Connection, code: &str) -> Result<f64> {
    let table = table_name(code)?;
    let avg: Option<f64> = conn.query_row(
        &format!(r#"SELECT AVG(volume) FROM "{table}" WHERE volume > 0"#),
        [],
        |row| row.get(0),
    )?;
    Ok(avg.unwrap_or(0.0))
}

/// Dates appearing more than once, most recent first, with their row counts
pub fn duplicate_dates(conn: &Connection, code: &str) -> Result<Vec<(String, i64)>> {
    let table = table_name(code)?;
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT date, COUNT(*) AS count
        FROM "{table}"
        GROUP BY date
        HAVING COUNT(*) > 1
        ORDER BY date DESC
        "#
    ))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// All existing bar tables (for the status command)
pub fn list_bar_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name LIKE ?1
         ORDER BY name",
    )?;
    let tables = stmt
        .query_map(params![format!("{}%", TABLE_PREFIX)], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(tables)
}
