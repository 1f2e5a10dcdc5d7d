//! Instrument registry
//!
//! Source of truth for which instruments exist, plus cached per-instrument
//! collection statistics. The cached stats are an eventually-consistent
//! read model: they change only through [`update_stats`], which must be
//! called after every mutation of the instrument's bar table.

use crate::db::bars;
use crate::db::models::{CollectionStatus, Instrument};
use crate::error::{AppError, Result};
use rusqlite::{params, Connection, Row};

fn map_instrument(row: &Row) -> rusqlite::Result<Instrument> {
    Ok(Instrument {
        code: row.get(0)?,
        name: row.get(1)?,
        market: row.get(2)?,
        table_created: row.get(3)?,
        data_count: row.get(4)?,
        first_date: row.get(5)?,
        latest_date: row.get(6)?,
        is_active: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

const INSTRUMENT_COLUMNS: &str = "code, name, market, table_created, data_count, \
                                  first_date, latest_date, is_active, created_at, updated_at";

/// Register an instrument, or refresh its display attributes
///
/// Idempotent upsert: the first call inserts the row with `is_active`
/// set; later calls update name/market and the update timestamp, leaving
/// existing values intact when the argument is absent.
pub fn register(
    conn: &Connection,
    code: &str,
    name: Option<&str>,
    market: Option<&str>,
) -> Result<()> {
    bars::validate_code(code)?;

    conn.execute(
        r#"
        INSERT INTO instruments (code, name, market)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(code) DO UPDATE SET
            name = COALESCE(excluded.name, instruments.name),
            market = COALESCE(excluded.market, instruments.market),
            updated_at = datetime('now')
        "#,
        params![code, name, market],
    )?;

    tracing::debug!("Registered instrument {}", code);
    Ok(())
}

/// Look up a single instrument
pub fn get(conn: &Connection, code: &str) -> Result<Option<Instrument>> {
    let result = conn.query_row(
        &format!("SELECT {INSTRUMENT_COLUMNS} FROM instruments WHERE code = ?1"),
        params![code],
        map_instrument,
    );

    match result {
        Ok(instrument) => Ok(Some(instrument)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Record that the instrument's bar table has been provisioned
///
/// Fails with `NotFound` for an unknown instrument.
pub fn mark_table_created(conn: &Connection, code: &str) -> Result<()> {
    let rows = conn.execute(
        "UPDATE instruments
         SET table_created = 1, updated_at = datetime('now')
         WHERE code = ?1",
        params![code],
    )?;

    if rows == 0 {
        return Err(AppError::NotFound(format!("instrument {} not registered", code)));
    }
    Ok(())
}

/// Recompute cached stats from the instrument's physical bar table
///
/// Reads row count and first/latest dates directly from the bar table and
/// writes them back to the registry row. This is the only path that keeps
/// the cached stats in sync with physical data.
pub fn update_stats(conn: &Connection, code: &str) -> Result<()> {
    if !bars::table_exists(conn, code)? {
        return Err(AppError::NotFound(format!(
            "bar table for instrument {} does not exist",
            code
        )));
    }

    let count = bars::bar_count(conn, code)?;
    let range = bars::date_range(conn, code)?;
    let (first_date, latest_date) = match range {
        Some((first, last)) => (Some(first), Some(last)),
        None => (None, None),
    };

    let rows = conn.execute(
        "UPDATE instruments
         SET data_count = ?1, first_date = ?2, latest_date = ?3,
             updated_at = datetime('now')
         WHERE code = ?4",
        params![count, first_date, latest_date, code],
    )?;

    if rows == 0 {
        return Err(AppError::NotFound(format!("instrument {} not registered", code)));
    }

    tracing::debug!("Updated stats for {}: {} rows", code, count);
    Ok(())
}

/// All active instruments with their cached stats, ordered by code
pub fn list_active(conn: &Connection) -> Result<Vec<Instrument>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INSTRUMENT_COLUMNS} FROM instruments WHERE is_active = 1 ORDER BY code"
    ))?;

    let instruments = stmt
        .query_map([], map_instrument)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(instruments)
}

/// Deactivate an instrument
///
/// Instruments are never hard-deleted; deactivation removes them from the
/// active set while keeping metadata and bar data in place.
pub fn deactivate(conn: &Connection, code: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE instruments
         SET is_active = 0, updated_at = datetime('now')
         WHERE code = ?1",
        params![code],
    )?;

    if rows > 0 {
        tracing::info!("Deactivated instrument {}", code);
    }
    Ok(rows > 0)
}

/// Aggregate collection progress over active instruments
pub fn collection_status(conn: &Connection) -> Result<CollectionStatus> {
    let (total, created, records): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN table_created = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(data_count), 0)
         FROM instruments
         WHERE is_active = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let completion_rate = if total > 0 {
        created as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    Ok(CollectionStatus {
        total_instruments: total,
        created_tables: created,
        total_records: records,
        completion_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;
    use crate::db::models::DailyBar;

    fn create_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrations::run_migrations(&conn).unwrap();
        conn
    }

    fn bar(date: &str) -> DailyBar {
        DailyBar {
            date: date.to_string(),
            open: Some(54900),
            high: Some(55400),
            low: Some(54700),
            close: Some(55000),
            volume: Some(1000),
            turnover: Some(55_000_000),
            prev_day_diff: 0,
            change_rate: 0,
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let conn = create_test_conn();
        register(&conn, "005930", Some("Samsung Electronics"), Some("KOSPI")).unwrap();
        register(&conn, "005930", Some("Samsung Electronics"), Some("KOSPI")).unwrap();

        let all = list_active(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name.as_deref(), Some("Samsung Electronics"));
        assert!(all[0].is_active);
    }

    #[test]
    fn test_register_partial_keeps_existing_values() {
        let conn = create_test_conn();
        register(&conn, "005930", Some("Samsung Electronics"), Some("KOSPI")).unwrap();
        // Re-registration with no attributes must not clear them
        register(&conn, "005930", None, None).unwrap();

        let instrument = get(&conn, "005930").unwrap().unwrap();
        assert_eq!(instrument.name.as_deref(), Some("Samsung Electronics"));
        assert_eq!(instrument.market.as_deref(), Some("KOSPI"));
    }

    #[test]
    fn test_register_updates_name_later() {
        let conn = create_test_conn();
        register(&conn, "005930", None, None).unwrap();
        register(&conn, "005930", Some("Samsung Electronics"), None).unwrap();

        let instrument = get(&conn, "005930").unwrap().unwrap();
        assert_eq!(instrument.name.as_deref(), Some("Samsung Electronics"));
    }

    #[test]
    fn test_mark_table_created_unknown_code() {
        let conn = create_test_conn();
        let result = mark_table_created(&conn, "999999");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_update_stats_round_trip() {
        let conn = create_test_conn();
        register(&conn, "005930", Some("Samsung Electronics"), Some("KOSPI")).unwrap();
        bars::create_table(&conn, "005930").unwrap();
        mark_table_created(&conn, "005930").unwrap();

        for date in ["20250102", "20250103", "20250106"] {
            bars::upsert_bar(&conn, "005930", &bar(date)).unwrap();
        }
        update_stats(&conn, "005930").unwrap();

        let instrument = get(&conn, "005930").unwrap().unwrap();
        assert!(instrument.table_created);
        assert_eq!(instrument.data_count, 3);
        assert_eq!(instrument.first_date.as_deref(), Some("20250102"));
        assert_eq!(instrument.latest_date.as_deref(), Some("20250106"));
    }

    #[test]
    fn test_update_stats_requires_bar_table() {
        let conn = create_test_conn();
        register(&conn, "005930", None, None).unwrap();
        let result = update_stats(&conn, "005930");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_list_active_excludes_deactivated() {
        let conn = create_test_conn();
        register(&conn, "005930", None, None).unwrap();
        register(&conn, "000660", None, None).unwrap();
        assert!(deactivate(&conn, "000660").unwrap());

        let all = list_active(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].code, "005930");
    }

    #[test]
    fn test_collection_status_empty_registry() {
        let conn = create_test_conn();
        let status = collection_status(&conn).unwrap();
        assert_eq!(status.total_instruments, 0);
        assert_eq!(status.completion_rate, 0.0);
    }

    #[test]
    fn test_collection_status_counts() {
        let conn = create_test_conn();
        register(&conn, "005930", None, None).unwrap();
        register(&conn, "000660", None, None).unwrap();
        bars::create_table(&conn, "005930").unwrap();
        mark_table_created(&conn, "005930").unwrap();
        bars::upsert_bar(&conn, "005930", &bar("20250102")).unwrap();
        update_stats(&conn, "005930").unwrap();

        let status = collection_status(&conn).unwrap();
        assert_eq!(status.total_instruments, 2);
        assert_eq!(status.created_tables, 1);
        assert_eq!(status.total_records, 1);
        assert!((status.completion_rate - 50.0).abs() < f64::EPSILON);
    }
}
