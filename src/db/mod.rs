//! SQLite database module

pub mod models;
mod connection;
mod migrations;
pub mod instruments;
pub mod bars;

use crate::error::Result;
use bars::BarField;
use models::{CollectionStatus, DailyBar, Instrument, PriceStats};
use parking_lot::Mutex;
use std::path::Path;

/// SQLite database wrapper
pub struct Database {
    conn: Mutex<rusqlite::Connection>,
}

impl Database {
    /// Open (or create) the database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = connection::create_connection(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        // Run migrations
        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = connection::create_in_memory_connection()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    // ========== Instrument Registry ==========

    /// Register an instrument, or refresh its display attributes
    pub fn register_instrument(
        &self,
        code: &str,
        name: Option<&str>,
        market: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        instruments::register(&conn, code, name, market)
    }

    /// Look up a single instrument
    pub fn instrument(&self, code: &str) -> Result<Option<Instrument>> {
        let conn = self.conn.lock();
        instruments::get(&conn, code)
    }

    /// Record that the instrument's bar table has been provisioned
    pub fn mark_table_created(&self, code: &str) -> Result<()> {
        let conn = self.conn.lock();
        instruments::mark_table_created(&conn, code)
    }

    /// Recompute cached stats from the instrument's bar table
    pub fn update_stats(&self, code: &str) -> Result<()> {
        let conn = self.conn.lock();
        instruments::update_stats(&conn, code)
    }

    /// All active instruments with their cached stats
    pub fn list_active_instruments(&self) -> Result<Vec<Instrument>> {
        let conn = self.conn.lock();
        instruments::list_active(&conn)
    }

    /// Deactivate an instrument
    pub fn deactivate_instrument(&self, code: &str) -> Result<bool> {
        let conn = self.conn.lock();
        instruments::deactivate(&conn, code)
    }

    /// Aggregate collection progress over active instruments
    pub fn collection_status(&self) -> Result<CollectionStatus> {
        let conn = self.conn.lock();
        instruments::collection_status(&conn)
    }

    // ========== Bar Store ==========

    /// Whether the instrument's bar table exists
    pub fn bar_table_exists(&self, code: &str) -> Result<bool> {
        let conn = self.conn.lock();
        bars::table_exists(&conn, code)
    }

    /// Provision the instrument's bar table (idempotent)
    pub fn create_bar_table(&self, code: &str) -> Result<()> {
        let conn = self.conn.lock();
        bars::create_table(&conn, code)
    }

    /// Drop the instrument's bar table
    pub fn drop_bar_table(&self, code: &str) -> Result<()> {
        let conn = self.conn.lock();
        bars::drop_table(&conn, code)
    }

    /// Insert or overwrite the bar for its date
    pub fn upsert_bar(&self, code: &str, bar: &DailyBar) -> Result<()> {
        let conn = self.conn.lock();
        bars::upsert_bar(&conn, code, bar)
    }

    /// Total bar row count
    pub fn bar_count(&self, code: &str) -> Result<i64> {
        let conn = self.conn.lock();
        bars::bar_count(&conn, code)
    }

    /// Count of distinct dates present
    pub fn distinct_date_count(&self, code: &str) -> Result<i64> {
        let conn = self.conn.lock();
        bars::distinct_date_count(&conn, code)
    }

    /// First and last dates present
    pub fn bar_date_range(&self, code: &str) -> Result<Option<(String, String)>> {
        let conn = self.conn.lock();
        bars::date_range(&conn, code)
    }

    /// Latest date present
    pub fn latest_bar_date(&self, code: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        bars::latest_date(&conn, code)
    }

    /// All dates present, ascending
    pub fn bar_dates(&self, code: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        bars::dates(&conn, code)
    }

    /// Count of rows where the given field is NULL
    pub fn null_count(&self, code: &str, field: BarField) -> Result<i64> {
        let conn = self.conn.lock();
        bars::null_count(&conn, code, field)
    }

    /// Close-price statistics over rows with a positive close
    pub fn close_price_stats(&self, code: &str) -> Result<Option<PriceStats>> {
        let conn = self.conn.lock();
        bars::close_price_stats(&conn, code)
    }

    /// Rows whose close falls outside the given band, most recent first
    pub fn price_outliers(
        &self,
        code: &str,
        low: f64,
        high: f64,
        limit: usize,
    ) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock();
        bars::price_outliers(&conn, code, low, high, limit)
    }

    /// Count of rows with a zero or NULL close
    pub fn zero_close_count(&self, code: &str) -> Result<i64> {
        let conn = self.conn.lock();
        bars::zero_close_count(&conn, code)
    }

    /// Count of rows with a zero or NULL volume
    pub fn zero_volume_count(&self, code: &str) -> Result<i64> {
        let conn = self.conn.lock();
        bars::zero_volume_count(&conn, code)
    }

    /// Average volume over rows with positive volume
    pub fn average_volume(&self, code: &str) -> Result<f64> {
        let conn = self.conn.lock();
        bars::average_volume(&conn, code)
    }

    /// Dates appearing more than once with their row counts
    pub fn duplicate_dates(&self, code: &str) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock();
        bars::duplicate_dates(&conn, code)
    }

    /// All existing bar tables
    pub fn list_bar_tables(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        bars::list_bar_tables(&conn)
    }

    /// Run a closure against the raw connection
    ///
    /// Test hook for fixture setup that bypasses the store API.
    #[cfg(test)]
    pub fn with_conn<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}
