//! Runtime configuration
//!
//! Resolved from environment variables with development-friendly defaults.

use crate::error::{AppError, Result};
use std::path::PathBuf;

/// Runtime configuration for the collector and validator
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// Directory where validation reports are written
    pub reports_dir: PathBuf,
}

impl Config {
    /// Build configuration from the environment
    ///
    /// `KRX_DB_PATH` overrides the database location (default
    /// `./data/stock_data.db`), `KRX_REPORTS_DIR` overrides the report
    /// output directory (default `./reports`).
    pub fn from_env() -> Self {
        let db_path = std::env::var("KRX_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/stock_data.db"));

        let reports_dir = std::env::var("KRX_REPORTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./reports"));

        Self {
            db_path,
            reports_dir,
        }
    }

    /// Ensure the database parent directory exists
    pub fn ensure_data_dir(&self) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Config(format!(
                        "failed to create data directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
                tracing::info!("Created data directory: {}", parent.display());
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
