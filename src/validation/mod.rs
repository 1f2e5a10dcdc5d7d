//! Data quality validation
//!
//! A fixed battery of checks per instrument, producing typed results that
//! the report builder aggregates. Nothing here mutates the store.

pub mod report;
pub mod validator;

pub use validator::DataQualityValidator;

use serde::Serialize;

/// Outcome severity of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Pass,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Pass => "PASS",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies which check produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckType {
    TableExists,
    DataCount,
    NullData,
    BasicCheck,
    MissingTradingDays,
    PriceAnomalies,
    ZeroPrice,
    PriceQuality,
    ZeroVolume,
    VolumeQuality,
    VolumeCheck,
    DuplicateDates,
    DuplicateCheck,
    ValidationError,
}

impl CheckType {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckType::TableExists => "TABLE_EXISTS",
            CheckType::DataCount => "DATA_COUNT",
            CheckType::NullData => "NULL_DATA",
            CheckType::BasicCheck => "BASIC_CHECK",
            CheckType::MissingTradingDays => "MISSING_TRADING_DAYS",
            CheckType::PriceAnomalies => "PRICE_ANOMALIES",
            CheckType::ZeroPrice => "ZERO_PRICE",
            CheckType::PriceQuality => "PRICE_QUALITY",
            CheckType::ZeroVolume => "ZERO_VOLUME",
            CheckType::VolumeQuality => "VOLUME_QUALITY",
            CheckType::VolumeCheck => "VOLUME_CHECK",
            CheckType::DuplicateDates => "DUPLICATE_DATES",
            CheckType::DuplicateCheck => "DUPLICATE_CHECK",
            CheckType::ValidationError => "VALIDATION_ERROR",
        }
    }
}

impl std::fmt::Display for CheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable outcome of one check against one instrument
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub code: String,
    pub check: CheckType,
    pub severity: Severity,
    pub message: String,
    /// Structured payload: counts, sample dates, thresholds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ValidationResult {
    pub fn new(
        code: impl Into<String>,
        check: CheckType,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            check,
            severity,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
