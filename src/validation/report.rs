//! Validation report builder
//!
//! Turns the per-instrument result map into a deterministic plain-text
//! report: global severity tally, per-instrument sections with errors
//! first, then fixed remediation guidance.

use super::{Severity, ValidationResult};
use crate::error::Result;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const HEAVY_RULE: &str =
    "================================================================================";
const LIGHT_RULE: &str =
    "--------------------------------------------------------------------------------";

/// Builds plain-text validation reports
///
/// Display names are optional; instruments without one are labelled
/// `unknown`.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    names: BTreeMap<String, String>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach instrument display names for section headers
    pub fn with_names(mut self, names: BTreeMap<String, String>) -> Self {
        self.names = names;
        self
    }

    /// Build the report stamped with the current local time
    pub fn build(&self, results: &BTreeMap<String, Vec<ValidationResult>>) -> String {
        self.build_at(results, chrono::Local::now().naive_local())
    }

    /// Build the report with an explicit timestamp
    ///
    /// Byte-stable for a fixed timestamp and input map.
    pub fn build_at(
        &self,
        results: &BTreeMap<String, Vec<ValidationResult>>,
        generated_at: NaiveDateTime,
    ) -> String {
        if results.is_empty() {
            return "No validation results.".to_string();
        }

        let mut lines = Vec::new();
        lines.push(HEAVY_RULE.to_string());
        lines.push("Data Quality Validation Report".to_string());
        lines.push(HEAVY_RULE.to_string());
        lines.push(format!(
            "Generated at: {}",
            generated_at.format("%Y-%m-%d %H:%M:%S")
        ));
        lines.push(format!("Instruments validated: {}", results.len()));
        lines.push(String::new());

        let (total_pass, total_warnings, total_errors) = tally(results);

        lines.push("Summary:".to_string());
        lines.push(format!("   PASS: {}", total_pass));
        lines.push(format!("   WARNING: {}", total_warnings));
        lines.push(format!("   ERROR: {}", total_errors));
        lines.push(String::new());

        lines.push("Per-instrument results:".to_string());
        lines.push(LIGHT_RULE.to_string());

        for (code, instrument_results) in results {
            let name = self
                .names
                .get(code)
                .map(String::as_str)
                .unwrap_or("unknown");

            let errors: Vec<_> = instrument_results
                .iter()
                .filter(|r| r.severity == Severity::Error)
                .collect();
            let warnings: Vec<_> = instrument_results
                .iter()
                .filter(|r| r.severity == Severity::Warning)
                .collect();

            let tag = if !errors.is_empty() {
                "[ERROR]"
            } else if !warnings.is_empty() {
                "[WARN]"
            } else {
                "[OK]"
            };

            lines.push(format!("{} {} ({})", tag, code, name));

            for result in &errors {
                lines.push(format!("   ERROR {}: {}", result.check, result.message));
            }
            for result in &warnings {
                lines.push(format!("   WARNING {}: {}", result.check, result.message));
            }
            if errors.is_empty() && warnings.is_empty() {
                let pass_count = instrument_results
                    .iter()
                    .filter(|r| r.severity == Severity::Pass)
                    .count();
                lines.push(format!("   All checks passed ({} checks)", pass_count));
            }

            lines.push(String::new());
        }

        if total_errors > 0 || total_warnings > 0 {
            lines.push("Recommended actions:".to_string());
            lines.push(LIGHT_RULE.to_string());

            if total_errors > 0 {
                lines.push("Errors:".to_string());
                lines.push("   - Duplicate dates: run the cleanup routine, then refresh stats".to_string());
                lines.push("   - Zero or NULL prices: re-collect the affected dates".to_string());
                lines.push("   - Missing trading days: re-request the gap from the broker feed".to_string());
                lines.push(String::new());
            }

            if total_warnings > 0 {
                lines.push("Warnings:".to_string());
                lines.push("   - Zero volume: check for trading halts or holiday sessions".to_string());
                lines.push("   - Price anomalies: check for splits, mergers, or other corporate actions".to_string());
                lines.push(String::new());
            }
        }

        lines.push(HEAVY_RULE.to_string());

        lines.join("\n")
    }

    /// Build the report and write it to `reports_dir`
    ///
    /// The file is named `data_quality_report_<YYYYMMDD>.txt`; the
    /// directory is created on demand. Returns the written path.
    pub fn write_to_dir(
        &self,
        results: &BTreeMap<String, Vec<ValidationResult>>,
        reports_dir: &Path,
    ) -> Result<PathBuf> {
        let now = chrono::Local::now().naive_local();
        let report = self.build_at(results, now);

        std::fs::create_dir_all(reports_dir)?;
        let path = reports_dir.join(format!(
            "data_quality_report_{}.txt",
            now.format("%Y%m%d")
        ));
        std::fs::write(&path, &report)?;

        tracing::info!("Wrote validation report to {}", path.display());
        Ok(path)
    }
}

/// Global (pass, warning, error) counts across all results
fn tally(results: &BTreeMap<String, Vec<ValidationResult>>) -> (usize, usize, usize) {
    let mut pass = 0;
    let mut warnings = 0;
    let mut errors = 0;
    for instrument_results in results.values() {
        for result in instrument_results {
            match result.severity {
                Severity::Pass => pass += 1,
                Severity::Warning => warnings += 1,
                Severity::Error => errors += 1,
            }
        }
    }
    (pass, warnings, errors)
}
