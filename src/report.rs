use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Summary of one scan phase
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub total_diagnostics: u64,
    pub new_diagnostics: u64,
    pub existing_diagnostics: u64,
    pub malformed_lines: u64,
    pub by_severity: Vec<(String, u64)>,
    pub by_category: Vec<(String, u64)>,
    pub by_file: Vec<(String, u64)>,
    pub duration_ms: u64,
}

/// Summary of one analyze phase
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyzeReport {
    pub diagnostics_analyzed: u64,
    pub edges: u64,
    pub root_causes: u64,
    pub clusters: u64,
    pub patterns_linked: u64,
    pub oracle_enabled: bool,
    pub advice_collected: u64,
    /// Present when the oracle degraded (spawn failure, bad output)
    pub oracle_note: Option<String>,
    pub duration_ms: u64,
}

/// One fix attempt as it appears in the phase report
#[derive(Debug, Clone, Serialize)]
pub struct FixAttemptSummary {
    pub diagnostic_id: i64,
    pub file: String,
    pub line: i64,
    pub method: String,
    pub success: bool,
    pub failure_reason: Option<String>,
}

/// How the fix phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixPhaseStatus {
    /// Worked through everything it was allowed to
    Completed,
    /// Stopped by the consecutive-failure circuit breaker; partial
    /// progress, distinct from a fatal abort
    CircuitBroken,
    /// Stopped by the cooperative cancellation signal
    Cancelled,
}

impl Default for FixPhaseStatus {
    fn default() -> Self {
        Self::Completed
    }
}

/// Summary of one fix phase
#[derive(Debug, Clone, Default, Serialize)]
pub struct FixReport {
    pub status: FixPhaseStatus,
    pub dry_run: bool,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Diagnostics skipped because their file was already mutated this run
    pub skipped_stale: u64,
    /// Diagnostics with no applicable fix candidate
    pub skipped_no_fix: u64,
    pub attempts: Vec<FixAttemptSummary>,
    pub duration_ms: u64,
}

/// Combined report for the full pipeline (`remedy run`)
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scan: ScanReport,
    pub analyze: AnalyzeReport,
    pub fix: FixReport,
}

/// Write any phase report as pretty JSON at the requested path
pub fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(report)?;
    std::fs::write(path, raw).with_context(|| format!("Failed to write report {}", path.display()))?;
    Ok(())
}
