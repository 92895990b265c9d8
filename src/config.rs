use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::db::STORE_DIR;

/// Project-level configuration, stored at `.remedy/config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analyzer: AnalyzerConfig,
    pub oracle: OracleConfig,
    pub fix: FixConfig,
}

/// How to invoke the external static analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Pass the walked source-file list instead of the project root
    pub file_list: bool,
}

/// Optional advisory oracle; disabled when no command is configured
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Maximum diagnostics sent to the oracle per run
    pub quota: usize,
}

/// Fix-phase limits and safety switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixConfig {
    pub max_per_run: usize,
    /// Sliding window inspected by the circuit breaker
    pub failure_window: usize,
    pub create_backup: bool,
    /// Treat a failed backup as a failed fix
    pub strict_backup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            oracle: OracleConfig::default(),
            fix: FixConfig::default(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            command: "mypy".to_string(),
            args: vec![
                "--show-column-numbers".to_string(),
                "--show-error-codes".to_string(),
                "--no-error-summary".to_string(),
            ],
            file_list: false,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            quota: 10,
        }
    }
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            max_per_run: 25,
            failure_window: 5,
            create_backup: true,
            strict_backup: false,
        }
    }
}

impl Config {
    /// Load the project config, falling back to defaults when the file is
    /// absent
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(STORE_DIR).join("config.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed config at {}", path.display()))?;
        Ok(config)
    }

    /// Write the config; `init` uses this to materialize defaults
    pub fn save(&self, project_root: &Path) -> Result<()> {
        let dir = project_root.join(STORE_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("config.json");
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, raw)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
