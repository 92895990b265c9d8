use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Command, Stdio};

use crate::config::OracleConfig;

/// One diagnostic handed to the advisory oracle
#[derive(Debug, Clone, Serialize)]
pub struct OracleRequest {
    pub diagnostic_id: i64,
    pub file: String,
    pub line: i64,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_line: Option<String>,
}

/// The oracle's suggestion for one diagnostic
#[derive(Debug, Clone, Deserialize)]
pub struct OracleAdvice {
    pub diagnostic_id: i64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub suggested_fix: String,
    #[serde(default)]
    pub confidence: f64,
}

/// External advisory collaborator. Purely advisory: the pipeline consumes
/// its suggestions but never depends on it for correctness, and every
/// failure degrades to an empty result at the call site.
pub trait AdvisoryOracle {
    fn batch_analyze(&self, requests: &[OracleRequest]) -> Result<Vec<OracleAdvice>>;
}

/// Oracle backed by an external command speaking JSON: a request array on
/// stdin, an advice array on stdout.
pub struct CommandOracle {
    command: String,
    args: Vec<String>,
}

impl CommandOracle {
    /// Build from config; None when no oracle command is configured
    pub fn from_config(config: &OracleConfig) -> Option<Self> {
        config.command.as_ref().map(|command| Self {
            command: command.clone(),
            args: config.args.clone(),
        })
    }
}

impl AdvisoryOracle for CommandOracle {
    fn batch_analyze(&self, requests: &[OracleRequest]) -> Result<Vec<OracleAdvice>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn oracle '{}'", self.command))?;

        let payload = serde_json::to_vec(requests)?;
        child
            .stdin
            .take()
            .context("Oracle stdin unavailable")?
            .write_all(&payload)
            .context("Failed to write oracle request")?;

        let output = child.wait_with_output().context("Oracle did not finish")?;
        if !output.status.success() {
            bail!("Oracle exited with {}", output.status);
        }

        let advice: Vec<OracleAdvice> = serde_json::from_slice(&output.stdout)
            .context("Oracle produced malformed advice JSON")?;
        Ok(advice)
    }
}
