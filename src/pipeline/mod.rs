use anyhow::Result;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::analyzer;
use crate::config::Config;
use crate::db::Database;
use crate::fixer::{self, FixOptions};
use crate::oracle::AdvisoryOracle;
use crate::report::RunReport;

/// Cooperative cancellation flag, checked between diagnostics and never
/// mid-mutation, so an in-flight write always completes or fails atomically
/// before the run stops.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run the whole pipeline: Scan → Analyze → Fix. Each phase is also an
/// independent entry point via its own subcommand; this chains them over
/// one store so cross-phase state lives only in persisted records.
pub fn run_all(
    db: &Database,
    root: &Path,
    config: &Config,
    fix_options: &FixOptions,
    oracle: Option<&dyn AdvisoryOracle>,
    cancel: &CancelToken,
) -> Result<RunReport> {
    let scan = analyzer::run_scan(db, root, config)?;
    let analyze = analyzer::run_analyze(db, config, oracle)?;
    let fix = fixer::run_fix_phase(db, root, fix_options, cancel)?;
    Ok(RunReport { scan, analyze, fix })
}
