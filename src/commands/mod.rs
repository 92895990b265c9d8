use anyhow::Result;
use colored::*;
use serde_json::json;
use std::path::Path;
use std::time::Instant;

use crate::cli::Commands;
use crate::config::Config;
use crate::db::Database;
use crate::fixer::FixOptions;
use crate::oracle::{AdvisoryOracle, CommandOracle};

mod analyze;
mod fix;
mod history;
mod ignore;
mod init;
mod run;
mod scan;
mod status;

pub fn run(command: Commands, root: &Path, json_mode: bool) -> Result<()> {
    match command {
        Commands::Init => init::cmd_init(root, json_mode)?,
        Commands::Scan { report } => scan::cmd_scan(root, report.as_deref(), json_mode)?,
        Commands::Analyze { oracle, report } => {
            analyze::cmd_analyze(root, oracle, report.as_deref(), json_mode)?
        }
        Commands::Fix {
            dry_run,
            max_errors,
            no_backup,
            strict_backup,
            report,
        } => fix::cmd_fix(
            root,
            dry_run,
            max_errors,
            no_backup,
            strict_backup,
            report.as_deref(),
            json_mode,
        )?,
        Commands::Run {
            dry_run,
            max_errors,
            no_backup,
            strict_backup,
            oracle,
            report,
        } => run::cmd_run(
            root,
            dry_run,
            max_errors,
            no_backup,
            strict_backup,
            oracle,
            report.as_deref(),
            json_mode,
        )?,
        Commands::Status => status::cmd_status(root, json_mode)?,
        Commands::History { limit } => history::cmd_history(root, limit, json_mode)?,
        Commands::Ignore { id } => ignore::cmd_ignore(root, id, json_mode)?,
    }

    Ok(())
}

fn ensure_initialized(root: &Path) -> Result<Database> {
    if !Database::exists(root) {
        anyhow::bail!(
            "remedy is not initialized in this project.\nRun {} first.",
            "remedy init".cyan()
        );
    }
    Database::open(root)
}

/// Fold CLI flags over the configured fix defaults
fn fix_options(
    config: &Config,
    dry_run: bool,
    max_errors: Option<usize>,
    no_backup: bool,
    strict_backup: bool,
) -> FixOptions {
    FixOptions {
        dry_run,
        max_per_run: max_errors.unwrap_or(config.fix.max_per_run),
        failure_window: config.fix.failure_window,
        create_backup: !no_backup && config.fix.create_backup,
        strict_backup: strict_backup || config.fix.strict_backup,
    }
}

/// The configured oracle, when requested. A --oracle flag without a
/// configured command degrades to None with a warning.
fn oracle_from_config(
    config: &Config,
    requested: bool,
    json_mode: bool,
) -> Option<Box<dyn AdvisoryOracle>> {
    if !requested {
        return None;
    }
    match CommandOracle::from_config(&config.oracle) {
        Some(oracle) => Some(Box::new(oracle)),
        None => {
            if !json_mode {
                println!(
                    "  {} --oracle requested but no oracle command is configured",
                    "!".yellow()
                );
            }
            None
        }
    }
}
