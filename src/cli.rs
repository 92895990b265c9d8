use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "remedy",
    version,
    about = "Diagnostic remediation pipeline — scan, order, and fix static-analysis findings",
    long_about = "Scans a project with an external static analyzer, persists diagnostics locally, \
infers which ones cause which, and applies ranked fixes with backups and dry runs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output in JSON format (for machine consumption)
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize remedy in the current project
    Init,

    /// Run the analyzer and reconcile diagnostics into the store
    Scan {
        /// Write the scan summary as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Build the dependency graph and clusters over stored diagnostics
    Analyze {
        /// Consult the configured advisory oracle
        #[arg(long)]
        oracle: bool,

        /// Write the analyze summary as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Apply fixes in root-cause-first order
    Fix {
        /// Project the changes without touching any file
        #[arg(long)]
        dry_run: bool,

        /// Maximum fixes to attempt this run
        #[arg(long)]
        max_errors: Option<usize>,

        /// Skip pre-mutation backups
        #[arg(long)]
        no_backup: bool,

        /// Treat a failed backup as a failed fix
        #[arg(long)]
        strict_backup: bool,

        /// Write the fix summary as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Scan, analyze, and fix in one go
    Run {
        /// Project the changes without touching any file
        #[arg(long)]
        dry_run: bool,

        /// Maximum fixes to attempt this run
        #[arg(long)]
        max_errors: Option<usize>,

        /// Skip pre-mutation backups
        #[arg(long)]
        no_backup: bool,

        /// Treat a failed backup as a failed fix
        #[arg(long)]
        strict_backup: bool,

        /// Consult the configured advisory oracle during analysis
        #[arg(long)]
        oracle: bool,

        /// Write the combined summary as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show store dashboard: statuses, severities, hot files
    Status,

    /// Show recent fix attempts
    History {
        /// Maximum entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Mark a diagnostic ignored (terminal)
    Ignore {
        /// Diagnostic id
        id: i64,
    },
}
