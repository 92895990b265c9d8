use super::*;
use crate::pipeline::CancelToken;
use crate::report::{FixPhaseStatus, FixReport};

#[allow(clippy::too_many_arguments)]
pub(super) fn cmd_fix(
    root: &Path,
    dry_run: bool,
    max_errors: Option<usize>,
    no_backup: bool,
    strict_backup: bool,
    report_path: Option<&Path>,
    json_mode: bool,
) -> Result<()> {
    let db = ensure_initialized(root)?;
    let config = Config::load(root)?;
    let options = fix_options(&config, dry_run, max_errors, no_backup, strict_backup);

    if !json_mode {
        let mode = if dry_run { " (dry run)" } else { "" };
        print!("  Applying fixes{mode}...");
    }

    let report = crate::fixer::run_fix_phase(&db, root, &options, &CancelToken::new())?;

    if let Some(path) = report_path {
        crate::report::write_report(path, &report)?;
    }

    if json_mode {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(" {}", "done".green());
        render_fix_report(&report);
    }

    Ok(())
}

pub(super) fn render_fix_report(report: &FixReport) {
    println!(
        "    {} attempted: {} fixed, {} failed",
        report.attempted.to_string().cyan(),
        report.succeeded.to_string().green(),
        report.failed.to_string().red(),
    );
    if report.skipped_stale > 0 {
        println!(
            "    {} skipped (file already mutated this run — rescan to retry)",
            report.skipped_stale.to_string().yellow()
        );
    }
    if report.skipped_no_fix > 0 {
        println!(
            "    {} skipped (no fix candidate)",
            report.skipped_no_fix.to_string().dimmed()
        );
    }

    for attempt in &report.attempts {
        let mark = if attempt.success { "OK".green() } else { "FAIL".red() };
        let reason = attempt
            .failure_reason
            .as_deref()
            .map(|r| format!(" — {r}"))
            .unwrap_or_default();
        println!(
            "    [{}] #{} {}:{} via {}{}",
            mark,
            attempt.diagnostic_id,
            attempt.file,
            attempt.line,
            attempt.method.dimmed(),
            reason.dimmed(),
        );
    }

    match report.status {
        FixPhaseStatus::Completed => {
            println!("  {} Fix phase completed in {}ms\n", "OK".green(), report.duration_ms);
        }
        FixPhaseStatus::CircuitBroken => {
            println!(
                "  {} Halted early: last {} attempts all failed (partial progress kept)\n",
                "CIRCUIT".yellow().bold(),
                report.failed.min(report.attempted),
            );
        }
        FixPhaseStatus::Cancelled => {
            println!("  {} Cancelled between diagnostics\n", "STOP".yellow());
        }
    }
}
