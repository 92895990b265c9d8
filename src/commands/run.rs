use super::*;
use crate::pipeline::CancelToken;

#[allow(clippy::too_many_arguments)]
pub(super) fn cmd_run(
    root: &Path,
    dry_run: bool,
    max_errors: Option<usize>,
    no_backup: bool,
    strict_backup: bool,
    oracle: bool,
    report_path: Option<&Path>,
    json_mode: bool,
) -> Result<()> {
    let db = ensure_initialized(root)?;
    let config = Config::load(root)?;
    let options = fix_options(&config, dry_run, max_errors, no_backup, strict_backup);
    let oracle_impl = oracle_from_config(&config, oracle, json_mode);
    let start = Instant::now();

    if !json_mode {
        println!("\n  {} full pipeline\n", "remedy".cyan().bold());
        print!("  Scan + analyze + fix...");
    }

    let report = crate::pipeline::run_all(
        &db,
        root,
        &config,
        &options,
        oracle_impl.as_deref(),
        &CancelToken::new(),
    )?;

    if let Some(path) = report_path {
        crate::report::write_report(path, &report)?;
    }

    if json_mode {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(" {}", "done".green());
        println!(
            "    scan: {} diagnostics ({} new)",
            report.scan.total_diagnostics.to_string().cyan(),
            report.scan.new_diagnostics.to_string().green(),
        );
        println!(
            "    analyze: {} edges, {} root causes, {} clusters",
            report.analyze.edges.to_string().cyan(),
            report.analyze.root_causes.to_string().cyan(),
            report.analyze.clusters.to_string().cyan(),
        );
        super::fix::render_fix_report(&report.fix);
        println!("  {} Pipeline finished in {:.1}s\n", "OK".green(), start.elapsed().as_secs_f64());
    }

    Ok(())
}
