use super::*;

pub(super) fn cmd_scan(root: &Path, report_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let db = ensure_initialized(root)?;
    let config = Config::load(root)?;
    let start = Instant::now();

    if !json_mode {
        print!("  Scanning with {}...", config.analyzer.command.cyan());
    }

    let report = crate::analyzer::run_scan(&db, root, &config)?;
    let elapsed = start.elapsed();

    if let Some(path) = report_path {
        crate::report::write_report(path, &report)?;
    }

    if json_mode {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(" {}", "done".green());
        println!(
            "    {} diagnostics ({} new, {} seen before)",
            report.total_diagnostics.to_string().cyan(),
            report.new_diagnostics.to_string().green(),
            report.existing_diagnostics.to_string().dimmed(),
        );
        for (severity, count) in &report.by_severity {
            println!("    {:>10}: {}", severity, count.to_string().cyan());
        }
        if report.malformed_lines > 0 {
            println!(
                "    {} {} malformed analyzer lines skipped",
                "!".yellow(),
                report.malformed_lines
            );
        }
        println!("  {} Completed in {:.1}s\n", "OK".green(), elapsed.as_secs_f64());
    }

    Ok(())
}
