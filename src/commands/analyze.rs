use super::*;

pub(super) fn cmd_analyze(
    root: &Path,
    oracle: bool,
    report_path: Option<&Path>,
    json_mode: bool,
) -> Result<()> {
    let db = ensure_initialized(root)?;
    let config = Config::load(root)?;
    let oracle_impl = oracle_from_config(&config, oracle, json_mode);

    if !json_mode {
        print!("  Analyzing stored diagnostics...");
    }

    let report = crate::analyzer::run_analyze(&db, &config, oracle_impl.as_deref())?;

    if let Some(path) = report_path {
        crate::report::write_report(path, &report)?;
    }

    if json_mode {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(" {}", "done".green());
        println!(
            "    {} diagnostics, {} likely-causes edges, {} root causes",
            report.diagnostics_analyzed.to_string().cyan(),
            report.edges.to_string().cyan(),
            report.root_causes.to_string().cyan(),
        );
        println!(
            "    {} clusters, {} patterns linked",
            report.clusters.to_string().cyan(),
            report.patterns_linked.to_string().cyan(),
        );
        if report.oracle_enabled {
            println!(
                "    {} advisory suggestions collected",
                report.advice_collected.to_string().cyan()
            );
        }
        if let Some(note) = &report.oracle_note {
            println!("    {} {}", "!".yellow(), note.dimmed());
        }
        println!("  {} Completed in {}ms\n", "OK".green(), report.duration_ms);
    }

    Ok(())
}
