use super::*;

pub(super) fn cmd_status(root: &Path, json_mode: bool) -> Result<()> {
    let db = ensure_initialized(root)?;

    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());

    let total = db.count_diagnostics()?;
    let by_status = db.count_by_status()?;
    let by_severity = db.count_by_severity()?;
    let by_category = db.count_by_category()?;
    let by_file = db.count_by_file()?;
    let patterns = db.count_patterns()?;
    let fixes = db.count_fixes()?;
    let clusters = db.count_clusters()?;
    let edges = db.count_edges()?;
    let recent_rate = db.recent_success_rate(20)?;

    if json_mode {
        let to_map = |pairs: &[(String, i64)]| -> serde_json::Map<String, serde_json::Value> {
            pairs.iter().map(|(k, v)| (k.clone(), json!(v))).collect()
        };
        let files: Vec<_> = by_file
            .iter()
            .take(10)
            .map(|(path, count)| json!({"file": path, "diagnostics": count}))
            .collect();

        println!(
            "{}",
            json!({
                "command": "status",
                "project": project_name,
                "diagnostics_total": total,
                "by_status": to_map(&by_status),
                "by_severity": to_map(&by_severity),
                "by_category": to_map(&by_category),
                "hot_files": files,
                "patterns": patterns,
                "fixes": fixes,
                "clusters": clusters,
                "edges": edges,
                "recent_success_rate": recent_rate,
            })
        );
    } else {
        println!("\n  {} {} {}\n", "remedy".cyan().bold(), "—".dimmed(), project_name.white().bold());
        println!("  {} diagnostics recorded", total.to_string().cyan().bold());

        if !by_status.is_empty() {
            println!("\n  {}", "Status:".white().bold());
            for (status, count) in &by_status {
                println!("    {:>14}: {}", status, count.to_string().cyan());
            }
        }

        if !by_severity.is_empty() {
            println!("\n  {}", "Severity (live):".white().bold());
            for (severity, count) in &by_severity {
                println!("    {:>14}: {}", severity, count.to_string().cyan());
            }
        }

        if !by_category.is_empty() {
            println!("\n  {}", "Category (live):".white().bold());
            for (category, count) in &by_category {
                println!("    {:>14}: {}", category, count.to_string().cyan());
            }
        }

        if !by_file.is_empty() {
            println!("\n  {}", "Hot files:".white().bold());
            for (path, count) in by_file.iter().take(5) {
                println!("    {} {}", count.to_string().yellow(), path);
            }
        }

        println!("\n  {}", "Knowledge:".white().bold());
        println!("    {:>14}: {}", "patterns", patterns.to_string().cyan());
        println!("    {:>14}: {}", "fixes", fixes.to_string().cyan());
        println!("    {:>14}: {}", "clusters", clusters.to_string().cyan());
        println!("    {:>14}: {}", "edges", edges.to_string().cyan());
        if let Some(rate) = recent_rate {
            println!("    {:>14}: {:.0}%", "recent success", rate * 100.0);
        }
        println!();
    }

    Ok(())
}
