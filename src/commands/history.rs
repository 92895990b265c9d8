use super::*;

pub(super) fn cmd_history(root: &Path, limit: i64, json_mode: bool) -> Result<()> {
    let db = ensure_initialized(root)?;
    let history = db.fix_history(limit)?;

    if json_mode {
        let entries: Vec<_> = history
            .iter()
            .map(|record| {
                json!({
                    "diagnostic_id": record.diagnostic_id,
                    "fix_id": record.fix_id,
                    "method": record.method.as_str(),
                    "applied_at": record.applied_at,
                    "success": record.success,
                    "dry_run": record.dry_run,
                    "failure_reason": record.failure_reason,
                })
            })
            .collect();
        println!(
            "{}",
            json!({
                "command": "history",
                "count": entries.len(),
                "entries": entries,
            })
        );
    } else {
        if history.is_empty() {
            println!("\n  {} No fix attempts recorded yet.\n", "·".dimmed());
            return Ok(());
        }

        println!("\n  {} fix attempts\n", history.len().to_string().cyan().bold());
        for record in &history {
            let mark = if record.success { "OK".green() } else { "FAIL".red() };
            let mode = if record.dry_run { " [dry]".dimmed().to_string() } else { String::new() };
            let reason = record
                .failure_reason
                .as_deref()
                .map(|r| format!(" — {r}"))
                .unwrap_or_default();
            println!(
                "  {} [{}] #{} via {}{}{}",
                record.applied_at.get(..19).unwrap_or(&record.applied_at).dimmed(),
                mark,
                record.diagnostic_id,
                record.method.as_str(),
                mode,
                reason.dimmed(),
            );
        }
        println!();
    }

    Ok(())
}
