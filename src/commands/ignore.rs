use super::*;

pub(super) fn cmd_ignore(root: &Path, id: i64, json_mode: bool) -> Result<()> {
    let db = ensure_initialized(root)?;

    match crate::fixer::ignore_diagnostic(&db, id)? {
        Some(diag) => {
            if json_mode {
                println!(
                    "{}",
                    json!({
                        "command": "ignore",
                        "id": diag.id,
                        "status": diag.status.as_str(),
                        "file": diag.file,
                        "line": diag.line,
                    })
                );
            } else {
                println!(
                    "\n  {} #{} ({}:{}) marked {}\n",
                    "OK".green().bold(),
                    diag.id,
                    diag.file,
                    diag.line,
                    diag.status.as_str().yellow(),
                );
            }
        }
        None => {
            if json_mode {
                println!(
                    "{}",
                    json!({
                        "command": "ignore",
                        "error": format!("No diagnostic with id {id}"),
                    })
                );
            } else {
                println!("\n  {} No diagnostic with id {}\n", "!".yellow(), id);
            }
        }
    }

    Ok(())
}
