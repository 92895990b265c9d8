use super::*;

pub(super) fn cmd_init(root: &Path, json_mode: bool) -> Result<()> {
    if !json_mode {
        println!("\n  {} {}\n", "remedy".cyan().bold(), "— diagnostic remediation");
    }

    let already = Database::exists(root);
    let db = Database::open(root)?;
    drop(db);

    let config_path = root.join(crate::db::STORE_DIR).join("config.json");
    let wrote_config = if config_path.exists() {
        false
    } else {
        Config::default().save(root)?;
        true
    };

    // Keep the store out of version control.
    let gitignore_path = root.join(".gitignore");
    let mut updated_gitignore = false;
    if gitignore_path.exists() {
        let content = std::fs::read_to_string(&gitignore_path).unwrap_or_default();
        if !content.contains(".remedy") {
            let mut new_content = content;
            if !new_content.ends_with('\n') {
                new_content.push('\n');
            }
            new_content.push_str("\n# remedy diagnostic store\n.remedy/\n");
            std::fs::write(&gitignore_path, new_content)?;
            updated_gitignore = true;
        }
    }

    if json_mode {
        println!(
            "{}",
            json!({
                "command": "init",
                "already_initialized": already,
                "wrote_config": wrote_config,
                "updated_gitignore": updated_gitignore,
            })
        );
    } else if already {
        println!("  {} Already initialized\n", "OK".green());
    } else {
        println!("  {} Created {}", "OK".green(), ".remedy/remedy.db".dimmed());
        if wrote_config {
            println!("  {} Wrote default {}", "OK".green(), ".remedy/config.json".dimmed());
        }
        if updated_gitignore {
            println!("  {} Added .remedy/ to .gitignore", "OK".green());
        }
        println!(
            "\n  Next: {} then {}\n",
            "remedy scan".cyan(),
            "remedy run".cyan()
        );
    }

    Ok(())
}
