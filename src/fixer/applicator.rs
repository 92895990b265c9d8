use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::db::fixes::NewFixRecord;
use crate::db::models::{Diagnostic, FixKind, Status, StoredFix};
use crate::db::Database;

use super::locks::{hold, PathLocks};
use super::resolver::ResolvedFix;

/// Safety switches for one application
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    pub dry_run: bool,
    pub create_backup: bool,
    /// Treat a failed backup as a failed fix instead of a warning
    pub strict_backup: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            create_backup: true,
            strict_backup: false,
        }
    }
}

/// Result of one application attempt
#[derive(Debug, Clone, Default)]
pub struct FixOutcome {
    pub success: bool,
    pub dry_run: bool,
    /// New file content, returned for display on dry runs
    pub projected: Option<String>,
    pub backup_path: Option<PathBuf>,
    /// Set when a backup failed under non-strict mode
    pub backup_warning: Option<String>,
    pub failure_reason: Option<String>,
    /// Store id the ephemeral fix was promoted to, when applicable
    pub promoted_fix_id: Option<i64>,
}

impl FixOutcome {
    fn failed(dry_run: bool, reason: impl Into<String>) -> Self {
        Self {
            dry_run,
            failure_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Apply one resolved fix to its target file under the per-file lock.
///
/// Dry runs never touch the disk but still record history. Real runs back
/// up first, write, mark the diagnostic fixed, promote ephemeral fixes,
/// and refresh the fix's success rate. Every failure is captured in
/// history and leaves the diagnostic retryable; only store errors
/// propagate as `Err`.
pub fn apply_fix(
    db: &Database,
    locks: &PathLocks,
    root: &Path,
    diagnostic: &Diagnostic,
    fix: &ResolvedFix,
    options: &ApplyOptions,
) -> Result<FixOutcome> {
    let path = root.join(&diagnostic.file);
    let lock = locks.acquire(&path);
    let _guard = hold(&lock);

    if !path.is_file() {
        let outcome = FixOutcome::failed(options.dry_run, format!("FileNotFound: {}", diagnostic.file));
        record(db, diagnostic, fix, &outcome, "", "")?;
        return Ok(outcome);
    }

    let original = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            let outcome = FixOutcome::failed(options.dry_run, format!("read failed: {err}"));
            record(db, diagnostic, fix, &outcome, "", "")?;
            return Ok(outcome);
        }
    };

    let rewritten = match rewrite(&original, diagnostic, fix) {
        Ok(r) => r,
        Err(reason) => {
            let outcome = FixOutcome::failed(options.dry_run, reason);
            record(db, diagnostic, fix, &outcome, "", "")?;
            return Ok(outcome);
        }
    };

    if options.dry_run {
        let outcome = FixOutcome {
            success: true,
            dry_run: true,
            projected: Some(rewritten.content.clone()),
            ..FixOutcome::default()
        };
        record(db, diagnostic, fix, &outcome, &rewritten.before, &rewritten.after)?;
        return Ok(outcome);
    }

    let mut backup_path = None;
    let mut backup_warning = None;
    if options.create_backup {
        match write_backup(db, &path, &diagnostic.file) {
            Ok(p) => backup_path = Some(p),
            Err(err) if options.strict_backup => {
                let outcome = FixOutcome::failed(false, format!("backup failed: {err}"));
                record(db, diagnostic, fix, &outcome, "", "")?;
                return Ok(outcome);
            }
            Err(err) => backup_warning = Some(format!("backup failed: {err}")),
        }
    }

    if let Err(err) = std::fs::write(&path, &rewritten.content) {
        let outcome = FixOutcome::failed(false, format!("write failed: {err}"));
        record(db, diagnostic, fix, &outcome, &rewritten.before, &rewritten.after)?;
        return Ok(outcome);
    }

    // Mutation landed: promote, mark fixed, record, refresh stats.
    let promoted_fix_id = persisted_fix_id(db, diagnostic, fix)?;
    db.set_diagnostic_status(diagnostic.id, Status::Fixed)?;

    let outcome = FixOutcome {
        success: true,
        dry_run: false,
        backup_path,
        backup_warning,
        promoted_fix_id,
        ..FixOutcome::default()
    };
    record(db, diagnostic, fix, &outcome, &rewritten.before, &rewritten.after)?;

    if let Some(fix_id) = promoted_fix_id {
        db.recompute_success_rate(fix_id)?;
    }

    Ok(outcome)
}

struct Rewritten {
    content: String,
    before: String,
    after: String,
}

/// Compute the mutated file content, or a failure reason.
///
/// Destructive single-line operations verify the current line against the
/// context captured at scan time so a stale line number can never clobber
/// unrelated code.
fn rewrite(original: &str, diagnostic: &Diagnostic, fix: &ResolvedFix) -> Result<Rewritten, String> {
    let had_trailing_newline = original.ends_with('\n');
    let mut lines: Vec<String> = original.lines().map(|l| l.to_string()).collect();
    let index = (diagnostic.line - 1).max(0) as usize;

    let assemble = |lines: Vec<String>, before: String, after: String| {
        let mut content = lines.join("\n");
        if had_trailing_newline {
            content.push('\n');
        }
        Rewritten { content, before, after }
    };

    match fix.kind() {
        FixKind::ReplaceLine => {
            let current = lines
                .get(index)
                .ok_or_else(|| format!("line {} out of range", diagnostic.line))?
                .clone();
            verify_line(&current, diagnostic, fix)?;
            lines[index] = fix.content().to_string();
            Ok(assemble(lines, current, fix.content().to_string()))
        }
        FixKind::ReplaceBlock => {
            if let Some(anchor) = fix.anchor().filter(|a| !a.trim().is_empty()) {
                if let Some(found) = find_block(&lines, anchor, index) {
                    let before = lines[found.start..found.end].join("\n");
                    lines.splice(
                        found.start..found.end,
                        fix.content().lines().map(|l| l.to_string()),
                    );
                    return Ok(assemble(lines, before, fix.content().to_string()));
                }
            }
            // Window not found verbatim (stale offsets from earlier edits);
            // fall back to a verified single-line replacement.
            let current = lines
                .get(index)
                .ok_or_else(|| format!("line {} out of range", diagnostic.line))?
                .clone();
            verify_context(&current, diagnostic)?;
            lines[index] = fix.content().to_string();
            Ok(assemble(lines, current, fix.content().to_string()))
        }
        FixKind::InsertLine => {
            if index > lines.len() {
                return Err(format!("line {} out of range", diagnostic.line));
            }
            lines.splice(index..index, fix.content().lines().map(|l| l.to_string()));
            Ok(assemble(lines, String::new(), fix.content().to_string()))
        }
        FixKind::DeleteLine => {
            let current = lines
                .get(index)
                .ok_or_else(|| format!("line {} out of range", diagnostic.line))?
                .clone();
            verify_line(&current, diagnostic, fix)?;
            lines.remove(index);
            Ok(assemble(lines, current, String::new()))
        }
    }
}

/// The current line must match the scan-time context or the fix's anchor
/// before a destructive edit
fn verify_line(current: &str, diagnostic: &Diagnostic, fix: &ResolvedFix) -> Result<(), String> {
    let anchor = fix.anchor().filter(|a| !a.trim().is_empty());
    let context = diagnostic.context_line.as_deref();
    if anchor.is_none() && context.is_none() {
        return Ok(());
    }
    if anchor == Some(current) || context == Some(current) {
        return Ok(());
    }
    let expected = context.or(anchor).unwrap_or_default();
    Err(format!(
        "line content changed since scan (expected {expected:?}, found {current:?})"
    ))
}

fn verify_context(current: &str, diagnostic: &Diagnostic) -> Result<(), String> {
    match diagnostic.context_line.as_deref() {
        None => Ok(()),
        Some(expected) if current == expected => Ok(()),
        Some(expected) => Err(format!(
            "line content changed since scan (expected {expected:?}, found {current:?})"
        )),
    }
}

struct BlockMatch {
    start: usize,
    end: usize,
}

/// Find the anchor block's occurrence nearest the diagnostic's line
fn find_block(lines: &[String], anchor: &str, near: usize) -> Option<BlockMatch> {
    let anchor_lines: Vec<&str> = anchor.lines().collect();
    if anchor_lines.is_empty() || anchor_lines.len() > lines.len() {
        return None;
    }

    let mut best: Option<BlockMatch> = None;
    let mut best_distance = usize::MAX;
    for start in 0..=(lines.len() - anchor_lines.len()) {
        let matches = anchor_lines
            .iter()
            .enumerate()
            .all(|(offset, expected)| lines[start + offset] == *expected);
        if matches {
            let distance = start.abs_diff(near);
            if distance < best_distance {
                best_distance = distance;
                best = Some(BlockMatch {
                    start,
                    end: start + anchor_lines.len(),
                });
            }
        }
    }
    best
}

/// Copy the file into the backup directory with a UTC timestamp so a crash
/// between backup and write never loses the original
fn write_backup(db: &Database, path: &Path, relative: &str) -> Result<PathBuf> {
    let backup_dir = db.backup_dir();
    std::fs::create_dir_all(&backup_dir).context("Failed to create backup directory")?;

    let flattened = relative.replace(['/', '\\'], "__");
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
    let backup_path = backup_dir.join(format!("{flattened}.{stamp}.bak"));
    std::fs::copy(path, &backup_path)
        .with_context(|| format!("Failed to copy {} to backup", path.display()))?;
    Ok(backup_path)
}

/// The fix id to record history against: the stored fix itself, or the
/// promotion of an ephemeral fix on its first success
fn persisted_fix_id(
    db: &Database,
    diagnostic: &Diagnostic,
    fix: &ResolvedFix,
) -> Result<Option<i64>> {
    match fix {
        ResolvedFix::Persisted(StoredFix { id, .. }) => Ok(Some(*id)),
        ResolvedFix::Ephemeral(ephemeral) => {
            let id = db.insert_fix(
                diagnostic.pattern_id,
                &ephemeral.title,
                &ephemeral.description,
                ephemeral.kind,
                &ephemeral.content,
                ephemeral.anchor.as_deref(),
                (ephemeral.confidence * 10.0) as i64,
            )?;
            Ok(Some(id))
        }
    }
}

fn record(
    db: &Database,
    diagnostic: &Diagnostic,
    fix: &ResolvedFix,
    outcome: &FixOutcome,
    before: &str,
    after: &str,
) -> Result<()> {
    let fix_id = match fix {
        ResolvedFix::Persisted(stored) => Some(stored.id),
        ResolvedFix::Ephemeral(_) => outcome.promoted_fix_id,
    };
    db.record_fix_attempt(&NewFixRecord {
        diagnostic_id: diagnostic.id,
        fix_id,
        method: fix.method(),
        success: outcome.success,
        dry_run: outcome.dry_run,
        before_snippet: before.to_string(),
        after_snippet: after.to_string(),
        failure_reason: outcome.failure_reason.clone(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::diagnostics::NewDiagnostic;
    use crate::db::models::{Category, FixMethod, Severity};
    use crate::fixer::resolver::EphemeralFix;

    fn seed_diag(db: &Database, file: &str, line: i64, context: Option<&str>) -> Diagnostic {
        let new = NewDiagnostic {
            file: file.to_string(),
            line,
            col: 1,
            code: "assignment".to_string(),
            message: "Incompatible types in assignment".to_string(),
            category: Category::TypeMismatch,
            severity: Severity::High,
            hash: blake3::hash(format!("{file}:{line}").as_bytes()).to_hex().to_string(),
            context_line: context.map(|s| s.to_string()),
        };
        let id = db.reconcile_diagnostic(&new).unwrap().id();
        db.get_diagnostic(id).unwrap().unwrap()
    }

    fn replace_line_fix(content: &str, anchor: Option<&str>) -> ResolvedFix {
        ResolvedFix::Ephemeral(EphemeralFix {
            title: "test".to_string(),
            description: String::new(),
            kind: FixKind::ReplaceLine,
            content: content.to_string(),
            anchor: anchor.map(|s| s.to_string()),
            confidence: 0.5,
            method: FixMethod::Automatic,
        })
    }

    fn setup() -> (Database, tempfile::TempDir, PathLocks) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        (db, dir, PathLocks::new())
    }

    #[test]
    fn dry_run_never_touches_the_file_but_records_history() {
        let (db, dir, locks) = setup();
        std::fs::write(dir.path().join("a.py"), "x: int = \"oops\"\n").unwrap();
        let diag = seed_diag(&db, "a.py", 1, Some("x: int = \"oops\""));
        let fix = replace_line_fix("x: int = 0", Some("x: int = \"oops\""));

        let outcome = apply_fix(
            &db,
            &locks,
            dir.path(),
            &diag,
            &fix,
            &ApplyOptions { dry_run: true, ..Default::default() },
        )
        .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.projected.as_deref(), Some("x: int = 0\n"));
        // Disk untouched, status untouched, history appended.
        let on_disk = std::fs::read_to_string(dir.path().join("a.py")).unwrap();
        assert_eq!(on_disk, "x: int = \"oops\"\n");
        let diag = db.get_diagnostic(diag.id).unwrap().unwrap();
        assert_eq!(diag.status, Status::Detected);
        let history = db.history_for_diagnostic(diag.id).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].dry_run);
    }

    #[test]
    fn successful_fix_backs_up_marks_fixed_and_promotes() {
        let (db, dir, locks) = setup();
        let original = "import os\nx: int = \"oops\"\n";
        std::fs::write(dir.path().join("a.py"), original).unwrap();
        let diag = seed_diag(&db, "a.py", 2, Some("x: int = \"oops\""));
        let fix = replace_line_fix("x: int = 0", None);

        let outcome =
            apply_fix(&db, &locks, dir.path(), &diag, &fix, &ApplyOptions::default()).unwrap();

        assert!(outcome.success);
        let on_disk = std::fs::read_to_string(dir.path().join("a.py")).unwrap();
        assert_eq!(on_disk, "import os\nx: int = 0\n");

        // Backup holds the pre-mutation content.
        let backup = outcome.backup_path.expect("backup written");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), original);

        let diag = db.get_diagnostic(diag.id).unwrap().unwrap();
        assert_eq!(diag.status, Status::Fixed);

        // Ephemeral fix promoted, success rate reflects the one success.
        let fix_id = outcome.promoted_fix_id.expect("promoted");
        let stored = db.get_fix(fix_id).unwrap().unwrap();
        assert!((stored.success_rate - 1.0).abs() < 1e-9);

        let history = db.history_for_diagnostic(diag.id).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(history[0].fix_id, Some(fix_id));
    }

    #[test]
    fn stale_line_content_fails_instead_of_guessing() {
        let (db, dir, locks) = setup();
        std::fs::write(dir.path().join("a.py"), "y = 2\nz = 3\n").unwrap();
        // Context recorded at scan time no longer matches line 1.
        let diag = seed_diag(&db, "a.py", 1, Some("x = 1"));
        let fix = replace_line_fix("x = 0", None);

        let outcome =
            apply_fix(&db, &locks, dir.path(), &diag, &fix, &ApplyOptions::default()).unwrap();

        assert!(!outcome.success);
        assert!(outcome
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("changed since scan"));
        // File untouched, diagnostic retryable.
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "y = 2\nz = 3\n"
        );
        let diag = db.get_diagnostic(diag.id).unwrap().unwrap();
        assert_eq!(diag.status, Status::Detected);
        let history = db.history_for_diagnostic(diag.id).unwrap();
        assert!(!history[0].success);
    }

    #[test]
    fn missing_file_records_failure() {
        let (db, dir, locks) = setup();
        let diag = seed_diag(&db, "gone.py", 1, None);
        let fix = replace_line_fix("x = 0", None);

        let outcome =
            apply_fix(&db, &locks, dir.path(), &diag, &fix, &ApplyOptions::default()).unwrap();

        assert!(!outcome.success);
        assert!(outcome.failure_reason.as_deref().unwrap().contains("FileNotFound"));
        assert_eq!(db.history_for_diagnostic(diag.id).unwrap().len(), 1);
    }

    #[test]
    fn block_replacement_falls_back_to_verified_single_line() {
        let (db, dir, locks) = setup();
        std::fs::write(dir.path().join("a.py"), "a = 1\nb = 2\nc = 3\n").unwrap();
        let diag = seed_diag(&db, "a.py", 2, Some("b = 2"));
        // Anchor block does not exist verbatim; line 2 still matches.
        let fix = ResolvedFix::Ephemeral(EphemeralFix {
            title: "block".to_string(),
            description: String::new(),
            kind: FixKind::ReplaceBlock,
            content: "b = 20".to_string(),
            anchor: Some("a = 1\nb = TWO\nc = 3".to_string()),
            confidence: 0.5,
            method: FixMethod::Automatic,
        });

        let outcome =
            apply_fix(&db, &locks, dir.path(), &diag, &fix, &ApplyOptions::default()).unwrap();

        assert!(outcome.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "a = 1\nb = 20\nc = 3\n"
        );
    }

    #[test]
    fn block_replacement_substitutes_matching_window() {
        let (db, dir, locks) = setup();
        std::fs::write(dir.path().join("a.py"), "def f():\n    return 1\n\nx = f()\n").unwrap();
        let diag = seed_diag(&db, "a.py", 1, Some("def f():"));
        let fix = ResolvedFix::Ephemeral(EphemeralFix {
            title: "block".to_string(),
            description: String::new(),
            kind: FixKind::ReplaceBlock,
            content: "def f() -> int:\n    return 1".to_string(),
            anchor: Some("def f():\n    return 1".to_string()),
            confidence: 0.5,
            method: FixMethod::Automatic,
        });

        let outcome =
            apply_fix(&db, &locks, dir.path(), &diag, &fix, &ApplyOptions::default()).unwrap();

        assert!(outcome.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "def f() -> int:\n    return 1\n\nx = f()\n"
        );
    }

    #[test]
    fn insert_and_delete_operate_on_exact_lines() {
        let (db, dir, locks) = setup();
        std::fs::write(dir.path().join("a.py"), "import os\nimport os\nprint(os)\n").unwrap();

        // Delete the duplicate import on line 2.
        let diag = seed_diag(&db, "a.py", 2, Some("import os"));
        let delete = ResolvedFix::Ephemeral(EphemeralFix {
            title: "dedupe".to_string(),
            description: String::new(),
            kind: FixKind::DeleteLine,
            content: String::new(),
            anchor: Some("import os".to_string()),
            confidence: 0.5,
            method: FixMethod::Automatic,
        });
        let outcome =
            apply_fix(&db, &locks, dir.path(), &diag, &delete, &ApplyOptions::default()).unwrap();
        assert!(outcome.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "import os\nprint(os)\n"
        );

        // Insert a blank-line separator at line 2.
        let diag2 = seed_diag(&db, "a.py", 2, None);
        let insert = ResolvedFix::Ephemeral(EphemeralFix {
            title: "insert".to_string(),
            description: String::new(),
            kind: FixKind::InsertLine,
            content: "import sys".to_string(),
            anchor: None,
            confidence: 0.5,
            method: FixMethod::Automatic,
        });
        let outcome =
            apply_fix(&db, &locks, dir.path(), &diag2, &insert, &ApplyOptions::default()).unwrap();
        assert!(outcome.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "import os\nimport sys\nprint(os)\n"
        );
    }

    #[test]
    fn out_of_range_line_fails_cleanly() {
        let (db, dir, locks) = setup();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        let diag = seed_diag(&db, "a.py", 99, None);
        let fix = replace_line_fix("x = 0", None);

        let outcome =
            apply_fix(&db, &locks, dir.path(), &diag, &fix, &ApplyOptions::default()).unwrap();
        assert!(!outcome.success);
        assert!(outcome.failure_reason.as_deref().unwrap().contains("out of range"));
    }
}
