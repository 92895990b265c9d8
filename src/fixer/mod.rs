pub mod applicator;
pub mod locks;
pub mod resolver;

use anyhow::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::time::Instant;

use crate::analyzer::graph::{topological_order, DependencyGraph};
use crate::db::models::{Diagnostic, Status};
use crate::db::Database;
use crate::pipeline::CancelToken;
use crate::report::{FixAttemptSummary, FixPhaseStatus, FixReport};

use applicator::{apply_fix, ApplyOptions};
use locks::PathLocks;
use resolver::find_best_fix;

/// Fix-phase knobs, resolved from config + CLI flags
#[derive(Debug, Clone, Copy)]
pub struct FixOptions {
    pub dry_run: bool,
    pub max_per_run: usize,
    /// Sliding window inspected by the circuit breaker
    pub failure_window: usize,
    pub create_backup: bool,
    pub strict_backup: bool,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_per_run: 25,
            failure_window: 5,
            create_backup: true,
            strict_backup: false,
        }
    }
}

/// Run the fix phase: walk actionable diagnostics in topological order,
/// resolve and apply fixes, and stop early on cancellation, the per-run
/// cap, or a window full of consecutive failures.
pub fn run_fix_phase(
    db: &Database,
    root: &Path,
    options: &FixOptions,
    cancel: &CancelToken,
) -> Result<FixReport> {
    let start = Instant::now();
    let mut report = FixReport {
        dry_run: options.dry_run,
        ..FixReport::default()
    };

    let diagnostics = db.live_diagnostics()?;
    let by_id: HashMap<i64, &Diagnostic> = diagnostics.iter().map(|d| (d.id, d)).collect();
    let order = fix_order(db, &diagnostics)?;

    let locks = PathLocks::new();
    let apply_options = ApplyOptions {
        dry_run: options.dry_run,
        create_backup: options.create_backup,
        strict_backup: options.strict_backup,
    };

    // Files mutated this run: their remaining diagnostics carry stale line
    // numbers and are skipped rather than re-resolved mid-run.
    let mut dirty_files: HashSet<String> = HashSet::new();
    let mut window: VecDeque<bool> = VecDeque::with_capacity(options.failure_window);

    for id in order {
        if cancel.is_cancelled() {
            report.status = FixPhaseStatus::Cancelled;
            break;
        }
        if report.attempted as usize >= options.max_per_run {
            break;
        }

        let diagnostic = match by_id.get(&id) {
            Some(d) => *d,
            None => continue,
        };

        if dirty_files.contains(&diagnostic.file) {
            report.skipped_stale += 1;
            continue;
        }

        let resolved = match find_best_fix(db, diagnostic)? {
            Some(fix) => fix,
            None => {
                report.skipped_no_fix += 1;
                continue;
            }
        };

        report.attempted += 1;
        let outcome = apply_fix(db, &locks, root, diagnostic, &resolved, &apply_options)?;

        report.attempts.push(FixAttemptSummary {
            diagnostic_id: diagnostic.id,
            file: diagnostic.file.clone(),
            line: diagnostic.line,
            method: resolved.method().as_str().to_string(),
            success: outcome.success,
            failure_reason: outcome.failure_reason.clone(),
        });

        if outcome.success {
            report.succeeded += 1;
            if !options.dry_run {
                dirty_files.insert(diagnostic.file.clone());
            }
        } else {
            report.failed += 1;
        }

        if window.len() == options.failure_window {
            window.pop_front();
        }
        window.push_back(outcome.success);

        // All of the last N attempts failed: stop burning quota against a
        // systemic problem.
        if options.failure_window > 0
            && window.len() == options.failure_window
            && window.iter().all(|&ok| !ok)
        {
            report.status = FixPhaseStatus::CircuitBroken;
            break;
        }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    Ok(report)
}

/// Topological order over the persisted graph restricted to live
/// diagnostics. Without an analyze run there are no edges and the order
/// degrades to severity-then-id.
fn fix_order(db: &Database, diagnostics: &[Diagnostic]) -> Result<Vec<i64>> {
    let live_ids: HashSet<i64> = diagnostics.iter().map(|d| d.id).collect();
    let edges = db
        .edges()?
        .into_iter()
        .filter(|e| live_ids.contains(&e.cause_id) && live_ids.contains(&e.effect_id))
        .collect();

    let mut nodes: Vec<i64> = live_ids.iter().copied().collect();
    nodes.sort_unstable();
    let graph = DependencyGraph {
        nodes,
        edges,
        severity_rank: diagnostics
            .iter()
            .map(|d| (d.id, d.severity.rank()))
            .collect(),
    };
    Ok(topological_order(&graph))
}

/// Mark a diagnostic ignored, the operator's terminal escape hatch
pub fn ignore_diagnostic(db: &Database, id: i64) -> Result<Option<Diagnostic>> {
    match db.get_diagnostic(id)? {
        None => Ok(None),
        Some(diag) if diag.is_terminal() => Ok(Some(diag)),
        Some(_) => {
            db.set_diagnostic_status(id, Status::Ignored)?;
            Ok(db.get_diagnostic(id)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::diagnostics::NewDiagnostic;
    use crate::db::models::{Category, DependencyEdge, FixKind, Severity};

    fn seed(db: &Database, file: &str, line: i64, context: Option<&str>) -> i64 {
        let new = NewDiagnostic {
            file: file.to_string(),
            line,
            col: 1,
            code: "assignment".to_string(),
            message: format!("Incompatible types at {file}:{line}"),
            category: Category::TypeMismatch,
            severity: Severity::High,
            hash: blake3::hash(format!("{file}:{line}").as_bytes()).to_hex().to_string(),
            context_line: context.map(|s| s.to_string()),
        };
        db.reconcile_diagnostic(&new).unwrap().id()
    }

    /// Give every seeded diagnostic a pattern fix so the resolver always
    /// returns a candidate
    fn attach_fix(db: &Database, diag_id: i64, content: &str) {
        let pattern_id = db.upsert_pattern("assignment", "Incompatible types at _").unwrap();
        db.set_diagnostic_pattern(diag_id, pattern_id).unwrap();
        if db.fixes_for_pattern(pattern_id).unwrap().is_empty() {
            db.insert_fix(
                Some(pattern_id),
                "rewrite",
                "",
                FixKind::ReplaceLine,
                content,
                None,
                5,
            )
            .unwrap();
        }
    }

    #[test]
    fn circuit_breaker_halts_after_exactly_n_failures() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();

        // Seven diagnostics against files that do not exist: every apply
        // fails with FileNotFound.
        for i in 0..7 {
            let id = seed(&db, &format!("missing{i}.py"), 1, None);
            attach_fix(&db, id, "x = 0");
        }

        let options = FixOptions {
            failure_window: 3,
            ..FixOptions::default()
        };
        let report = run_fix_phase(&db, dir.path(), &options, &CancelToken::new()).unwrap();

        assert_eq!(report.status, FixPhaseStatus::CircuitBroken);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed, 3);
    }

    #[test]
    fn max_per_run_caps_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();

        for i in 0..5 {
            let file = format!("f{i}.py");
            std::fs::write(dir.path().join(&file), "x = 1\n").unwrap();
            let id = seed(&db, &file, 1, Some("x = 1"));
            attach_fix(&db, id, "x = 0");
        }

        let options = FixOptions {
            max_per_run: 2,
            ..FixOptions::default()
        };
        let report = run_fix_phase(&db, dir.path(), &options, &CancelToken::new()).unwrap();

        assert_eq!(report.status, FixPhaseStatus::Completed);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
    }

    #[test]
    fn mutated_files_skip_their_remaining_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("app.py"), "x = 1\ny = 2\n").unwrap();

        let first = seed(&db, "app.py", 1, Some("x = 1"));
        let second = seed(&db, "app.py", 2, Some("y = 2"));
        attach_fix(&db, first, "x = 0");
        attach_fix(&db, second, "x = 0");

        let report =
            run_fix_phase(&db, dir.path(), &FixOptions::default(), &CancelToken::new()).unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped_stale, 1);

        // The skipped diagnostic is still actionable next run.
        let diag = db.get_diagnostic(second).unwrap().unwrap();
        assert!(!diag.is_terminal());
    }

    #[test]
    fn dry_run_attempts_every_diagnostic_without_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("app.py"), "x = 1\ny = 2\n").unwrap();

        let first = seed(&db, "app.py", 1, Some("x = 1"));
        let second = seed(&db, "app.py", 2, Some("y = 2"));
        attach_fix(&db, first, "x = 0");
        attach_fix(&db, second, "x = 0");

        let options = FixOptions {
            dry_run: true,
            ..FixOptions::default()
        };
        let report = run_fix_phase(&db, dir.path(), &options, &CancelToken::new()).unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.skipped_stale, 0);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.py")).unwrap(),
            "x = 1\ny = 2\n"
        );
    }

    #[test]
    fn fixes_follow_the_persisted_topological_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "y = 2\n").unwrap();

        let downstream = seed(&db, "a.py", 1, Some("x = 1"));
        let root_cause = seed(&db, "b.py", 1, Some("y = 2"));
        attach_fix(&db, downstream, "x = 0");
        attach_fix(&db, root_cause, "y = 0");

        // Persisted graph says the later id causes the earlier one.
        db.replace_edges(&[DependencyEdge {
            cause_id: root_cause,
            effect_id: downstream,
            confidence: 0.9,
        }])
        .unwrap();

        let report =
            run_fix_phase(&db, dir.path(), &FixOptions::default(), &CancelToken::new()).unwrap();
        let ids: Vec<i64> = report.attempts.iter().map(|a| a.diagnostic_id).collect();
        assert_eq!(ids, vec![root_cause, downstream]);
    }

    #[test]
    fn cancellation_stops_between_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let id = seed(&db, "a.py", 1, None);
        attach_fix(&db, id, "x = 0");

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = run_fix_phase(&db, dir.path(), &FixOptions::default(), &cancel).unwrap();

        assert_eq!(report.status, FixPhaseStatus::Cancelled);
        assert_eq!(report.attempted, 0);
    }

    #[test]
    fn ignore_marks_terminal_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let id = seed(&db, "a.py", 1, None);

        let diag = ignore_diagnostic(&db, id).unwrap().unwrap();
        assert_eq!(diag.status, Status::Ignored);

        // Idempotent; already-terminal rows are returned untouched.
        let again = ignore_diagnostic(&db, id).unwrap().unwrap();
        assert_eq!(again.status, Status::Ignored);
        assert!(ignore_diagnostic(&db, 9999).unwrap().is_none());
    }
}
