use anyhow::{bail, Context, Result};
use ignore::WalkBuilder;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Instant;

use crate::config::AnalyzerConfig;
use crate::db::diagnostics::{NewDiagnostic, Reconciled};
use crate::db::models::{Category, Severity};
use crate::db::Database;
use crate::report::ScanReport;

use super::message::content_hash;

/// One diagnostic parsed out of raw analyzer output, not yet reconciled
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDiagnostic {
    pub file: String,
    pub line: i64,
    pub col: i64,
    pub code: String,
    pub message: String,
    pub category: Category,
    pub severity: Severity,
}

fn output_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // file:line[:col]: severity: message [code]; column and code optional
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?:(?P<col>\d+):)?\s*(?P<sev>error|warning|note):\s*(?P<msg>.+?)(?:\s+\[(?P<code>[A-Za-z0-9_-]+)\])?\s*$",
        )
        .unwrap()
    })
}

/// Run the scan phase: invoke the analyzer, normalize its output, and
/// reconcile every diagnostic against the store
pub fn scan(db: &Database, root: &Path, config: &AnalyzerConfig) -> Result<ScanReport> {
    if !root.is_dir() {
        bail!("Project root not found: {}", root.display());
    }

    let start = Instant::now();
    let raw = invoke_analyzer(root, config)?;
    let (parsed, malformed_lines) = parse_output(&raw);
    let report = reconcile(db, root, parsed, malformed_lines)?;

    Ok(ScanReport {
        duration_ms: start.elapsed().as_millis() as u64,
        ..report
    })
}

/// Spawn the external analyzer and capture its stdout. Analyzers exit
/// non-zero when they find problems, so only a failed spawn is fatal.
pub fn invoke_analyzer(root: &Path, config: &AnalyzerConfig) -> Result<String> {
    let mut command = Command::new(&config.command);
    command.current_dir(root).args(&config.args);

    if config.file_list {
        let files = walk_source_files(root);
        if files.is_empty() {
            bail!("No source files found under {}", root.display());
        }
        command.args(files);
    } else {
        command.arg(".");
    }

    let output = command.output().with_context(|| {
        format!(
            "Failed to invoke analyzer '{}' — is it installed?",
            config.command
        )
    })?;

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Source files handed to the analyzer in file-list mode, gitignore-aware
pub fn walk_source_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !matches!(
                name.as_ref(),
                "node_modules"
                    | ".git"
                    | ".remedy"
                    | "target"
                    | "__pycache__"
                    | "dist"
                    | "build"
                    | ".venv"
                    | "venv"
                    | ".tox"
                    | "vendor"
                    | ".cache"
            )
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if matches!(ext, "py" | "pyi" | "ts" | "tsx" | "js" | "jsx") {
            let rel = path.strip_prefix(root).unwrap_or(path);
            files.push(rel.to_path_buf());
        }
    }

    files.sort();
    files
}

/// Parse raw analyzer output. Lines that do not match the diagnostic shape
/// are skipped and counted, never fatal.
pub fn parse_output(raw: &str) -> (Vec<ParsedDiagnostic>, u64) {
    let mut parsed = Vec::new();
    let mut malformed = 0u64;

    for line in raw.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        match parse_line(trimmed) {
            Some(diag) => parsed.push(diag),
            None => malformed += 1,
        }
    }

    (parsed, malformed)
}

fn parse_line(line: &str) -> Option<ParsedDiagnostic> {
    let caps = output_line_re().captures(line)?;

    let file = caps["file"].trim().to_string();
    let line_no: i64 = caps["line"].parse().ok()?;
    let col: i64 = caps
        .name("col")
        .and_then(|c| c.as_str().parse().ok())
        .unwrap_or(1);
    let raw_severity = &caps["sev"];
    let message = caps["msg"].trim().to_string();
    let code = caps
        .name("code")
        .map(|c| c.as_str().to_string())
        .unwrap_or_else(|| "misc".to_string());

    let category = infer_category(&code, &message);
    let severity = infer_severity(raw_severity, category);

    Some(ParsedDiagnostic {
        file,
        line: line_no,
        col,
        code,
        message,
        category,
        severity,
    })
}

fn infer_severity(raw: &str, category: Category) -> Severity {
    // Syntax errors poison everything downstream of them in the file.
    if category == Category::Syntax {
        return Severity::Critical;
    }
    match raw {
        "error" => Severity::High,
        "warning" => Severity::Medium,
        _ => Severity::Low,
    }
}

fn infer_category(code: &str, message: &str) -> Category {
    match code {
        "syntax" => return Category::Syntax,
        "name-defined" | "attr-defined" | "used-before-def" => {
            return Category::UndefinedReference
        }
        "import" | "import-not-found" | "import-untyped" | "no-redef" => {
            return Category::ImportError
        }
        "var-annotated" | "no-untyped-def" | "annotation-unchecked" => {
            return Category::MissingDeclaration
        }
        "assignment" | "arg-type" | "return-value" | "type-arg" | "operator" | "union-attr"
        | "index" | "call-overload" => return Category::TypeMismatch,
        _ => {}
    }

    let lower = message.to_lowercase();
    if lower.contains("invalid syntax") || lower.contains("unexpected indent") {
        Category::Syntax
    } else if lower.contains("is not defined") || lower.contains("undefined") {
        Category::UndefinedReference
    } else if lower.contains("cannot find") && (lower.contains("module") || lower.contains("import"))
    {
        Category::ImportError
    } else if lower.contains("need type annotation") || lower.contains("missing a type annotation")
    {
        Category::MissingDeclaration
    } else if lower.contains("incompatible type") || lower.contains("expected") {
        Category::TypeMismatch
    } else {
        Category::Other
    }
}

/// Reconcile parsed diagnostics against the store and build the report
pub fn reconcile(
    db: &Database,
    root: &Path,
    parsed: Vec<ParsedDiagnostic>,
    malformed_lines: u64,
) -> Result<ScanReport> {
    let mut report = ScanReport {
        malformed_lines,
        ..ScanReport::default()
    };

    for diag in parsed {
        let context_line = read_context_line(root, &diag.file, diag.line);
        let new = NewDiagnostic {
            hash: content_hash(&diag.file, &diag.code, &diag.message),
            file: diag.file.clone(),
            line: diag.line,
            col: diag.col,
            code: diag.code,
            message: diag.message,
            category: diag.category,
            severity: diag.severity,
            context_line,
        };

        match db.reconcile_diagnostic(&new)? {
            Reconciled::New(_) => report.new_diagnostics += 1,
            Reconciled::Existing(_) => report.existing_diagnostics += 1,
        }
        report.total_diagnostics += 1;

        bump(&mut report.by_severity, new.severity.as_str());
        bump(&mut report.by_category, new.category.as_str());
        bump(&mut report.by_file, &diag.file);
    }

    Ok(report)
}

fn bump(counts: &mut Vec<(String, u64)>, key: &str) {
    if let Some(entry) = counts.iter_mut().find(|(k, _)| k == key) {
        entry.1 += 1;
    } else {
        counts.push((key.to_string(), 1));
    }
}

/// Source line text at scan time, used later to verify mutations
fn read_context_line(root: &Path, file: &str, line: i64) -> Option<String> {
    let content = std::fs::read_to_string(root.join(file)).ok()?;
    content
        .lines()
        .nth((line - 1).max(0) as usize)
        .map(|l| l.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OUTPUT: &str = "\
app/models.py:14:9: error: Name \"Session\" is not defined  [name-defined]
app/models.py:3:1: error: Cannot find implementation or library stub for module named \"flask_wtf\"  [import-not-found]
app/views.py:42: error: Incompatible types in assignment (expression has type \"str\", variable has type \"int\")  [assignment]
app/views.py:50:5: warning: Returning Any from function declared to return \"bool\"  [no-any-return]
app/forms.py:7:1: note: See https://example.invalid/docs
Found 4 errors in 3 files (checked 12 source files)
";

    #[test]
    fn parses_wellformed_lines_and_counts_malformed() {
        let (parsed, malformed) = parse_output(SAMPLE_OUTPUT);
        assert_eq!(parsed.len(), 5);
        assert_eq!(malformed, 1); // the summary line

        let first = &parsed[0];
        assert_eq!(first.file, "app/models.py");
        assert_eq!(first.line, 14);
        assert_eq!(first.col, 9);
        assert_eq!(first.code, "name-defined");
        assert_eq!(first.category, Category::UndefinedReference);
        assert_eq!(first.severity, Severity::High);
    }

    #[test]
    fn column_and_code_are_optional() {
        let (parsed, malformed) = parse_output(
            "lib.py:8: error: Incompatible types in assignment  [assignment]\nlib.py:9:2: error: invalid syntax\n",
        );
        assert_eq!(malformed, 0);
        assert_eq!(parsed[0].col, 1);
        assert_eq!(parsed[1].code, "misc");
        assert_eq!(parsed[1].category, Category::Syntax);
        assert_eq!(parsed[1].severity, Severity::Critical);
    }

    #[test]
    fn severity_mapping() {
        let (parsed, _) = parse_output(
            "a.py:1:1: error: Name \"x\" is not defined  [name-defined]\n\
             a.py:2:1: warning: Unused import  [misc]\n\
             a.py:3:1: note: consider adding a stub\n",
        );
        assert_eq!(parsed[0].severity, Severity::High);
        assert_eq!(parsed[1].severity, Severity::Medium);
        assert_eq!(parsed[2].severity, Severity::Low);
    }

    #[test]
    fn category_falls_back_to_message_keywords() {
        let (parsed, _) = parse_output(
            "a.py:1:1: error: Name \"x\" is not defined\n\
             a.py:2:1: error: Cannot find module named \"zlib\"\n\
             a.py:3:1: error: Need type annotation for \"items\"\n",
        );
        assert_eq!(parsed[0].category, Category::UndefinedReference);
        assert_eq!(parsed[1].category, Category::ImportError);
        assert_eq!(parsed[2].category, Category::MissingDeclaration);
    }

    #[test]
    fn reconcile_twice_is_idempotent_on_hashes() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let (parsed, malformed) = parse_output(SAMPLE_OUTPUT);
        let first = reconcile(&db, dir.path(), parsed.clone(), malformed).unwrap();
        assert_eq!(first.new_diagnostics, 5);
        assert_eq!(first.existing_diagnostics, 0);

        let second = reconcile(&db, dir.path(), parsed, malformed).unwrap();
        assert_eq!(second.new_diagnostics, 0);
        assert_eq!(second.existing_diagnostics, 5);

        // Every live row saw exactly two scans.
        for diag in db.live_diagnostics().unwrap() {
            assert_eq!(diag.occurrence_count, 2);
        }
        assert_eq!(db.count_diagnostics().unwrap(), 5);
    }

    #[test]
    fn context_line_is_captured_when_file_exists() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mod.py"), "import os\nx = undefined_name\n").unwrap();

        let (parsed, _) =
            parse_output("mod.py:2:5: error: Name \"undefined_name\" is not defined  [name-defined]\n");
        reconcile(&db, dir.path(), parsed, 0).unwrap();

        let diag = &db.live_diagnostics().unwrap()[0];
        assert_eq!(diag.context_line.as_deref(), Some("x = undefined_name"));
    }

    #[test]
    fn missing_project_root_is_fatal() {
        let db = Database::open_in_memory().unwrap();
        let err = scan(
            &db,
            Path::new("/nonexistent/remedy-project"),
            &AnalyzerConfig::default(),
        );
        assert!(err.is_err());
    }
}
