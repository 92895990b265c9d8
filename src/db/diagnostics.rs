use super::models::*;
use super::{now_rfc3339, Database};
use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};

/// A normalized diagnostic as produced by the scanner, before it has a
/// store identity
#[derive(Debug, Clone)]
pub struct NewDiagnostic {
    pub file: String,
    pub line: i64,
    pub col: i64,
    pub code: String,
    pub message: String,
    pub category: Category,
    pub severity: Severity,
    pub hash: String,
    pub context_line: Option<String>,
}

/// Outcome of reconciling one scanned diagnostic against the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    New(i64),
    Existing(i64),
}

impl Reconciled {
    pub fn id(&self) -> i64 {
        match self {
            Self::New(id) | Self::Existing(id) => *id,
        }
    }
}

const DIAGNOSTIC_COLUMNS: &str = "id, file, line, col, code, message, category, severity, status, \
     hash, first_detected, last_seen, occurrence_count, pattern_id, cluster_id, context_line";

fn diagnostic_from_row(row: &Row) -> rusqlite::Result<Diagnostic> {
    let category: String = row.get(6)?;
    let severity: String = row.get(7)?;
    let status: String = row.get(8)?;
    Ok(Diagnostic {
        id: row.get(0)?,
        file: row.get(1)?,
        line: row.get(2)?,
        col: row.get(3)?,
        code: row.get(4)?,
        message: row.get(5)?,
        category: Category::from_db_str(&category),
        severity: Severity::from_db_str(&severity),
        status: Status::from_db_str(&status),
        hash: row.get(9)?,
        first_detected: row.get(10)?,
        last_seen: row.get(11)?,
        occurrence_count: row.get(12)?,
        pattern_id: row.get(13)?,
        cluster_id: row.get(14)?,
        context_line: row.get(15)?,
    })
}

impl Database {
    // =================================================================
    // Diagnostic operations
    // =================================================================

    /// Reconcile one scanned diagnostic: a live row with the same hash is
    /// refreshed (occurrence count, last seen, position), anything else
    /// inserts a fresh `detected` row. Rows are never deleted here and
    /// absence from a scan never changes status.
    pub fn reconcile_diagnostic(&self, new: &NewDiagnostic) -> Result<Reconciled> {
        let existing: Option<i64> = self
            .conn()
            .query_row(
                "SELECT id FROM diagnostics
                 WHERE hash = ?1 AND status NOT IN ('fixed', 'ignored')",
                params![new.hash],
                |row| row.get(0),
            )
            .optional()?;

        let now = now_rfc3339();
        match existing {
            Some(id) => {
                self.conn().execute(
                    "UPDATE diagnostics
                     SET occurrence_count = occurrence_count + 1,
                         last_seen = ?1, line = ?2, col = ?3, context_line = ?4
                     WHERE id = ?5",
                    params![now, new.line, new.col, new.context_line, id],
                )?;
                Ok(Reconciled::Existing(id))
            }
            None => {
                self.conn().execute(
                    "INSERT INTO diagnostics
                     (file, line, col, code, message, category, severity, status,
                      hash, first_detected, last_seen, occurrence_count, context_line)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'detected', ?8, ?9, ?9, 1, ?10)",
                    params![
                        new.file,
                        new.line,
                        new.col,
                        new.code,
                        new.message,
                        new.category.as_str(),
                        new.severity.as_str(),
                        new.hash,
                        now,
                        new.context_line,
                    ],
                )?;
                Ok(Reconciled::New(self.conn().last_insert_rowid()))
            }
        }
    }

    /// Get a diagnostic by id
    pub fn get_diagnostic(&self, id: i64) -> Result<Option<Diagnostic>> {
        let sql = format!("SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics WHERE id = ?1");
        let result = self
            .conn()
            .query_row(&sql, params![id], diagnostic_from_row)
            .optional()?;
        Ok(result)
    }

    /// All diagnostics that can still be acted on (non-terminal)
    pub fn live_diagnostics(&self) -> Result<Vec<Diagnostic>> {
        let sql = format!(
            "SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics
             WHERE status NOT IN ('fixed', 'ignored') ORDER BY id"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], diagnostic_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Filter by status
    pub fn diagnostics_by_status(&self, status: Status) -> Result<Vec<Diagnostic>> {
        let sql = format!(
            "SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics WHERE status = ?1 ORDER BY id"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![status.as_str()], diagnostic_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Filter by analyzer code
    pub fn diagnostics_by_code(&self, code: &str) -> Result<Vec<Diagnostic>> {
        let sql =
            format!("SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics WHERE code = ?1 ORDER BY id");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![code], diagnostic_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Filter by severity
    pub fn diagnostics_by_severity(&self, severity: Severity) -> Result<Vec<Diagnostic>> {
        let sql = format!(
            "SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics WHERE severity = ?1 ORDER BY id"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![severity.as_str()], diagnostic_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Filter by file path
    pub fn diagnostics_by_file(&self, file: &str) -> Result<Vec<Diagnostic>> {
        let sql = format!(
            "SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics WHERE file = ?1 ORDER BY line, col"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![file], diagnostic_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Paginated retrieval, newest first
    pub fn diagnostics_page(&self, limit: i64, offset: i64) -> Result<Vec<Diagnostic>> {
        let sql = format!(
            "SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics
             ORDER BY id DESC LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![limit, offset], diagnostic_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Move a diagnostic to a new lifecycle status
    pub fn set_diagnostic_status(&self, id: i64, status: Status) -> Result<()> {
        self.conn().execute(
            "UPDATE diagnostics SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Link a diagnostic to its pattern
    pub fn set_diagnostic_pattern(&self, id: i64, pattern_id: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE diagnostics SET pattern_id = ?1 WHERE id = ?2",
            params![pattern_id, id],
        )?;
        Ok(())
    }

    /// Link a diagnostic to its cluster
    pub fn set_diagnostic_cluster(&self, id: i64, cluster_id: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE diagnostics SET cluster_id = ?1 WHERE id = ?2",
            params![cluster_id, id],
        )?;
        Ok(())
    }

    /// Counts grouped by severity
    pub fn count_by_severity(&self) -> Result<Vec<(String, i64)>> {
        self.grouped_counts("severity")
    }

    /// Counts grouped by category
    pub fn count_by_category(&self) -> Result<Vec<(String, i64)>> {
        self.grouped_counts("category")
    }

    /// Counts grouped by status
    pub fn count_by_status(&self) -> Result<Vec<(String, i64)>> {
        self.grouped_counts("status")
    }

    /// Live diagnostic counts per file, busiest first
    pub fn count_by_file(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn().prepare(
            "SELECT file, COUNT(*) FROM diagnostics
             WHERE status NOT IN ('fixed', 'ignored')
             GROUP BY file ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Total diagnostics ever recorded
    pub fn count_diagnostics(&self) -> Result<i64> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM diagnostics", [], |row| row.get(0))?)
    }

    fn grouped_counts(&self, column: &str) -> Result<Vec<(String, i64)>> {
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM diagnostics
             WHERE status NOT IN ('fixed', 'ignored')
             GROUP BY {column} ORDER BY COUNT(*) DESC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(file: &str, code: &str, message: &str) -> NewDiagnostic {
        NewDiagnostic {
            file: file.to_string(),
            line: 10,
            col: 5,
            code: code.to_string(),
            message: message.to_string(),
            category: Category::TypeMismatch,
            severity: Severity::High,
            hash: blake3::hash(format!("{file}|{code}|{message}").as_bytes())
                .to_hex()
                .to_string(),
            context_line: Some("x: int = \"oops\"".to_string()),
        }
    }

    #[test]
    fn rescan_increments_occurrence_instead_of_duplicating() {
        let db = Database::open_in_memory().unwrap();
        let new = sample("a.py", "assignment", "Incompatible types");

        let first = db.reconcile_diagnostic(&new).unwrap();
        let second = db.reconcile_diagnostic(&new).unwrap();

        assert!(matches!(first, Reconciled::New(_)));
        assert!(matches!(second, Reconciled::Existing(_)));
        assert_eq!(first.id(), second.id());

        let diag = db.get_diagnostic(first.id()).unwrap().unwrap();
        assert_eq!(diag.occurrence_count, 2);
        assert_eq!(db.count_diagnostics().unwrap(), 1);
    }

    #[test]
    fn terminal_rows_release_their_hash() {
        let db = Database::open_in_memory().unwrap();
        let new = sample("a.py", "name-defined", "Name \"foo\" is not defined");

        let first = db.reconcile_diagnostic(&new).unwrap();
        db.set_diagnostic_status(first.id(), Status::Fixed).unwrap();

        // Reintroduced issue gets a fresh row; the fixed row is untouched.
        let second = db.reconcile_diagnostic(&new).unwrap();
        assert!(matches!(second, Reconciled::New(_)));
        assert_ne!(first.id(), second.id());

        let old = db.get_diagnostic(first.id()).unwrap().unwrap();
        assert_eq!(old.status, Status::Fixed);
        assert_eq!(old.occurrence_count, 1);
    }

    #[test]
    fn filters_and_pagination() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            let mut d = sample("b.py", "arg-type", &format!("Argument {i} mismatch"));
            d.line = i + 1;
            db.reconcile_diagnostic(&d).unwrap();
        }
        let mut other = sample("c.py", "import", "Cannot find module \"zlib\"");
        other.category = Category::ImportError;
        other.severity = Severity::Critical;
        db.reconcile_diagnostic(&other).unwrap();

        assert_eq!(db.diagnostics_by_file("b.py").unwrap().len(), 5);
        assert_eq!(db.diagnostics_by_code("import").unwrap().len(), 1);
        assert_eq!(
            db.diagnostics_by_severity(Severity::Critical).unwrap().len(),
            1
        );
        assert_eq!(db.diagnostics_by_status(Status::Detected).unwrap().len(), 6);

        let page = db.diagnostics_page(4, 0).unwrap();
        assert_eq!(page.len(), 4);
        let rest = db.diagnostics_page(4, 4).unwrap();
        assert_eq!(rest.len(), 2);
    }
}
