use super::models::*;
use super::{now_rfc3339, Database};
use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};

/// A fix application attempt about to be recorded
#[derive(Debug, Clone)]
pub struct NewFixRecord {
    pub diagnostic_id: i64,
    pub fix_id: Option<i64>,
    pub method: FixMethod,
    pub success: bool,
    pub dry_run: bool,
    pub before_snippet: String,
    pub after_snippet: String,
    pub failure_reason: Option<String>,
}

const FIX_COLUMNS: &str =
    "id, pattern_id, title, description, kind, content, anchor, priority, success_rate, created_at";

fn fix_from_row(row: &Row) -> rusqlite::Result<StoredFix> {
    let kind: String = row.get(4)?;
    Ok(StoredFix {
        id: row.get(0)?,
        pattern_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        kind: FixKind::from_db_str(&kind),
        content: row.get(5)?,
        anchor: row.get(6)?,
        priority: row.get(7)?,
        success_rate: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl Database {
    // =================================================================
    // Pattern operations
    // =================================================================

    /// Ensure a pattern row exists for (code, message skeleton)
    pub fn upsert_pattern(&self, code: &str, message_template: &str) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO patterns (code, message_template, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(code, message_template) DO NOTHING",
            params![code, message_template, now_rfc3339()],
        )?;
        let id = self.conn().query_row(
            "SELECT id FROM patterns WHERE code = ?1 AND message_template = ?2",
            params![code, message_template],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_pattern(&self, id: i64) -> Result<Option<Pattern>> {
        let result = self
            .conn()
            .query_row(
                "SELECT id, code, message_template, created_at FROM patterns WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Pattern {
                        id: row.get(0)?,
                        code: row.get(1)?,
                        message_template: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    pub fn count_patterns(&self) -> Result<i64> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM patterns", [], |row| row.get(0))?)
    }

    // =================================================================
    // Fix operations
    // =================================================================

    /// Persist a fix (used directly and when promoting an ephemeral fix
    /// after its first successful application)
    #[allow(clippy::too_many_arguments)]
    pub fn insert_fix(
        &self,
        pattern_id: Option<i64>,
        title: &str,
        description: &str,
        kind: FixKind,
        content: &str,
        anchor: Option<&str>,
        priority: i64,
    ) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO fixes (pattern_id, title, description, kind, content, anchor, priority,
                                success_rate, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0.0, ?8)",
            params![
                pattern_id,
                title,
                description,
                kind.as_str(),
                content,
                anchor,
                priority,
                now_rfc3339(),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn get_fix(&self, id: i64) -> Result<Option<StoredFix>> {
        let sql = format!("SELECT {FIX_COLUMNS} FROM fixes WHERE id = ?1");
        let result = self
            .conn()
            .query_row(&sql, params![id], fix_from_row)
            .optional()?;
        Ok(result)
    }

    /// Fixes linked to a pattern, best candidates first
    pub fn fixes_for_pattern(&self, pattern_id: i64) -> Result<Vec<StoredFix>> {
        let sql = format!(
            "SELECT {FIX_COLUMNS} FROM fixes WHERE pattern_id = ?1
             ORDER BY success_rate DESC, priority DESC, id ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![pattern_id], fix_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count_fixes(&self) -> Result<i64> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM fixes", [], |row| row.get(0))?)
    }

    // =================================================================
    // History operations
    // =================================================================

    /// Append an immutable application record
    pub fn record_fix_attempt(&self, record: &NewFixRecord) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO fix_history
             (diagnostic_id, fix_id, method, applied_at, success, dry_run,
              before_snippet, after_snippet, failure_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.diagnostic_id,
                record.fix_id,
                record.method.as_str(),
                now_rfc3339(),
                record.success as i64,
                record.dry_run as i64,
                record.before_snippet,
                record.after_snippet,
                record.failure_reason,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Recompute a fix's rolling success rate from its real (non-dry-run)
    /// history
    pub fn recompute_success_rate(&self, fix_id: i64) -> Result<f64> {
        let rate: f64 = self.conn().query_row(
            "SELECT COALESCE(AVG(success), 0.0) FROM fix_history
             WHERE fix_id = ?1 AND dry_run = 0",
            params![fix_id],
            |row| row.get(0),
        )?;
        self.conn().execute(
            "UPDATE fixes SET success_rate = ?1 WHERE id = ?2",
            params![rate, fix_id],
        )?;
        Ok(rate)
    }

    /// Most recent history entries
    pub fn fix_history(&self, limit: i64) -> Result<Vec<FixRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, diagnostic_id, fix_id, method, applied_at, success, dry_run,
                    before_snippet, after_snippet, failure_reason
             FROM fix_history ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], record_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// History for one diagnostic, oldest first
    pub fn history_for_diagnostic(&self, diagnostic_id: i64) -> Result<Vec<FixRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, diagnostic_id, fix_id, method, applied_at, success, dry_run,
                    before_snippet, after_snippet, failure_reason
             FROM fix_history WHERE diagnostic_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![diagnostic_id], record_from_row)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Success share of the last `window` real attempts
    pub fn recent_success_rate(&self, window: i64) -> Result<Option<f64>> {
        let (total, succeeded): (i64, i64) = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(success), 0) FROM (
                 SELECT success FROM fix_history WHERE dry_run = 0
                 ORDER BY id DESC LIMIT ?1
             )",
            params![window],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if total == 0 {
            Ok(None)
        } else {
            Ok(Some(succeeded as f64 / total as f64))
        }
    }

    // =================================================================
    // Advice operations (advisory oracle)
    // =================================================================

    /// Store oracle advice for a diagnostic, replacing any previous advice
    pub fn put_advice(
        &self,
        diagnostic_id: i64,
        explanation: &str,
        suggested_fix: &str,
        confidence: f64,
    ) -> Result<i64> {
        self.conn().execute(
            "DELETE FROM advice WHERE diagnostic_id = ?1",
            params![diagnostic_id],
        )?;
        self.conn().execute(
            "INSERT INTO advice (diagnostic_id, explanation, suggested_fix, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                diagnostic_id,
                explanation,
                suggested_fix,
                confidence,
                now_rfc3339()
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Latest advice for a diagnostic, if any
    pub fn advice_for(&self, diagnostic_id: i64) -> Result<Option<Advice>> {
        let result = self
            .conn()
            .query_row(
                "SELECT id, diagnostic_id, explanation, suggested_fix, confidence, created_at
                 FROM advice WHERE diagnostic_id = ?1 ORDER BY id DESC LIMIT 1",
                params![diagnostic_id],
                |row| {
                    Ok(Advice {
                        id: row.get(0)?,
                        diagnostic_id: row.get(1)?,
                        explanation: row.get(2)?,
                        suggested_fix: row.get(3)?,
                        confidence: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }
}

fn record_from_row(row: &Row) -> rusqlite::Result<FixRecord> {
    let method: String = row.get(3)?;
    let success: i64 = row.get(5)?;
    let dry_run: i64 = row.get(6)?;
    Ok(FixRecord {
        id: row.get(0)?,
        diagnostic_id: row.get(1)?,
        fix_id: row.get(2)?,
        method: FixMethod::from_db_str(&method),
        applied_at: row.get(4)?,
        success: success != 0,
        dry_run: dry_run != 0,
        before_snippet: row.get(7)?,
        after_snippet: row.get(8)?,
        failure_reason: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::diagnostics::NewDiagnostic;

    fn seed_diagnostic(db: &Database) -> i64 {
        let new = NewDiagnostic {
            file: "a.py".to_string(),
            line: 3,
            col: 1,
            code: "var-annotated".to_string(),
            message: "Need type annotation for \"items\"".to_string(),
            category: Category::MissingDeclaration,
            severity: Severity::Medium,
            hash: "h-seed".to_string(),
            context_line: Some("items = []".to_string()),
        };
        db.reconcile_diagnostic(&new).unwrap().id()
    }

    #[test]
    fn pattern_upsert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let a = db.upsert_pattern("var-annotated", "Need type annotation for _").unwrap();
        let b = db.upsert_pattern("var-annotated", "Need type annotation for _").unwrap();
        assert_eq!(a, b);
        assert_eq!(db.count_patterns().unwrap(), 1);
    }

    #[test]
    fn success_rate_averages_real_attempts_only() {
        let db = Database::open_in_memory().unwrap();
        let diag_id = seed_diagnostic(&db);
        let pattern_id = db.upsert_pattern("var-annotated", "Need type annotation for _").unwrap();
        let fix_id = db
            .insert_fix(
                Some(pattern_id),
                "Annotate list",
                "",
                FixKind::ReplaceLine,
                "items: list = []",
                Some("items = []"),
                5,
            )
            .unwrap();

        for (success, dry_run) in [(true, false), (false, false), (true, false), (true, true)] {
            db.record_fix_attempt(&NewFixRecord {
                diagnostic_id: diag_id,
                fix_id: Some(fix_id),
                method: FixMethod::Pattern,
                success,
                dry_run,
                before_snippet: String::new(),
                after_snippet: String::new(),
                failure_reason: None,
            })
            .unwrap();
        }

        let rate = db.recompute_success_rate(fix_id).unwrap();
        // Dry-run attempt excluded: 2 of 3 real attempts succeeded.
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);

        let stored = db.get_fix(fix_id).unwrap().unwrap();
        assert!((stored.success_rate - rate).abs() < 1e-9);
    }

    #[test]
    fn pattern_fixes_ranked_by_rate_then_priority() {
        let db = Database::open_in_memory().unwrap();
        let diag_id = seed_diagnostic(&db);
        let pattern_id = db.upsert_pattern("arg-type", "Argument _ mismatch").unwrap();

        let low = db
            .insert_fix(Some(pattern_id), "cast", "", FixKind::ReplaceLine, "a", None, 9)
            .unwrap();
        let high = db
            .insert_fix(Some(pattern_id), "coerce", "", FixKind::ReplaceLine, "b", None, 1)
            .unwrap();

        db.record_fix_attempt(&NewFixRecord {
            diagnostic_id: diag_id,
            fix_id: Some(high),
            method: FixMethod::Pattern,
            success: true,
            dry_run: false,
            before_snippet: String::new(),
            after_snippet: String::new(),
            failure_reason: None,
        })
        .unwrap();
        db.recompute_success_rate(high).unwrap();

        let ranked = db.fixes_for_pattern(pattern_id).unwrap();
        assert_eq!(ranked[0].id, high);
        assert_eq!(ranked[1].id, low);
    }

    #[test]
    fn advice_replaces_previous_entry() {
        let db = Database::open_in_memory().unwrap();
        let diag_id = seed_diagnostic(&db);

        db.put_advice(diag_id, "first", "x = 1", 0.5).unwrap();
        db.put_advice(diag_id, "second", "x = 2", 0.9).unwrap();

        let advice = db.advice_for(diag_id).unwrap().unwrap();
        assert_eq!(advice.explanation, "second");
        assert!((advice.confidence - 0.9).abs() < 1e-9);
    }
}
