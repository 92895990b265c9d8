use anyhow::Result;
use rusqlite::Connection;

/// Run all schema migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS diagnostics (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            file             TEXT NOT NULL,
            line             INTEGER NOT NULL,
            col              INTEGER NOT NULL DEFAULT 1,
            code             TEXT NOT NULL,
            message          TEXT NOT NULL,
            category         TEXT NOT NULL DEFAULT 'other',
            severity         TEXT NOT NULL DEFAULT 'medium',
            status           TEXT NOT NULL DEFAULT 'detected',
            hash             TEXT NOT NULL,
            first_detected   TEXT NOT NULL,
            last_seen        TEXT NOT NULL,
            occurrence_count INTEGER NOT NULL DEFAULT 1,
            pattern_id       INTEGER REFERENCES patterns(id) ON DELETE SET NULL,
            cluster_id       INTEGER REFERENCES clusters(id) ON DELETE SET NULL,
            context_line     TEXT
        );

        CREATE TABLE IF NOT EXISTS patterns (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            code             TEXT NOT NULL,
            message_template TEXT NOT NULL,
            created_at       TEXT NOT NULL,
            UNIQUE(code, message_template)
        );

        CREATE TABLE IF NOT EXISTS fixes (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern_id       INTEGER REFERENCES patterns(id) ON DELETE SET NULL,
            title            TEXT NOT NULL,
            description      TEXT NOT NULL DEFAULT '',
            kind             TEXT NOT NULL,
            content          TEXT NOT NULL,
            anchor           TEXT,
            priority         INTEGER NOT NULL DEFAULT 0,
            success_rate     REAL NOT NULL DEFAULT 0.0,
            created_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fix_history (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            diagnostic_id    INTEGER NOT NULL REFERENCES diagnostics(id) ON DELETE CASCADE,
            fix_id           INTEGER REFERENCES fixes(id) ON DELETE SET NULL,
            method           TEXT NOT NULL DEFAULT 'automatic',
            applied_at       TEXT NOT NULL,
            success          INTEGER NOT NULL DEFAULT 0,
            dry_run          INTEGER NOT NULL DEFAULT 0,
            before_snippet   TEXT NOT NULL DEFAULT '',
            after_snippet    TEXT NOT NULL DEFAULT '',
            failure_reason   TEXT
        );

        CREATE TABLE IF NOT EXISTS dependency_edges (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            cause_id         INTEGER NOT NULL REFERENCES diagnostics(id) ON DELETE CASCADE,
            effect_id        INTEGER NOT NULL REFERENCES diagnostics(id) ON DELETE CASCADE,
            confidence       REAL NOT NULL DEFAULT 0.0
        );

        CREATE TABLE IF NOT EXISTS clusters (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            code              TEXT NOT NULL,
            description       TEXT NOT NULL DEFAULT '',
            representative_id INTEGER NOT NULL REFERENCES diagnostics(id) ON DELETE CASCADE,
            suggested_fix_id  INTEGER REFERENCES fixes(id) ON DELETE SET NULL,
            member_count      INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS advice (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            diagnostic_id    INTEGER NOT NULL REFERENCES diagnostics(id) ON DELETE CASCADE,
            explanation      TEXT NOT NULL DEFAULT '',
            suggested_fix    TEXT NOT NULL DEFAULT '',
            confidence       REAL NOT NULL DEFAULT 0.0,
            created_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS meta (
            key              TEXT PRIMARY KEY,
            value            TEXT NOT NULL
        );

        -- Indexes for fast lookups
        CREATE INDEX IF NOT EXISTS idx_diagnostics_status ON diagnostics(status);
        CREATE INDEX IF NOT EXISTS idx_diagnostics_file ON diagnostics(file);
        CREATE INDEX IF NOT EXISTS idx_diagnostics_code ON diagnostics(code);
        CREATE INDEX IF NOT EXISTS idx_diagnostics_severity ON diagnostics(severity);
        CREATE INDEX IF NOT EXISTS idx_fixes_pattern ON fixes(pattern_id);
        CREATE INDEX IF NOT EXISTS idx_history_diagnostic ON fix_history(diagnostic_id);
        CREATE INDEX IF NOT EXISTS idx_history_fix ON fix_history(fix_id);
        CREATE INDEX IF NOT EXISTS idx_edges_cause ON dependency_edges(cause_id);
        CREATE INDEX IF NOT EXISTS idx_edges_effect ON dependency_edges(effect_id);
        CREATE INDEX IF NOT EXISTS idx_advice_diagnostic ON advice(diagnostic_id);
    ",
    )?;

    // A hash must be unique among live diagnostics; terminal rows keep
    // their hash so a reintroduced issue gets a fresh row.
    conn.execute_batch(
        "
        CREATE UNIQUE INDEX IF NOT EXISTS idx_diagnostics_hash_live
            ON diagnostics(hash)
            WHERE status NOT IN ('fixed', 'ignored');
    ",
    )?;

    Ok(())
}
