pub mod clusters;
pub mod diagnostics;
pub mod fixes;
pub mod models;
pub mod schema;

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Directory holding the store, config, and fix backups
pub const STORE_DIR: &str = ".remedy";

/// Main store handle; the system of record every phase reads and writes
/// through
pub struct Database {
    conn: Connection,
    pub store_dir: PathBuf,
}

impl Database {
    /// Open or create the remedy store in the given project root
    pub fn open(project_root: &Path) -> Result<Self> {
        let store_dir = project_root.join(STORE_DIR);
        std::fs::create_dir_all(&store_dir).context("Failed to create .remedy directory")?;

        let db_path = store_dir.join("remedy.db");
        let conn = Connection::open(&db_path).context("Failed to open store")?;

        // WAL for better concurrent access
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
        ",
        )?;

        schema::run_migrations(&conn)?;
        Self::bind_project_root(&conn, project_root)?;

        Ok(Self { conn, store_dir })
    }

    /// Open an in-memory store (tests)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn,
            store_dir: PathBuf::from(STORE_DIR),
        })
    }

    /// Check if the store exists for the project
    pub fn exists(project_root: &Path) -> bool {
        project_root.join(STORE_DIR).join("remedy.db").exists()
    }

    /// Directory receiving timestamped pre-mutation copies
    pub fn backup_dir(&self) -> PathBuf {
        self.store_dir.join("fix-backups")
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    fn bind_project_root(conn: &Connection, project_root: &Path) -> Result<()> {
        let canonical_root = std::fs::canonicalize(project_root)
            .unwrap_or_else(|_| project_root.to_path_buf())
            .to_string_lossy()
            .to_string();

        let existing: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'project_root' LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(value) if value != canonical_root => {
                bail!(
                    "This .remedy store belongs to a different project root: {}\nCurrent root: {}",
                    value,
                    canonical_root
                );
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('project_root', ?1)",
                    rusqlite::params![canonical_root],
                )?;
            }
        }
        Ok(())
    }
}

/// Store-wide timestamp format
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
