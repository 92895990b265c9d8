use super::models::*;
use super::{now_rfc3339, Database};
use anyhow::Result;
use rusqlite::params;

/// A cluster computed by the analyze phase, before persistence
#[derive(Debug, Clone)]
pub struct ClusterDraft {
    pub code: String,
    pub description: String,
    pub representative_id: i64,
    pub suggested_fix_id: Option<i64>,
    pub member_ids: Vec<i64>,
}

impl Database {
    // =================================================================
    // Dependency edge operations
    // =================================================================

    /// Replace the persisted graph with the edges from a fresh analyze run
    pub fn replace_edges(&self, edges: &[DependencyEdge]) -> Result<()> {
        self.conn().execute("DELETE FROM dependency_edges", [])?;
        let mut stmt = self.conn().prepare(
            "INSERT INTO dependency_edges (cause_id, effect_id, confidence)
             VALUES (?1, ?2, ?3)",
        )?;
        for edge in edges {
            stmt.execute(params![edge.cause_id, edge.effect_id, edge.confidence])?;
        }
        Ok(())
    }

    /// All persisted edges, deterministic order
    pub fn edges(&self) -> Result<Vec<DependencyEdge>> {
        let mut stmt = self.conn().prepare(
            "SELECT cause_id, effect_id, confidence FROM dependency_edges
             ORDER BY cause_id, effect_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DependencyEdge {
                cause_id: row.get(0)?,
                effect_id: row.get(1)?,
                confidence: row.get(2)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count_edges(&self) -> Result<i64> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM dependency_edges", [], |row| row.get(0))?)
    }

    // =================================================================
    // Cluster operations
    // =================================================================

    /// Replace all clusters with the result of a fresh analyze run and
    /// point member diagnostics at their new cluster
    pub fn replace_clusters(&self, drafts: &[ClusterDraft]) -> Result<Vec<i64>> {
        self.conn()
            .execute("UPDATE diagnostics SET cluster_id = NULL", [])?;
        self.conn().execute("DELETE FROM clusters", [])?;

        let now = now_rfc3339();
        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            self.conn().execute(
                "INSERT INTO clusters
                 (code, description, representative_id, suggested_fix_id, member_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    draft.code,
                    draft.description,
                    draft.representative_id,
                    draft.suggested_fix_id,
                    draft.member_ids.len() as i64,
                    now,
                ],
            )?;
            let cluster_id = self.conn().last_insert_rowid();
            for member in &draft.member_ids {
                self.set_diagnostic_cluster(*member, cluster_id)?;
            }
            ids.push(cluster_id);
        }
        Ok(ids)
    }

    /// All persisted clusters, largest first
    pub fn clusters(&self) -> Result<Vec<Cluster>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, code, description, representative_id, suggested_fix_id,
                    member_count, created_at
             FROM clusters ORDER BY member_count DESC, id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Cluster {
                id: row.get(0)?,
                code: row.get(1)?,
                description: row.get(2)?,
                representative_id: row.get(3)?,
                suggested_fix_id: row.get(4)?,
                member_count: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count_clusters(&self) -> Result<i64> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM clusters", [], |row| row.get(0))?)
    }
}
