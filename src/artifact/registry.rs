//! Workspace registry indexing both canonical and entity-view paths for
//! every artifact written, as an append-only table.
//!
//! Grounded on `store/investigation_store.rs`'s `Arc<Mutex<Connection>>` +
//! `with_conn` pattern, narrowed to a single append-only `artifacts` table.
//! Rows are never updated or deleted — a fresh write of the same artifact
//! kind gets a new row, matching the append-only contract.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub investigation_id: String,
    pub kind: String,
    pub entity_type: String,
    pub entity_id: String,
    pub canonical_path: String,
    pub entity_view_path: String,
    pub created_at: String,
}

pub struct WorkspaceRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl WorkspaceRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").map_err(|e| Error::Storage(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS artifacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                investigation_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                canonical_path TEXT NOT NULL,
                entity_view_path TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )
        .map_err(|e| Error::Storage(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_artifacts_investigation ON artifacts(investigation_id)",
            [],
        )
        .map_err(|e| Error::Storage(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_artifacts_entity ON artifacts(entity_type, entity_id)",
            [],
        )
        .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("failed to lock workspace registry connection: {e}")))?;
        f(&conn).map_err(|e| Error::Storage(e.to_string()))
    }

    /// Append one row indexing both paths for a just-written artifact.
    /// Never updates an existing row.
    pub fn record(
        &self,
        investigation_id: &str,
        kind: &str,
        entity_type: &str,
        entity_id: &str,
        canonical_path: &Path,
        entity_view_path: &Path,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO artifacts (
                    investigation_id, kind, entity_type, entity_id, canonical_path, entity_view_path
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    investigation_id,
                    kind,
                    entity_type,
                    entity_id,
                    canonical_path.to_string_lossy(),
                    entity_view_path.to_string_lossy(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_for_investigation(&self, investigation_id: &str) -> Result<Vec<ArtifactRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT investigation_id, kind, entity_type, entity_id, canonical_path, entity_view_path, created_at
                 FROM artifacts WHERE investigation_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map(params![investigation_id], |row| {
                    Ok(ArtifactRecord {
                        investigation_id: row.get(0)?,
                        kind: row.get(1)?,
                        entity_type: row.get(2)?,
                        entity_id: row.get(3)?,
                        canonical_path: row.get(4)?,
                        entity_view_path: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
    }

    pub fn list_for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<ArtifactRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT investigation_id, kind, entity_type, entity_id, canonical_path, entity_view_path, created_at
                 FROM artifacts WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map(params![entity_type, entity_id], |row| {
                    Ok(ArtifactRecord {
                        investigation_id: row.get(0)?,
                        kind: row.get(1)?,
                        entity_type: row.get(2)?,
                        entity_id: row.get(3)?,
                        canonical_path: row.get(4)?,
                        entity_view_path: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn record_and_list_round_trips() {
        let registry = WorkspaceRegistry::in_memory().unwrap();
        registry
            .record(
                "inv-1",
                "comparison",
                "email",
                "a_b_com",
                &PathBuf::from("workspace/investigations/2026/01/inv-1/artifacts/x.json"),
                &PathBuf::from("workspace/artifacts/email/a_b_com/2026/01/inv_inv-1__artifact.json"),
            )
            .unwrap();

        let by_inv = registry.list_for_investigation("inv-1").unwrap();
        assert_eq!(by_inv.len(), 1);
        assert_eq!(by_inv[0].kind, "comparison");

        let by_entity = registry.list_for_entity("email", "a_b_com").unwrap();
        assert_eq!(by_entity.len(), 1);
        assert_eq!(by_entity[0].investigation_id, "inv-1");
    }

    #[test]
    fn appends_rather_than_overwrites() {
        let registry = WorkspaceRegistry::in_memory().unwrap();
        for _ in 0..2 {
            registry
                .record(
                    "inv-1",
                    "comparison",
                    "email",
                    "a_b_com",
                    &PathBuf::from("x.json"),
                    &PathBuf::from("y.json"),
                )
                .unwrap();
        }
        assert_eq!(registry.list_for_investigation("inv-1").unwrap().len(), 2);
    }
}
