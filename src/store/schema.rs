//! SQLite schema for the investigation state store (spec §6:
//! `investigation_state(investigation_id PK, user_id, lifecycle_stage,
//! status, settings_json, progress_json, version, created_at, updated_at)`).
//!
//! Grounded on the teacher's `memory/schema.rs` — same versioned-migration
//! shape, WAL mode, and `schema_version` bookkeeping table — narrowed to
//! the single table the investigation state store needs.

use rusqlite::{Connection, Result as SqliteResult};

pub const SCHEMA_VERSION: i32 = 1;

pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS investigation_state (
            investigation_id TEXT PRIMARY KEY,
            user_id TEXT,
            lifecycle_stage TEXT,
            status TEXT NOT NULL,
            settings_json TEXT NOT NULL,
            progress_json TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_investigation_state_status ON investigation_state(status)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_investigation_state_updated ON investigation_state(updated_at)",
        [],
    )?;

    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get(0)
    })
}

pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='investigation_state'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_once() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(is_initialized(&conn));
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn idempotent_initialization() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }
}
