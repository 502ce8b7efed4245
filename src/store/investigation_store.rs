//! Investigation state persistence (spec §6: `investigation_state` table;
//! spec §3: "version" drives optimistic concurrency on update).
//!
//! Grounded on the teacher's `memory/store.rs` — `Arc<Mutex<Connection>>`,
//! the `with_conn` helper that maps `rusqlite::Error` into the crate's own
//! error type, and `rusqlite::params!` call sites — narrowed from a
//! hypergraph node/edge store to CRUD over one table.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::analyzers::{Domain, DomainFinding};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::investigation::{FailureCause, Investigation, InvestigationSettings, InvestigationStatus, WindowRecord};
use crate::progress::ProgressLog;
use crate::store::schema::{initialize_schema, is_initialized};

use std::collections::HashMap;

/// Everything about an investigation that isn't `progress_json` (spec §6
/// names `progress_json` explicitly; the rest — entities, window,
/// settings, findings, failure cause — has no prescribed external shape,
/// so it round-trips through `settings_json` as a single envelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsEnvelope {
    entities: Vec<Entity>,
    window: WindowRecord,
    settings: InvestigationSettings,
    findings: HashMap<Domain, DomainFinding>,
    failure_cause: Option<FailureCause>,
}

pub struct InvestigationStore {
    conn: Arc<Mutex<Connection>>,
}

impl InvestigationStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;
        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::Storage(e.to_string()))?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("failed to lock investigation store connection: {e}")))?;
        f(&conn).map_err(|e| Error::Storage(e.to_string()))
    }

    /// Insert a brand-new investigation row. Errors if the id already exists.
    pub fn create(&self, investigation: &Investigation, user_id: Option<&str>) -> Result<()> {
        let envelope = SettingsEnvelope {
            entities: investigation.entities.clone(),
            window: investigation.window,
            settings: investigation.settings.clone(),
            findings: investigation.findings.clone(),
            failure_cause: investigation.failure_cause.clone(),
        };
        let settings_json = serde_json::to_string(&envelope)?;
        let progress_json = serde_json::to_string(&investigation.progress)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO investigation_state (
                    investigation_id, user_id, lifecycle_stage, status,
                    settings_json, progress_json, version, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    investigation.id,
                    user_id,
                    lifecycle_stage(investigation.status),
                    status_str(investigation.status),
                    settings_json,
                    progress_json,
                    investigation.version,
                    investigation.created_at.to_rfc3339(),
                    investigation.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Overwrite the row for `investigation`, checking that the stored
    /// version matches `expected_version` before writing (spec §3: status
    /// transitions bump `version`; a stale writer must not clobber a
    /// concurrent update). Returns `Error::Storage` on a version mismatch.
    pub fn update(&self, investigation: &Investigation, expected_version: u32) -> Result<()> {
        let envelope = SettingsEnvelope {
            entities: investigation.entities.clone(),
            window: investigation.window,
            settings: investigation.settings.clone(),
            findings: investigation.findings.clone(),
            failure_cause: investigation.failure_cause.clone(),
        };
        let settings_json = serde_json::to_string(&envelope)?;
        let progress_json = serde_json::to_string(&investigation.progress)?;

        let rows = self.with_conn(|conn| {
            conn.execute(
                "UPDATE investigation_state SET
                    lifecycle_stage = ?2, status = ?3, settings_json = ?4,
                    progress_json = ?5, version = ?6, updated_at = ?7
                 WHERE investigation_id = ?1 AND version = ?8",
                params![
                    investigation.id,
                    lifecycle_stage(investigation.status),
                    status_str(investigation.status),
                    settings_json,
                    progress_json,
                    investigation.version,
                    investigation.updated_at.to_rfc3339(),
                    expected_version,
                ],
            )
        })?;

        if rows == 0 {
            return Err(Error::Storage(format!(
                "optimistic concurrency conflict updating investigation {}: expected version {}",
                investigation.id, expected_version
            )));
        }
        Ok(())
    }

    pub fn load(&self, investigation_id: &str) -> Result<Option<Investigation>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT settings_json, progress_json, status, version, created_at, updated_at
                 FROM investigation_state WHERE investigation_id = ?1",
                params![investigation_id],
                |row| {
                    let settings_json: String = row.get(0)?;
                    let progress_json: String = row.get(1)?;
                    let status_str: String = row.get(2)?;
                    let version: u32 = row.get(3)?;
                    let created_at: String = row.get(4)?;
                    let updated_at: String = row.get(5)?;
                    Ok((settings_json, progress_json, status_str, version, created_at, updated_at))
                },
            )
            .optional()?
            .map(|(settings_json, progress_json, status_str, version, created_at, updated_at)| {
                row_to_investigation(
                    investigation_id,
                    &settings_json,
                    &progress_json,
                    &status_str,
                    version,
                    &created_at,
                    &updated_at,
                )
            })
            .transpose()
            .map_err(rusqlite_from_serde)
        })
    }

    pub fn delete(&self, investigation_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "DELETE FROM investigation_state WHERE investigation_id = ?1",
                params![investigation_id],
            )?;
            Ok(rows > 0)
        })
    }

    /// List investigation ids for a given status, newest-updated first.
    pub fn list_by_status(&self, status: InvestigationStatus) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT investigation_id FROM investigation_state WHERE status = ?1 ORDER BY updated_at DESC",
            )?;
            let ids = stmt
                .query_map(params![status_str(status)], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(ids)
        })
    }
}

fn status_str(status: InvestigationStatus) -> &'static str {
    match status {
        InvestigationStatus::Pending => "pending",
        InvestigationStatus::InProgress => "in_progress",
        InvestigationStatus::Completed => "completed",
        InvestigationStatus::Failed => "failed",
    }
}

fn lifecycle_stage(status: InvestigationStatus) -> &'static str {
    match status {
        InvestigationStatus::Pending => "created",
        InvestigationStatus::InProgress => "running",
        InvestigationStatus::Completed => "done",
        InvestigationStatus::Failed => "done",
    }
}

fn parse_status(s: &str) -> rusqlite::Result<InvestigationStatus> {
    match s {
        "pending" => Ok(InvestigationStatus::Pending),
        "in_progress" => Ok(InvestigationStatus::InProgress),
        "completed" => Ok(InvestigationStatus::Completed),
        "failed" => Ok(InvestigationStatus::Failed),
        other => Err(rusqlite::Error::InvalidColumnType(
            0,
            format!("unknown investigation status {other}"),
            rusqlite::types::Type::Text,
        )),
    }
}

fn rusqlite_from_serde(e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(0, e.to_string(), rusqlite::types::Type::Text)
}

#[allow(clippy::too_many_arguments)]
fn row_to_investigation(
    investigation_id: &str,
    settings_json: &str,
    progress_json: &str,
    status_str_val: &str,
    version: u32,
    created_at: &str,
    updated_at: &str,
) -> rusqlite::Result<Investigation> {
    let envelope: SettingsEnvelope = serde_json::from_str(settings_json).map_err(rusqlite_from_serde)?;
    let progress: ProgressLog = serde_json::from_str(progress_json).map_err(rusqlite_from_serde)?;
    let status = parse_status(status_str_val)?;

    Ok(Investigation {
        id: investigation_id.to_string(),
        entities: envelope.entities,
        window: envelope.window,
        status,
        created_at: parse_datetime(created_at),
        updated_at: parse_datetime(updated_at),
        settings: envelope.settings,
        progress,
        version,
        failure_cause: envelope.failure_cause,
        findings: envelope.findings,
    })
}

fn parse_datetime(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::warehouse::TimeRange;
    use chrono::{Duration, Utc};

    fn sample_investigation() -> Investigation {
        Investigation::new(
            vec![Entity::new(EntityType::Email, "a@b.com").unwrap()],
            TimeRange::new(Utc::now() - Duration::days(14), Utc::now()),
            InvestigationSettings::default(),
        )
    }

    #[test]
    fn create_and_load_round_trips() {
        let store = InvestigationStore::in_memory().unwrap();
        let inv = sample_investigation();
        store.create(&inv, Some("user-1")).unwrap();

        let loaded = store.load(&inv.id).unwrap().unwrap();
        assert_eq!(loaded.id, inv.id);
        assert_eq!(loaded.entities, inv.entities);
        assert_eq!(loaded.status, InvestigationStatus::Pending);
    }

    #[test]
    fn update_rejects_stale_version() {
        let store = InvestigationStore::in_memory().unwrap();
        let mut inv = sample_investigation();
        store.create(&inv, None).unwrap();

        inv.transition_to(InvestigationStatus::InProgress).unwrap();
        store.update(&inv, 1).unwrap();

        // Simulate a second writer holding the stale pre-transition version.
        let mut stale = sample_investigation();
        stale.id = inv.id.clone();
        let result = store.update(&stale, 1);
        assert!(result.is_err());
    }

    #[test]
    fn load_missing_returns_none() {
        let store = InvestigationStore::in_memory().unwrap();
        assert!(store.load("does-not-exist").unwrap().is_none());
    }

    #[test]
    fn list_by_status_filters() {
        let store = InvestigationStore::in_memory().unwrap();
        let a = sample_investigation();
        let mut b = sample_investigation();
        b.transition_to(InvestigationStatus::InProgress).unwrap();
        store.create(&a, None).unwrap();
        store.create(&b, None).unwrap();

        let pending = store.list_by_status(InvestigationStatus::Pending).unwrap();
        assert_eq!(pending, vec![a.id.clone()]);
    }
}
