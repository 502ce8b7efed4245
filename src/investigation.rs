//! The `Investigation` aggregate (spec §3): the unit the orchestrator
//! creates, schedules analyzers for, and persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::collections::HashMap;

use crate::analyzers::{Domain, DomainFinding};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::progress::ProgressLog;
use crate::warehouse::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl InvestigationStatus {
    /// Status transitions are monotone except `in_progress -> failed`,
    /// which is terminal but reachable from the otherwise-forward-only
    /// chain (spec §3).
    pub fn can_transition_to(&self, next: InvestigationStatus) -> bool {
        use InvestigationStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Pending, Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationSettings {
    pub risk_threshold: f64,
    pub sequential: bool,
    pub max_depth: u32,
}

impl Default for InvestigationSettings {
    fn default() -> Self {
        Self {
            risk_threshold: 0.3,
            sequential: false,
            max_depth: 120,
        }
    }
}

/// Cause recorded when an investigation reaches `failed` (spec §7's error
/// taxonomy, narrowed to the subset that can terminate an investigation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    WarehouseUnavailable,
    LlmContextLengthExceeded,
    LlmModelNotFound,
    LlmApiError { message: String },
    RecursionLimit { limit: u32 },
    Cancelled,
    Internal { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investigation {
    pub id: String,
    pub entities: Vec<Entity>,
    pub window: WindowRecord,
    pub status: InvestigationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settings: InvestigationSettings,
    pub progress: ProgressLog,
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_cause: Option<FailureCause>,
    /// Per-domain findings accumulated so far. Drives checkpoint/resume:
    /// a domain present here is skipped on re-entry into the orchestrator
    /// graph (spec §4.6 "resume reads the checkpoint and skips
    /// already-completed analyzers").
    #[serde(default)]
    pub findings: HashMap<Domain, DomainFinding>,
}

/// Serializable mirror of `warehouse::TimeRange` (chrono types round-trip
/// fine via serde, but the investigation record also needs a human label).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<TimeRange> for WindowRecord {
    fn from(r: TimeRange) -> Self {
        Self { start: r.start, end: r.end }
    }
}

impl From<WindowRecord> for TimeRange {
    fn from(w: WindowRecord) -> Self {
        TimeRange::new(w.start, w.end)
    }
}

impl Investigation {
    pub fn new(entities: Vec<Entity>, window: TimeRange, settings: InvestigationSettings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            entities,
            window: window.into(),
            status: InvestigationStatus::Pending,
            created_at: now,
            updated_at: now,
            settings,
            progress: ProgressLog::new(),
            version: 1,
            failure_cause: None,
            findings: HashMap::new(),
        }
    }

    pub fn transition_to(&mut self, next: InvestigationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "illegal investigation status transition {:?} -> {:?}",
                self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        self.version += 1;
        Ok(())
    }

    pub fn fail(&mut self, cause: FailureCause) -> Result<()> {
        self.transition_to(InvestigationStatus::Failed)?;
        self.failure_cause = Some(cause);
        Ok(())
    }

    /// Whether this investigation's window fully covers `window` (used by
    /// the mapper's `select_best_investigation`, spec §4.8).
    pub fn covers(&self, window: TimeRange) -> bool {
        self.window.start <= window.start && self.window.end >= window.end
    }

    pub fn overlap_duration(&self, window: TimeRange) -> chrono::Duration {
        let start = self.window.start.max(window.start);
        let end = self.window.end.min(window.end);
        if start >= end {
            chrono::Duration::zero()
        } else {
            end - start
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    fn sample_window() -> TimeRange {
        TimeRange::new(Utc::now(), Utc::now() + chrono::Duration::days(14))
    }

    #[test]
    fn status_transitions_are_monotone_except_failure() {
        let mut inv = Investigation::new(
            vec![Entity::new(EntityType::Email, "a@b.com").unwrap()],
            sample_window(),
            InvestigationSettings::default(),
        );
        assert!(inv.transition_to(InvestigationStatus::InProgress).is_ok());
        assert!(inv.transition_to(InvestigationStatus::Failed).is_ok());
        assert!(inv.transition_to(InvestigationStatus::Completed).is_err());
    }

    #[test]
    fn covers_requires_full_containment() {
        let window = sample_window();
        let inv = Investigation::new(
            vec![Entity::new(EntityType::Email, "a@b.com").unwrap()],
            window,
            InvestigationSettings::default(),
        );
        assert!(inv.covers(window));
        let narrower = TimeRange::new(window.start, window.end - chrono::Duration::days(1));
        assert!(inv.covers(narrower));
        let wider = TimeRange::new(window.start - chrono::Duration::days(1), window.end);
        assert!(!inv.covers(wider));
    }
}
