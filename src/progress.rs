//! Investigation progress journal: an append-only record of tool
//! executions and their outcomes.
//!
//! Grounded on `TrajectoryEvent`'s append-only, serializable event shape,
//! narrowed to the fixed vocabulary an investigation actually produces
//! (analyzer dispatch, warehouse calls, checkpoints).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyzers::Domain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolExecutionKind {
    AnalyzerDispatched,
    AnalyzerCompleted,
    AnalyzerFailed,
    WarehouseQuery,
    LlmCall,
    Checkpoint,
    AggregationComplete,
    Retry,
}

/// One entry in an investigation's append-only progress log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub kind: ToolExecutionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    pub detail: String,
    pub succeeded: bool,
    pub depth: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl ToolExecution {
    pub fn new(kind: ToolExecutionKind, depth: u32, detail: impl Into<String>, succeeded: bool) -> Self {
        Self {
            kind,
            domain: None,
            detail: detail.into(),
            succeeded,
            depth,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn for_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// The append-only `progress` field of an Investigation. Also carries
/// `transaction_scores` (serialized under `progress_json.transaction_scores`)
/// used by the mapper to attach per-transaction predicted risk without a
/// second warehouse round-trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressLog {
    pub tool_executions: Vec<ToolExecution>,
    pub transaction_scores: HashMap<String, f64>,
    pub overall_risk_score: Option<f64>,
    pub current_phase: Option<String>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, execution: ToolExecution) {
        self.tool_executions.push(execution);
    }

    pub fn record_transaction_score(&mut self, tx_id: impl Into<String>, score: f64) {
        self.transaction_scores.insert(tx_id.into(), score);
    }

    pub fn set_phase(&mut self, phase: impl Into<String>) {
        self.current_phase = Some(phase.into());
    }

    pub fn failures(&self) -> impl Iterator<Item = &ToolExecution> {
        self.tool_executions.iter().filter(|e| !e.succeeded)
    }

    pub fn successes_for(&self, kind: ToolExecutionKind) -> usize {
        self.tool_executions
            .iter()
            .filter(|e| e.kind == kind && e.succeeded)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_only_preserves_order() {
        let mut log = ProgressLog::new();
        log.record(ToolExecution::new(ToolExecutionKind::AnalyzerDispatched, 0, "device", true).for_domain(Domain::Device));
        log.record(ToolExecution::new(ToolExecutionKind::AnalyzerCompleted, 0, "device", true).for_domain(Domain::Device));
        assert_eq!(log.tool_executions.len(), 2);
        assert_eq!(log.tool_executions[0].kind, ToolExecutionKind::AnalyzerDispatched);
    }

    #[test]
    fn transaction_scores_roundtrip_json() {
        let mut log = ProgressLog::new();
        log.record_transaction_score("tx-1", 0.42);
        let json = serde_json::to_string(&log).unwrap();
        let back: ProgressLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back.transaction_scores.get("tx-1"), Some(&0.42));
    }
}
