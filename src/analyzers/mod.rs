//! Domain Analyzers (spec §4.4): device, network, location, logs, risk.
//!
//! Each analyzer implements the same `analyze` contract and returns a
//! `DomainFinding`. An analyzer that raises never aborts the investigation
//! — failure is local and becomes evidence (§4.6, §7).

pub mod device;
pub mod location;
pub mod logs;
pub mod network;
pub mod risk;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::entity::Entity;
use crate::warehouse::{Transaction, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Device,
    Network,
    Location,
    Logs,
    Risk,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Device,
        Domain::Network,
        Domain::Location,
        Domain::Logs,
        Domain::Risk,
    ];

    /// Aggregation weight (spec §4.7).
    pub fn weight(&self) -> f64 {
        match self {
            Domain::Device => 0.2,
            Domain::Network => 0.2,
            Domain::Location => 0.15,
            Domain::Logs => 0.15,
            Domain::Risk => 0.3,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Domain::Device => "device",
            Domain::Network => "network",
            Domain::Location => "location",
            Domain::Logs => "logs",
            Domain::Risk => "risk",
        };
        write!(f, "{s}")
    }
}

/// A single piece of supporting evidence attached to a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub evidence_type: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl Evidence {
    pub fn new(evidence_type: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            evidence_type: evidence_type.into(),
            detail: detail.into(),
            severity: None,
        }
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn analyzer_failure(detail: impl Into<String>) -> Self {
        Self::new("analyzer_failure", detail)
    }
}

/// `DomainFinding` (spec §3). `risk_score = None` is `⊥` — "blocked by
/// evidence gating" — and is semantically different from `Some(0.0)`; it
/// must propagate through aggregation rather than being treated as a
/// score of zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainFinding {
    pub domain: Domain,
    pub risk_score: Option<f64>,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub narrative: String,
}

impl DomainFinding {
    pub fn failure(domain: Domain, detail: impl Into<String>) -> Self {
        Self {
            domain,
            risk_score: None,
            confidence: 0.0,
            evidence: vec![Evidence::analyzer_failure(detail)],
            narrative: String::new(),
        }
    }
}

/// The shared analyzer contract (spec §4.4). Every analyzer call returns a
/// future that honors `cancel`; deterministic apart from external
/// collaborators, whose raw responses are recorded in evidence for replay.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn domain(&self) -> Domain;

    async fn analyze(
        &self,
        entity: &Entity,
        window: TimeRange,
        transactions: &[Transaction],
        cancel: &CancellationToken,
    ) -> DomainFinding;
}

/// Run an analyzer, converting any internal failure into the
/// evidence-gated finding the orchestrator expects — analyzers never
/// propagate a Rust error across the trait boundary (spec: "an analyzer
/// that raises returns `DomainFinding{risk_score=⊥,...}`").
pub async fn run_analyzer(
    analyzer: &dyn Analyzer,
    entity: &Entity,
    window: TimeRange,
    transactions: &[Transaction],
    cancel: &CancellationToken,
) -> DomainFinding {
    if cancel.is_cancelled() {
        return DomainFinding::failure(analyzer.domain(), "cancelled before analyzer ran");
    }
    analyzer.analyze(entity, window, transactions, cancel).await
}
