//! Logs analyzer (spec §4.4): SIEM query (external collaborator, e.g.
//! Splunk) for the entity over the window.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::analyzers::{Analyzer, Domain, DomainFinding, Evidence};
use crate::entity::Entity;
use crate::warehouse::{TimeRange, Transaction};

/// A SIEM event surfaced by the external log collaborator.
#[derive(Debug, Clone)]
pub struct SiemEvent {
    pub rule_name: String,
    pub severity: String,
    pub detail: String,
}

/// SIEM client (Splunk or similar). Out of core scope per spec §1 — the
/// analyzer only depends on this interface, and the raw response is
/// recorded as evidence for replay.
#[async_trait]
pub trait SiemProvider: Send + Sync {
    async fn query(
        &self,
        entity: &Entity,
        window: TimeRange,
    ) -> crate::error::Result<Vec<SiemEvent>>;
}

pub struct LogsAnalyzer {
    siem: Option<Arc<dyn SiemProvider>>,
}

impl LogsAnalyzer {
    pub fn new(siem: Option<Arc<dyn SiemProvider>>) -> Self {
        Self { siem }
    }
}

#[async_trait]
impl Analyzer for LogsAnalyzer {
    fn domain(&self) -> Domain {
        Domain::Logs
    }

    async fn analyze(
        &self,
        entity: &Entity,
        window: TimeRange,
        _transactions: &[Transaction],
        cancel: &CancellationToken,
    ) -> DomainFinding {
        let Some(siem) = &self.siem else {
            return DomainFinding {
                domain: Domain::Logs,
                risk_score: None,
                confidence: 0.0,
                evidence: vec![],
                narrative: "no SIEM collaborator configured".to_string(),
            };
        };

        if cancel.is_cancelled() {
            return DomainFinding::failure(Domain::Logs, "cancelled before SIEM query");
        }

        match siem.query(entity, window).await {
            Ok(events) if events.is_empty() => DomainFinding {
                domain: Domain::Logs,
                risk_score: None,
                confidence: 0.2,
                evidence: vec![],
                narrative: "no SIEM events in window".to_string(),
            },
            Ok(events) => {
                let evidence: Vec<Evidence> = events
                    .iter()
                    .map(|e| Evidence::new(e.rule_name.clone(), e.detail.clone()).with_severity(e.severity.clone()))
                    .collect();
                let high = events.iter().filter(|e| e.severity.eq_ignore_ascii_case("high")).count();
                let risk_score = if high > 0 {
                    0.8
                } else {
                    (events.len() as f64 / 10.0).min(0.6)
                };
                DomainFinding {
                    domain: Domain::Logs,
                    risk_score: Some(risk_score),
                    confidence: (events.len() as f64 / 3.0).min(1.0),
                    narrative: format!("{} SIEM event(s) in window", events.len()),
                    evidence,
                }
            }
            Err(e) => DomainFinding::failure(Domain::Logs, format!("SIEM query failed: {e}")),
        }
    }
}
