//! Location analyzer (spec §4.4): IP country vs BIN country mismatch, and
//! impossible-travel speed between transactions sharing a device or card.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::analyzers::{Analyzer, Domain, DomainFinding, Evidence};
use crate::detectors::geo;
use crate::entity::Entity;
use crate::warehouse::{TimeRange, Transaction};

pub struct LocationAnalyzer;

#[async_trait]
impl Analyzer for LocationAnalyzer {
    fn domain(&self) -> Domain {
        Domain::Location
    }

    async fn analyze(
        &self,
        _entity: &Entity,
        _window: TimeRange,
        transactions: &[Transaction],
        _cancel: &CancellationToken,
    ) -> DomainFinding {
        if transactions.is_empty() {
            return DomainFinding {
                domain: Domain::Location,
                risk_score: None,
                confidence: 0.0,
                evidence: vec![],
                narrative: "no transactions in window".to_string(),
            };
        }

        let mut evidence = Vec::new();
        let mut score_components = Vec::new();

        let mismatches = transactions
            .iter()
            .filter(|t| match (&t.ip_country, &t.bin_country) {
                (Some(a), Some(b)) => a != b,
                _ => false,
            })
            .count();
        if mismatches > 0 {
            evidence.push(Evidence::new(
                "ip_bin_country_mismatch",
                format!("{mismatches}/{} transaction(s) with IP country ≠ BIN country", transactions.len()),
            ));
            score_components.push((mismatches as f64 / transactions.len() as f64).min(1.0));
        }

        let travel = geo::detect(transactions);
        if travel.detected {
            for e in &travel.evidence {
                evidence.push(Evidence::new("impossible_travel", e.clone()));
            }
            score_components.push(match travel.severity {
                crate::detectors::Severity::High => 0.9,
                crate::detectors::Severity::Medium => 0.6,
                crate::detectors::Severity::Low => 0.3,
            });
        }

        if score_components.is_empty() {
            return DomainFinding {
                domain: Domain::Location,
                risk_score: None,
                confidence: 0.2,
                evidence,
                narrative: "insufficient location evidence to score".to_string(),
            };
        }

        let risk_score = score_components.iter().sum::<f64>() / score_components.len() as f64;
        let confidence = (evidence.len() as f64 / 2.0).min(1.0);

        DomainFinding {
            domain: Domain::Location,
            risk_score: Some(risk_score.clamp(0.0, 1.0)),
            confidence,
            narrative: format!("{} location signal(s) observed", evidence.len()),
            evidence,
        }
    }
}
