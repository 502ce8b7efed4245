//! Risk analyzer (spec §4.4): invokes the post-hoc detectors over the
//! transaction set and emits their aggregate as a single `DomainFinding`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::analyzers::{Analyzer, Domain, DomainFinding, Evidence};
use crate::detectors::merchant_anomaly::MerchantBaseline;
use crate::detectors::{geo, link_ring, merchant_anomaly, velocity, DetectorResult};
use crate::entity::{Entity, EntityType};
use crate::warehouse::{TimeRange, Transaction};

/// Supplies the per-merchant baseline the merchant-anomaly detector
/// compares against, and customer tenure used for its suppression rule.
/// Both are out-of-core lookups (prior-period aggregates, account
/// history) injected at analyzer construction.
#[async_trait]
pub trait RiskContextProvider: Send + Sync {
    async fn merchant_baseline(
        &self,
        merchant_id: &str,
    ) -> crate::error::Result<Option<MerchantBaseline>>;

    async fn customer_tenure_days(
        &self,
        entity: &Entity,
    ) -> crate::error::Result<Option<i64>>;
}

pub struct RiskAnalyzer {
    context: Option<Arc<dyn RiskContextProvider>>,
}

impl RiskAnalyzer {
    pub fn new(context: Option<Arc<dyn RiskContextProvider>>) -> Self {
        Self { context }
    }
}

/// Fixed per-detector contribution to the Risk domain's aggregate score,
/// summed and capped at 1.0 (`run_all_posthoc_detectors`'s weighting),
/// independent of the severity the detector reports. Severity still rides
/// along on the evidence for the narrative; it does not scale the weight.
const VELOCITY_WEIGHT: f64 = 0.3;
const GEO_WEIGHT: f64 = 0.3;
const MERCHANT_ANOMALY_WEIGHT: f64 = 0.2;
const LINK_RING_WEIGHT: f64 = 0.4;

fn push_detector_evidence(evidence: &mut Vec<Evidence>, weights: &mut Vec<f64>, result: &DetectorResult, weight: f64) {
    if !result.detected {
        return;
    }
    for e in &result.evidence {
        evidence.push(
            Evidence::new(result.name, e.clone())
                .with_severity(format!("{:?}", result.severity).to_lowercase()),
        );
    }
    weights.push(weight);
}

#[async_trait]
impl Analyzer for RiskAnalyzer {
    fn domain(&self) -> Domain {
        Domain::Risk
    }

    async fn analyze(
        &self,
        entity: &Entity,
        _window: TimeRange,
        transactions: &[Transaction],
        cancel: &CancellationToken,
    ) -> DomainFinding {
        if transactions.is_empty() {
            return DomainFinding {
                domain: Domain::Risk,
                risk_score: None,
                confidence: 0.0,
                evidence: vec![],
                narrative: "no transactions in window".to_string(),
            };
        }

        let mut evidence = Vec::new();
        let mut weights = Vec::new();

        push_detector_evidence(&mut evidence, &mut weights, &velocity::detect(transactions), VELOCITY_WEIGHT);

        if cancel.is_cancelled() {
            return DomainFinding::failure(Domain::Risk, "cancelled mid-detector-run");
        }
        push_detector_evidence(&mut evidence, &mut weights, &geo::detect(transactions), GEO_WEIGHT);
        push_detector_evidence(&mut evidence, &mut weights, &link_ring::detect(transactions), LINK_RING_WEIGHT);

        // Merchant-local anomaly: suppressed entirely when the investigated
        // entity IS the merchant (spec §4.5 #3, §4.8 "critical contract").
        let is_merchant_entity = entity.entity_type == EntityType::Merchant;
        if !is_merchant_entity {
            if let Some(context) = &self.context {
                let merchant_ids: std::collections::HashSet<&str> =
                    transactions.iter().map(|t| t.merchant_id.as_str()).collect();
                for merchant_id in merchant_ids {
                    if cancel.is_cancelled() {
                        return DomainFinding::failure(Domain::Risk, "cancelled mid-detector-run");
                    }
                    let baseline = context.merchant_baseline(merchant_id).await;
                    let tenure = context.customer_tenure_days(entity).await;
                    if let (Ok(Some(baseline)), Ok(tenure)) = (baseline, tenure) {
                        let merchant_txs: Vec<Transaction> = transactions
                            .iter()
                            .filter(|t| t.merchant_id == merchant_id)
                            .cloned()
                            .collect();
                        let result = merchant_anomaly::detect(&merchant_txs, &baseline, false, tenure);
                        push_detector_evidence(&mut evidence, &mut weights, &result, MERCHANT_ANOMALY_WEIGHT);
                    }
                }
            }
        }

        if weights.is_empty() {
            return DomainFinding {
                domain: Domain::Risk,
                risk_score: None,
                confidence: 0.2,
                evidence,
                narrative: "no post-hoc detector fired".to_string(),
            };
        }

        // Sum of fixed per-detector weights, capped at 1.0
        // (`run_all_posthoc_detectors`'s weighting), not a max over
        // severity: multiple corroborating detectors should push the
        // score higher than any single one alone.
        let risk_score: f64 = weights.iter().sum::<f64>().min(1.0);
        let confidence = (evidence.len() as f64 / 3.0).min(1.0);

        DomainFinding {
            domain: Domain::Risk,
            risk_score: Some(risk_score.clamp(0.0, 1.0)),
            confidence,
            narrative: format!("{} post-hoc detector signal(s)", evidence.len()),
            evidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::warehouse::Decision;
    use chrono::{Duration, Utc};

    fn tx(id: &str, email: &str, offset_secs: i64) -> Transaction {
        Transaction {
            tx_id: id.to_string(),
            datetime: Utc::now() + Duration::seconds(offset_secs),
            merchant_id: "m1".to_string(),
            amount: 10.0,
            currency: "USD".to_string(),
            bin: "411111".to_string(),
            last_four: "1234".to_string(),
            ip: "203.0.113.1".to_string(),
            ip_country: Some("US".to_string()),
            bin_country: Some("US".to_string()),
            device_id: None,
            email_normalized: Some(email.to_string()),
            user_agent: None,
            decision: Some(Decision::Approved),
            predicted_risk: None,
            actual_label: None,
        }
    }

    #[tokio::test]
    async fn single_velocity_hit_contributes_only_its_fixed_weight() {
        // Five transactions for the same email inside a 5-minute window
        // trips velocity/reuse at high severity. Geo (same ip_country,
        // zero distance) and link-ring (no actual_label, so chargeback
        // rate is unevaluable) stay silent; merchant anomaly is skipped
        // (no context provider). The aggregate must equal the velocity
        // detector's fixed weight, not 1.0 — severity does not scale it.
        let analyzer = RiskAnalyzer::new(None);
        let entity = Entity::new(EntityType::Email, "fraudster@example.com").unwrap();
        let window = TimeRange::new(Utc::now(), Utc::now());
        let txs: Vec<Transaction> =
            (0..5).map(|i| tx(&format!("t{i}"), "fraudster@example.com", i * 30)).collect();

        let finding = analyzer.analyze(&entity, window, &txs, &CancellationToken::new()).await;

        assert_eq!(finding.risk_score, Some(VELOCITY_WEIGHT));
    }

    #[tokio::test]
    async fn no_detectors_fire_gates_to_bottom() {
        let analyzer = RiskAnalyzer::new(None);
        let entity = Entity::new(EntityType::Email, "quiet@example.com").unwrap();
        let window = TimeRange::new(Utc::now(), Utc::now());
        let txs = vec![tx("t1", "quiet@example.com", 0)];

        let finding = analyzer.analyze(&entity, window, &txs, &CancellationToken::new()).await;

        assert_eq!(finding.risk_score, None);
    }
}
