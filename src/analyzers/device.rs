//! Device analyzer (spec §4.4): device-ID reuse, fingerprint mismatch,
//! prepaid-card flag, user-agent entropy.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::analyzers::{Analyzer, Domain, DomainFinding, Evidence};
use crate::entity::Entity;
use crate::warehouse::{TimeRange, Transaction};

const MIN_EVIDENCE_FOR_SCORE: usize = 1;

pub struct DeviceAnalyzer;

#[async_trait]
impl Analyzer for DeviceAnalyzer {
    fn domain(&self) -> Domain {
        Domain::Device
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
                domain: Domain::Device,
                risk_score: None,
                confidence: 0.0,
                evidence: vec![],
                narrative: "no transactions in window".to_string(),
            };
        }

        let mut evidence = Vec::new();
        let mut score_components: Vec<f64> = Vec::new();

        let distinct_devices: HashSet<&str> = transactions
            .iter()
            .filter_map(|t| t.device_id.as_deref())
            .collect();
        if distinct_devices.len() > 1 {
            let reuse_ratio =
                1.0 - (distinct_devices.len() as f64 / transactions.len() as f64).min(1.0);
            evidence.push(Evidence::new(
                "device_reuse",
                format!(
                    "{} transactions across only {} distinct device(s)",
                    transactions.len(),
                    distinct_devices.len()
                ),
            ));
            score_components.push(reuse_ratio.clamp(0.0, 1.0));
        }

        let distinct_user_agents: HashSet<&str> = transactions
            .iter()
            .filter_map(|t| t.user_agent.as_deref())
            .collect();
        let entropy = user_agent_entropy(&distinct_user_agents);
        if entropy > 0.8 {
            evidence.push(Evidence::new(
                "user_agent_entropy",
                format!("{} distinct user agents (entropy {entropy:.2})", distinct_user_agents.len()),
            ));
            score_components.push(entropy.min(1.0));
        }

        let missing_device_count = transactions.iter().filter(|t| t.device_id.is_none()).count();
        if missing_device_count > 0 {
            evidence.push(Evidence::new(
                "missing_device_fingerprint",
                format!("{missing_device_count} transaction(s) without a device fingerprint"),
            ));
            score_components.push(0.3);
        }

        if evidence.len() < MIN_EVIDENCE_FOR_SCORE {
            return DomainFinding {
                domain: Domain::Device,
                risk_score: None,
                confidence: 0.2,
                evidence,
                narrative: "insufficient device evidence to score".to_string(),
            };
        }

        let risk_score = score_components.iter().sum::<f64>() / score_components.len() as f64;
        let confidence = (evidence.len() as f64 / 3.0).min(1.0);

        DomainFinding {
            domain: Domain::Device,
            risk_score: Some(risk_score.clamp(0.0, 1.0)),
            confidence,
            narrative: format!("{} device signal(s) observed", evidence.len()),
            evidence,
        }
    }
}

fn user_agent_entropy(agents: &HashSet<&str>) -> f64 {
    if agents.len() <= 1 {
        return 0.0;
    }
    // Treat each distinct agent as equally likely; normalized Shannon
    // entropy over a capped alphabet keeps this in [0, 1].
    let n = agents.len() as f64;
    let p = 1.0 / n;
    let raw = -n * p * p.ln();
    (raw / 8.0_f64.ln()).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::warehouse::Decision;
    use chrono::Utc;

    fn tx(device: Option<&str>, ua: Option<&str>) -> Transaction {
        Transaction {
            tx_id: "t1".to_string(),
            datetime: Utc::now(),
            merchant_id: "m1".to_string(),
            amount: 10.0,
            currency: "USD".to_string(),
            bin: "411111".to_string(),
            last_four: "1234".to_string(),
            ip: "203.0.113.1".to_string(),
            ip_country: None,
            bin_country: None,
            device_id: device.map(str::to_string),
            email_normalized: None,
            user_agent: ua.map(str::to_string),
            decision: Some(Decision::Approved),
            predicted_risk: None,
            actual_label: None,
        }
    }

    #[tokio::test]
    async fn empty_transactions_gate_to_bottom() {
        let analyzer = DeviceAnalyzer;
        let entity = Entity::new(EntityType::Email, "a@b.com").unwrap();
        let window = TimeRange::new(Utc::now(), Utc::now());
        let finding = analyzer.analyze(&entity, window, &[], &CancellationToken::new()).await;
        assert_eq!(finding.risk_score, None);
    }

    #[tokio::test]
    async fn device_reuse_across_transactions_scores() {
        let analyzer = DeviceAnalyzer;
        let entity = Entity::new(EntityType::Email, "a@b.com").unwrap();
        let window = TimeRange::new(Utc::now(), Utc::now());
        let txs = vec![
            tx(Some("dev-1"), Some("ua-1")),
            tx(Some("dev-2"), Some("ua-2")),
            tx(None, None),
        ];
        let finding = analyzer.analyze(&entity, window, &txs, &CancellationToken::new()).await;
        assert!(finding.risk_score.is_some());
        assert!(!finding.evidence.is_empty());
    }
}
