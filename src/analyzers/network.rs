//! Network analyzer (spec §4.4): IP reputation (external collaborator),
//! VPN/proxy signals, ASN diversity.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::analyzers::{Analyzer, Domain, DomainFinding, Evidence};
use crate::entity::Entity;
use crate::warehouse::{TimeRange, Transaction};

/// Third-party IP reputation / VPN-proxy intelligence (AbuseIPDB, VirtulTotal,
/// Shodan, etc. — spec §1 explicitly scopes these clients out of the core;
/// the analyzer only depends on this narrow interface). Responses are
/// recorded as evidence so a replayed investigation sees the same input.
#[async_trait]
pub trait IpReputationProvider: Send + Sync {
    async fn lookup(&self, ip: &str) -> crate::error::Result<IpReputation>;
}

#[derive(Debug, Clone, Default)]
pub struct IpReputation {
    pub abuse_score: u8, // 0-100
    pub is_vpn_or_proxy: bool,
    pub asn: Option<String>,
}

pub struct NetworkAnalyzer {
    reputation: Option<Arc<dyn IpReputationProvider>>,
}

impl NetworkAnalyzer {
    pub fn new(reputation: Option<Arc<dyn IpReputationProvider>>) -> Self {
        Self { reputation }
    }
}

#[async_trait]
impl Analyzer for NetworkAnalyzer {
    fn domain(&self) -> Domain {
        Domain::Network
    }

    async fn analyze(
        &self,
        _entity: &Entity,
        _window: TimeRange,
        transactions: &[Transaction],
        cancel: &CancellationToken,
    ) -> DomainFinding {
        if transactions.is_empty() {
            return DomainFinding {
                domain: Domain::Network,
                risk_score: None,
                confidence: 0.0,
                evidence: vec![],
                narrative: "no transactions in window".to_string(),
            };
        }

        let mut evidence = Vec::new();
        let mut score_components = Vec::new();

        let distinct_ips: HashSet<&str> = transactions.iter().map(|t| t.ip.as_str()).collect();
        if distinct_ips.len() > 1 {
            let diversity = (distinct_ips.len() as f64 / transactions.len() as f64).min(1.0);
            evidence.push(Evidence::new(
                "ip_diversity",
                format!("{} distinct IPs across {} transactions", distinct_ips.len(), transactions.len()),
            ));
            score_components.push(diversity);
        }

        if let Some(provider) = &self.reputation {
            let mut vpn_hits = 0usize;
            let mut high_abuse_hits = 0usize;
            let mut asns: HashSet<String> = HashSet::new();

            for ip in &distinct_ips {
                if cancel.is_cancelled() {
                    return DomainFinding::failure(Domain::Network, "cancelled mid-lookup");
                }
                match provider.lookup(ip).await {
                    Ok(rep) => {
                        if rep.is_vpn_or_proxy {
                            vpn_hits += 1;
                        }
                        if rep.abuse_score >= 50 {
                            high_abuse_hits += 1;
                        }
                        if let Some(asn) = rep.asn {
                            asns.insert(asn);
                        }
                    }
                    Err(e) => {
                        evidence.push(Evidence::analyzer_failure(format!(
                            "ip reputation lookup failed for {ip}: {e}"
                        )));
                    }
                }
            }

            if vpn_hits > 0 {
                evidence.push(Evidence::new(
                    "vpn_or_proxy",
                    format!("{vpn_hits}/{} IPs flagged as VPN/proxy", distinct_ips.len()),
                ));
                score_components.push((vpn_hits as f64 / distinct_ips.len() as f64).min(1.0));
            }
            if high_abuse_hits > 0 {
                evidence.push(Evidence::new(
                    "ip_abuse_score",
                    format!("{high_abuse_hits}/{} IPs with abuse score ≥ 50", distinct_ips.len()),
                ));
                score_components.push(1.0);
            }
            if asns.len() > 2 {
                evidence.push(Evidence::new(
                    "asn_diversity",
                    format!("{} distinct ASNs observed", asns.len()),
                ));
                score_components.push(0.5);
            }
        }

        if score_components.is_empty() {
            return DomainFinding {
                domain: Domain::Network,
                risk_score: None,
                confidence: 0.2,
                evidence,
                narrative: "insufficient network evidence to score".to_string(),
            };
        }

        let risk_score = score_components.iter().sum::<f64>() / score_components.len() as f64;
        let confidence = (evidence.len() as f64 / 3.0).min(1.0);

        DomainFinding {
            domain: Domain::Network,
            risk_score: Some(risk_score.clamp(0.0, 1.0)),
            confidence,
            narrative: format!("{} network signal(s) observed", evidence.len()),
            evidence,
        }
    }
}
