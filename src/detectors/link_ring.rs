//! Link-analysis ring detector.
//!
//! Builds an undirected graph over {email, ip-subnet, card fingerprint}
//! (the transaction schema carries no phone column, so the phone-hash
//! node type named in prose has no warehouse-backed realization here);
//! each transaction connects the entity nodes it carries. Connected
//! components of size ≥ 3 whose chargeback rate ≥ 0.3 are flagged as
//! rings.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::detectors::{DetectorResult, Severity};
use crate::warehouse::Transaction;

const MIN_COMPONENT_SIZE: usize = 3;
const CHARGEBACK_RATE_THRESHOLD: f64 = 0.3;

fn card_hash(tx: &Transaction) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tx.bin.as_bytes());
    hasher.update(b"|");
    hasher.update(tx.last_four.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

fn ip_subnet(ip: &str) -> Option<String> {
    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() == 4 {
        Some(format!("{}.{}.{}.0/24", octets[0], octets[1], octets[2]))
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node {
    Email(String),
    IpSubnet(String),
    CardHash(String),
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

pub fn detect(transactions: &[Transaction]) -> DetectorResult {
    let mut node_ids: HashMap<Node, usize> = HashMap::new();
    let mut node_list: Vec<Node> = Vec::new();
    let mut tx_nodes: Vec<Vec<usize>> = Vec::with_capacity(transactions.len());

    let mut node_id = |node: Node, node_ids: &mut HashMap<Node, usize>, node_list: &mut Vec<Node>| {
        *node_ids.entry(node.clone()).or_insert_with(|| {
            node_list.push(node);
            node_list.len() - 1
        })
    };

    for tx in transactions {
        let mut ids = Vec::new();
        if let Some(email) = &tx.email_normalized {
            ids.push(node_id(Node::Email(email.clone()), &mut node_ids, &mut node_list));
        }
        if let Some(subnet) = ip_subnet(&tx.ip) {
            ids.push(node_id(Node::IpSubnet(subnet), &mut node_ids, &mut node_list));
        }
        ids.push(node_id(Node::CardHash(card_hash(tx)), &mut node_ids, &mut node_list));
        tx_nodes.push(ids);
    }

    let mut uf = UnionFind::new(node_list.len());
    for ids in &tx_nodes {
        for pair in ids.windows(2) {
            uf.union(pair[0], pair[1]);
        }
    }

    let mut component_of_tx: Vec<usize> = Vec::with_capacity(transactions.len());
    for ids in &tx_nodes {
        let root = ids.first().map(|&id| uf.find(id)).unwrap_or(0);
        component_of_tx.push(root);
    }

    let mut members_by_component: HashMap<usize, Vec<usize>> = HashMap::new();
    for (tx_idx, root) in component_of_tx.iter().enumerate() {
        members_by_component.entry(*root).or_default().push(tx_idx);
    }

    let mut evidence = Vec::new();
    let mut worst_severity = Severity::Low;

    for (_, tx_indices) in members_by_component {
        // Distinct entity nodes in this component, not transaction count.
        let distinct_nodes: std::collections::HashSet<usize> = tx_indices
            .iter()
            .flat_map(|&i| tx_nodes[i].iter().copied())
            .collect();
        if distinct_nodes.len() < MIN_COMPONENT_SIZE {
            continue;
        }

        let labeled: Vec<bool> = tx_indices
            .iter()
            .filter_map(|&i| transactions[i].actual_label)
            .collect();
        if labeled.is_empty() {
            continue;
        }
        let chargeback_rate =
            labeled.iter().filter(|l| **l).count() as f64 / labeled.len() as f64;

        if chargeback_rate >= CHARGEBACK_RATE_THRESHOLD {
            evidence.push(format!(
                "ring of {} entities / {} transactions, chargeback rate {:.2}",
                distinct_nodes.len(),
                tx_indices.len(),
                chargeback_rate
            ));
            worst_severity = if chargeback_rate >= 0.6 {
                Severity::High
            } else {
                Severity::Medium
            };
        }
    }

    DetectorResult {
        name: "link_analysis_ring",
        detected: !evidence.is_empty(),
        severity: worst_severity,
        evidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::Decision;
    use chrono::Utc;

    fn tx(email: &str, ip: &str, bin: &str, last4: &str, label: Option<bool>) -> Transaction {
        Transaction {
            tx_id: format!("{email}-{ip}"),
            datetime: Utc::now(),
            merchant_id: "m1".to_string(),
            amount: 10.0,
            currency: "USD".to_string(),
            bin: bin.to_string(),
            last_four: last4.to_string(),
            ip: ip.to_string(),
            ip_country: None,
            bin_country: None,
            device_id: None,
            email_normalized: Some(email.to_string()),
            user_agent: None,
            decision: Some(Decision::Approved),
            predicted_risk: None,
            actual_label: label,
        }
    }

    #[test]
    fn flags_ring_with_high_chargeback_rate() {
        // Three emails sharing the same IP subnet and card, mostly charged back.
        let txs = vec![
            tx("a@x.com", "203.0.113.1", "411111", "1234", Some(true)),
            tx("b@x.com", "203.0.113.2", "411111", "1234", Some(true)),
            tx("c@x.com", "203.0.113.3", "411111", "1234", Some(false)),
        ];
        let result = detect(&txs);
        assert!(result.detected);
    }

    #[test]
    fn no_flag_for_isolated_transactions() {
        let txs = vec![
            tx("a@x.com", "203.0.113.1", "411111", "1234", Some(true)),
            tx("b@y.com", "198.51.100.1", "422222", "5678", Some(true)),
        ];
        let result = detect(&txs);
        assert!(!result.detected);
    }
}
