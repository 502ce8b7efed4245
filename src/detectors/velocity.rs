//! Velocity/reuse detector.
//!
//! For each email, computes `max_tx_per_5min`, `distinct_merchants_per_60min`
//! and `ip_reuse_days`, flagging when `distinct_merchants ≥ 3` OR
//! `tx_per_5min ≥ 3`.

use std::collections::{HashMap, HashSet};

use chrono::Duration;

use crate::detectors::{DetectorResult, Severity};
use crate::warehouse::Transaction;

pub fn detect(transactions: &[Transaction]) -> DetectorResult {
    let mut by_email: HashMap<&str, Vec<&Transaction>> = HashMap::new();
    for tx in transactions {
        if let Some(email) = tx.email_normalized.as_deref() {
            by_email.entry(email).or_default().push(tx);
        }
    }

    let mut evidence = Vec::new();
    let mut max_tx_per_5min = 0usize;
    let mut max_distinct_merchants = 0usize;

    for (email, mut txs) in by_email {
        txs.sort_by_key(|t| t.datetime);

        let tx_per_5min = max_in_window(&txs, Duration::minutes(5));
        let distinct_merchants = max_distinct_merchants_in_window(&txs, Duration::minutes(60));
        let ip_reuse_days = ip_reuse_span_days(&txs);

        max_tx_per_5min = max_tx_per_5min.max(tx_per_5min);
        max_distinct_merchants = max_distinct_merchants.max(distinct_merchants);

        if distinct_merchants >= 3 || tx_per_5min >= 3 {
            evidence.push(format!(
                "{email}: {tx_per_5min} tx/5min, {distinct_merchants} distinct merchants/60min, \
                 ip reused over {ip_reuse_days} day(s)"
            ));
        }
    }

    let detected = !evidence.is_empty();
    let severity = if max_tx_per_5min >= 5 || max_distinct_merchants >= 5 {
        Severity::High
    } else if detected {
        Severity::Medium
    } else {
        Severity::Low
    };

    DetectorResult {
        name: "velocity_reuse",
        detected,
        severity,
        evidence,
    }
}

fn max_in_window(sorted_txs: &[&Transaction], window: Duration) -> usize {
    let mut best = 0;
    for (i, tx) in sorted_txs.iter().enumerate() {
        let mut count = 1;
        for other in &sorted_txs[i + 1..] {
            if other.datetime - tx.datetime <= window {
                count += 1;
            } else {
                break;
            }
        }
        best = best.max(count);
    }
    best
}

fn max_distinct_merchants_in_window(sorted_txs: &[&Transaction], window: Duration) -> usize {
    let mut best = 0;
    for (i, tx) in sorted_txs.iter().enumerate() {
        let mut merchants: HashSet<&str> = HashSet::new();
        merchants.insert(&tx.merchant_id);
        for other in &sorted_txs[i + 1..] {
            if other.datetime - tx.datetime <= window {
                merchants.insert(&other.merchant_id);
            } else {
                break;
            }
        }
        best = best.max(merchants.len());
    }
    best
}

fn ip_reuse_span_days(sorted_txs: &[&Transaction]) -> i64 {
    let mut by_ip: HashMap<&str, (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> =
        HashMap::new();
    for tx in sorted_txs {
        by_ip
            .entry(tx.ip.as_str())
            .and_modify(|(min, max)| {
                if tx.datetime < *min {
                    *min = tx.datetime;
                }
                if tx.datetime > *max {
                    *max = tx.datetime;
                }
            })
            .or_insert((tx.datetime, tx.datetime));
    }
    by_ip
        .values()
        .map(|(min, max)| (*max - *min).num_days())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::Decision;
    use chrono::Utc;

    fn tx(email: &str, merchant: &str, minutes_offset: i64) -> Transaction {
        Transaction {
            tx_id: format!("{email}-{merchant}-{minutes_offset}"),
            datetime: Utc::now() + Duration::minutes(minutes_offset),
            merchant_id: merchant.to_string(),
            amount: 10.0,
            currency: "USD".to_string(),
            bin: "411111".to_string(),
            last_four: "1234".to_string(),
            ip: "203.0.113.1".to_string(),
            ip_country: None,
            bin_country: None,
            device_id: None,
            email_normalized: Some(email.to_string()),
            user_agent: None,
            decision: Some(Decision::Approved),
            predicted_risk: None,
            actual_label: None,
        }
    }

    #[test]
    fn flags_three_distinct_merchants_in_an_hour() {
        let txs = vec![
            tx("a@b.com", "m1", 0),
            tx("a@b.com", "m2", 10),
            tx("a@b.com", "m3", 20),
        ];
        let result = detect(&txs);
        assert!(result.detected);
    }

    #[test]
    fn no_flag_for_sparse_activity() {
        let txs = vec![tx("a@b.com", "m1", 0), tx("a@b.com", "m2", 120)];
        let result = detect(&txs);
        assert!(!result.detected);
    }
}
