//! Merchant-local anomaly detector.
//!
//! Compares the investigated window against a per-merchant baseline along
//! three axes: average-order-value z-score, BIN-mix KL drift, and
//! night-hour ratio. Suppressed entirely when the transacting customer has
//! tenure ≥ 90 days (avoids chasing healthy growth) and must never run
//! when the investigated entity IS the merchant (natural concentration is
//! not anomalous — the mapper/risk analyzer enforces this by not calling
//! `detect` at all in that case, but the check is repeated here as a
//! belt-and-braces guard since this module is also unit-testable in
//! isolation).

use std::collections::HashMap;

use crate::detectors::{DetectorResult, Severity};
use crate::warehouse::Transaction;

const TENURE_SUPPRESSION_DAYS: i64 = 90;
const Z_SCORE_THRESHOLD: f64 = 3.0;
const KL_THRESHOLD: f64 = 0.5;
const NIGHT_RATIO_DEVIATION_THRESHOLD: f64 = 0.25;

/// Historical baseline for a merchant, computed over a prior (non-window)
/// period. Supplied by the caller — this module has no warehouse access.
#[derive(Debug, Clone)]
pub struct MerchantBaseline {
    pub mean_amount: f64,
    pub std_amount: f64,
    /// BIN-prefix (first 6 digits) relative frequency.
    pub bin_distribution: HashMap<String, f64>,
    pub night_hour_ratio: f64,
}

fn is_night_hour(hour: u32) -> bool {
    !(6..22).contains(&hour)
}

fn kl_divergence(p: &HashMap<String, f64>, q: &HashMap<String, f64>) -> f64 {
    const EPS: f64 = 1e-6;
    let mut total = 0.0;
    for (key, p_i) in p {
        if *p_i <= 0.0 {
            continue;
        }
        let q_i = q.get(key).copied().unwrap_or(EPS).max(EPS);
        total += p_i * (p_i / q_i).ln();
    }
    total
}

pub fn detect(
    transactions: &[Transaction],
    baseline: &MerchantBaseline,
    investigated_entity_is_merchant: bool,
    customer_tenure_days: Option<i64>,
) -> DetectorResult {
    if investigated_entity_is_merchant {
        return DetectorResult::clear("merchant_local_anomaly");
    }
    if customer_tenure_days.unwrap_or(0) >= TENURE_SUPPRESSION_DAYS {
        return DetectorResult::clear("merchant_local_anomaly");
    }
    if transactions.is_empty() {
        return DetectorResult::clear("merchant_local_anomaly");
    }

    let mut evidence = Vec::new();
    let mut worst_severity = Severity::Low;

    let n = transactions.len() as f64;
    let mean_amount: f64 = transactions.iter().map(|t| t.amount).sum::<f64>() / n;
    let z_score = if baseline.std_amount > 0.0 {
        (mean_amount - baseline.mean_amount) / baseline.std_amount
    } else {
        0.0
    };
    if z_score.abs() >= Z_SCORE_THRESHOLD {
        evidence.push(format!(
            "AOV z-score {z_score:.2} (window mean {mean_amount:.2} vs baseline {:.2}±{:.2})",
            baseline.mean_amount, baseline.std_amount
        ));
        worst_severity = Severity::Medium;
    }

    let mut bin_counts: HashMap<String, f64> = HashMap::new();
    for tx in transactions {
        let prefix = tx.bin.chars().take(6).collect::<String>();
        *bin_counts.entry(prefix).or_insert(0.0) += 1.0;
    }
    for count in bin_counts.values_mut() {
        *count /= n;
    }
    let kl = kl_divergence(&bin_counts, &baseline.bin_distribution);
    if kl >= KL_THRESHOLD {
        evidence.push(format!("BIN-mix KL drift {kl:.3}"));
        worst_severity = Severity::Medium;
    }

    let night_count = transactions
        .iter()
        .filter(|t| is_night_hour(t.datetime.format("%H").to_string().parse().unwrap_or(12)))
        .count() as f64;
    let night_ratio = night_count / n;
    if (night_ratio - baseline.night_hour_ratio).abs() >= NIGHT_RATIO_DEVIATION_THRESHOLD {
        evidence.push(format!(
            "night-hour ratio {night_ratio:.2} vs baseline {:.2}",
            baseline.night_hour_ratio
        ));
        worst_severity = Severity::Medium;
    }

    if z_score.abs() >= Z_SCORE_THRESHOLD * 2.0 || kl >= KL_THRESHOLD * 2.0 {
        worst_severity = Severity::High;
    }

    DetectorResult {
        name: "merchant_local_anomaly",
        detected: !evidence.is_empty(),
        severity: worst_severity,
        evidence,
    }
}
