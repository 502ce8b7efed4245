//! Confusion matrix, derived metrics, Wilson confidence intervals, and
//! the risk histogram.
//!
//! Grounded on `metrics_calculation.py` (`compute_confusion_matrix`,
//! `compute_derived_metrics`, `compute_histogram`, the `power_dict` status
//! the original attaches alongside each window's metrics).

use serde::{Deserialize, Serialize};

use crate::warehouse::Transaction;

/// 95% two-sided Wilson z-score.
const WILSON_Z_95: f64 = 1.959963985;

/// CI width above which the comparison engine warns "low power".
const LOW_POWER_CI_WIDTH: f64 = 0.10;

/// Below this many actual frauds, a window's precision/recall estimates
/// are considered statistically unreliable regardless of CI width
/// (`metrics_calculation.py`'s `power_dict` reason).
const LOW_POWER_MIN_FRAUDS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_count: usize,
    /// Transactions excluded from the matrix entirely: missing predicted
    /// score or missing label. Which decisions reach the matrix at all is
    /// governed upstream by the gateway/mapper's `DecisionFilter` mode.
    pub excluded: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_count + self.excluded
    }

    pub fn scored_total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_count
    }
}

/// Build the confusion matrix for `transactions` at `risk_threshold`.
/// Transactions failing [`Transaction::eligible_for_confusion_matrix`]
/// are counted in `excluded`, never imputed.
pub fn compute_confusion_matrix(transactions: &[Transaction], risk_threshold: f64) -> ConfusionMatrix {
    let mut m = ConfusionMatrix::default();
    for tx in transactions {
        if !tx.eligible_for_confusion_matrix() {
            m.excluded += 1;
            continue;
        }
        let predicted_positive = tx.predicted_risk.unwrap() >= risk_threshold;
        let actual_positive = tx.actual_label.unwrap();
        match (predicted_positive, actual_positive) {
            (true, true) => m.tp += 1,
            (true, false) => m.fp += 1,
            (false, true) => m.fn_count += 1,
            (false, false) => m.tn += 1,
        }
    }
    m
}

/// `(low, high)` Wilson interval for `successes/total`.
pub fn wilson_interval(successes: usize, total: usize) -> (f64, f64) {
    if total == 0 {
        return (0.0, 0.0);
    }
    let n = total as f64;
    let p_hat = successes as f64 / n;
    let z2 = WILSON_Z_95 * WILSON_Z_95;
    let denom = 1.0 + z2 / n;
    let center = p_hat + z2 / (2.0 * n);
    let margin = WILSON_Z_95 * ((p_hat * (1.0 - p_hat) / n) + z2 / (4.0 * n * n)).sqrt();
    (((center - margin) / denom).max(0.0), ((center + margin) / denom).min(1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricWithCi {
    pub value: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

impl MetricWithCi {
    fn from_ratio(successes: usize, total: usize) -> Self {
        let value = if total == 0 { 0.0 } else { successes as f64 / total as f64 };
        let (ci_low, ci_high) = wilson_interval(successes, total);
        Self { value, ci_low, ci_high }
    }

    pub fn ci_width(&self) -> f64 {
        self.ci_high - self.ci_low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerStatus {
    Stable,
    LowPower,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerAssessment {
    pub status: PowerStatus,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub precision: MetricWithCi,
    pub recall: MetricWithCi,
    pub f1: f64,
    pub accuracy: MetricWithCi,
    pub fraud_rate: f64,
    pub power: PowerAssessment,
}

/// Compute precision/recall/F1/accuracy/fraud_rate plus Wilson CIs and the
/// power assessment.
pub fn derived_metrics(matrix: ConfusionMatrix) -> DerivedMetrics {
    let precision = MetricWithCi::from_ratio(matrix.tp, matrix.tp + matrix.fp);
    let recall = MetricWithCi::from_ratio(matrix.tp, matrix.tp + matrix.fn_count);
    let accuracy = MetricWithCi::from_ratio(matrix.tp + matrix.tn, matrix.scored_total());
    let f1 = if precision.value + recall.value > 0.0 {
        2.0 * precision.value * recall.value / (precision.value + recall.value)
    } else {
        0.0
    };
    let actual_frauds = matrix.tp + matrix.fn_count;
    let fraud_rate = if matrix.scored_total() > 0 {
        actual_frauds as f64 / matrix.scored_total() as f64
    } else {
        0.0
    };

    let mut reasons = Vec::new();
    for (name, metric) in [("precision", &precision), ("recall", &recall), ("accuracy", &accuracy)] {
        if metric.ci_width() > LOW_POWER_CI_WIDTH {
            reasons.push(format!("{name} CI width {:.3} exceeds {LOW_POWER_CI_WIDTH}", metric.ci_width()));
        }
    }
    if actual_frauds < LOW_POWER_MIN_FRAUDS {
        reasons.push(format!("actual_frauds<{LOW_POWER_MIN_FRAUDS}"));
    }
    let status = if reasons.is_empty() { PowerStatus::Stable } else { PowerStatus::LowPower };

    DerivedMetrics {
        precision,
        recall,
        f1,
        accuracy,
        fraud_rate,
        power: PowerAssessment { status, reasons },
    }
}

/// Metric deltas `B − A`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricDeltas {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
    pub fraud_rate: f64,
}

pub fn metric_deltas(a: &DerivedMetrics, b: &DerivedMetrics) -> MetricDeltas {
    MetricDeltas {
        precision: b.precision.value - a.precision.value,
        recall: b.recall.value - a.recall.value,
        f1: b.f1 - a.f1,
        accuracy: b.accuracy.value - a.accuracy.value,
        fraud_rate: b.fraud_rate - a.fraud_rate,
    }
}

/// A 10-bin histogram of `predicted_risk` over `[0,1]`, sharing its bin
/// count with the drift statistics.
pub const HISTOGRAM_BINS: usize = 10;

pub fn histogram(transactions: &[Transaction]) -> Vec<usize> {
    let mut counts = vec![0usize; HISTOGRAM_BINS];
    for tx in transactions {
        if let Some(score) = tx.predicted_risk {
            let idx = ((score.clamp(0.0, 1.0) * HISTOGRAM_BINS as f64) as usize).min(HISTOGRAM_BINS - 1);
            counts[idx] += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::Decision;
    use chrono::Utc;

    fn tx(predicted: Option<f64>, actual: Option<bool>, decision: Option<Decision>) -> Transaction {
        Transaction {
            tx_id: "t".to_string(),
            datetime: Utc::now(),
            merchant_id: "m".to_string(),
            amount: 1.0,
            currency: "USD".to_string(),
            bin: "411111".to_string(),
            last_four: "1234".to_string(),
            ip: "203.0.113.1".to_string(),
            ip_country: None,
            bin_country: None,
            device_id: None,
            email_normalized: None,
            user_agent: None,
            decision,
            predicted_risk: predicted,
            actual_label: actual,
        }
    }

    #[test]
    fn confusion_matrix_closure_holds() {
        let txs = vec![
            tx(Some(0.9), Some(true), Some(Decision::Approved)),
            tx(Some(0.1), Some(false), Some(Decision::Approved)),
            tx(Some(0.8), Some(false), Some(Decision::Approved)),
            tx(Some(0.2), Some(true), Some(Decision::Approved)),
            tx(None, Some(true), Some(Decision::Approved)),
            tx(Some(0.5), None, Some(Decision::Approved)),
            tx(Some(0.5), Some(true), Some(Decision::Rejected)),
        ];
        let matrix = compute_confusion_matrix(&txs, 0.3);
        assert_eq!(matrix.total(), txs.len());
        // Decision is not re-checked here (spec §4.2): the Rejected-decision
        // row still has both a predicted score and a label, so it scores
        // as a TP rather than being excluded. Which decisions reach this
        // function at all is the gateway/mapper's job.
        assert_eq!(matrix.tp, 2);
        assert_eq!(matrix.fp, 1);
        assert_eq!(matrix.tn, 1);
        assert_eq!(matrix.fn_count, 1);
        assert_eq!(matrix.excluded, 2);
    }

    #[test]
    fn null_decision_with_valid_label_is_not_excluded() {
        // spec §4.2 rationale: IS_FRAUD labels may be populated for
        // historically-approved transactions whose decision column has
        // since been nulled; the confusion matrix must still count them.
        let txs = vec![tx(Some(0.7), Some(true), None)];
        let matrix = compute_confusion_matrix(&txs, 0.3);
        assert_eq!(matrix.tp, 1);
        assert_eq!(matrix.excluded, 0);
    }

    #[test]
    fn precision_recall_f1_example_scenario() {
        // precision=8/10, recall=8/8, F1=0.888...
        let matrix = ConfusionMatrix { tp: 8, fp: 2, tn: 30, fn_count: 0, excluded: 0 };
        let metrics = derived_metrics(matrix);
        assert!((metrics.precision.value - 0.8).abs() < 1e-9);
        assert!((metrics.recall.value - 1.0).abs() < 1e-9);
        assert!((metrics.f1 - 0.8888888888888888).abs() < 1e-9);
    }

    #[test]
    fn low_power_flagged_under_five_frauds() {
        let matrix = ConfusionMatrix { tp: 2, fp: 1, tn: 50, fn_count: 1, excluded: 0 };
        let metrics = derived_metrics(matrix);
        assert_eq!(metrics.power.status, PowerStatus::LowPower);
        assert!(metrics.power.reasons.iter().any(|r| r.contains("actual_frauds<5")));
    }

    #[test]
    fn wilson_interval_widens_for_small_samples() {
        let (low_small, high_small) = wilson_interval(1, 2);
        let (low_large, high_large) = wilson_interval(500, 1000);
        assert!((high_small - low_small) > (high_large - low_large));
    }
}
