//! Threshold curves and workload metrics.
//!
//! Grounded on `threshold_curves.py` (precision/recall/F1/alert-count
//! swept across candidate thresholds) and `workload_metrics.py`
//! (`precision@k`, `recall_at_budget`, alerts/day).

use serde::{Deserialize, Serialize};

/// `precision@k` is evaluated at these values of k (`workload_metrics.py`).
pub const PRECISION_AT_K_VALUES: [usize; 3] = [100, 500, 1000];
/// `recall_at_budget` is evaluated at these daily alert budgets
/// (`workload_metrics.py`).
pub const RECALL_BUDGETS: [usize; 3] = [50, 100, 150];

const THRESHOLD_STEPS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub alerts: usize,
}

/// One `(predicted_risk, actual_is_fraud)` pair per scored transaction —
/// the minimal shape threshold/workload math needs, decoupled from the
/// full `Transaction` record.
pub type ScoredOutcome = (f64, bool);

fn sorted_descending(scored: &[ScoredOutcome]) -> Vec<ScoredOutcome> {
    let mut sorted = scored.to_vec();
    sorted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Sweep `THRESHOLD_STEPS + 1` evenly spaced thresholds in `[0, 1]` and
/// compute precision/recall/F1/alert-count at each.
pub fn threshold_curve(scored: &[ScoredOutcome]) -> Vec<ThresholdPoint> {
    let total_positive = scored.iter().filter(|(_, actual)| *actual).count();
    (0..=THRESHOLD_STEPS)
        .map(|i| {
            let threshold = i as f64 / THRESHOLD_STEPS as f64;
            let alerted: Vec<&ScoredOutcome> = scored.iter().filter(|(s, _)| *s >= threshold).collect();
            let tp = alerted.iter().filter(|(_, actual)| *actual).count();
            let precision = if alerted.is_empty() { 0.0 } else { tp as f64 / alerted.len() as f64 };
            let recall = if total_positive == 0 { 0.0 } else { tp as f64 / total_positive as f64 };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ThresholdPoint { threshold, precision, recall, f1, alerts: alerted.len() }
        })
        .collect()
}

/// Precision among the top-`k` highest-scored transactions. `None` when
/// there are no scored transactions at all (k=0 would be degenerate, but
/// `k` here is always one of [`PRECISION_AT_K_VALUES`]).
pub fn precision_at_k(scored: &[ScoredOutcome], k: usize) -> Option<f64> {
    if scored.is_empty() || k == 0 {
        return None;
    }
    let sorted = sorted_descending(scored);
    let take = k.min(sorted.len());
    let positives = sorted.iter().take(take).filter(|(_, actual)| *actual).count();
    Some(positives as f64 / take as f64)
}

/// Fraction of all actual frauds caught within the top-`budget` alerts by
/// score. `None` when the window has zero actual frauds (recall is
/// undefined, not zero).
pub fn recall_at_budget(scored: &[ScoredOutcome], budget: usize) -> Option<f64> {
    let total_positive = scored.iter().filter(|(_, actual)| *actual).count();
    if total_positive == 0 {
        return None;
    }
    let sorted = sorted_descending(scored);
    let take = budget.min(sorted.len());
    let caught = sorted.iter().take(take).filter(|(_, actual)| *actual).count();
    Some(caught as f64 / total_positive as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadMetrics {
    pub precision_at_k: Vec<(usize, Option<f64>)>,
    pub recall_at_budget: Vec<(usize, Option<f64>)>,
    pub alerts_per_day: f64,
}

/// Compute the full workload metrics bundle. `alerts`
/// is the count of transactions whose predicted risk crossed the
/// investigation's risk threshold; `window_days` must be > 0.
pub fn workload_metrics(scored: &[ScoredOutcome], alerts: usize, window_days: f64) -> WorkloadMetrics {
    WorkloadMetrics {
        precision_at_k: PRECISION_AT_K_VALUES.iter().map(|&k| (k, precision_at_k(scored, k))).collect(),
        recall_at_budget: RECALL_BUDGETS.iter().map(|&b| (b, recall_at_budget(scored, b))).collect(),
        alerts_per_day: if window_days > 0.0 { alerts as f64 / window_days } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ScoredOutcome> {
        vec![(0.9, true), (0.8, false), (0.7, true), (0.2, false), (0.1, false)]
    }

    #[test]
    fn precision_at_k_caps_at_available_count() {
        let scored = sample();
        assert_eq!(precision_at_k(&scored, 100), Some(2.0 / 5.0));
    }

    #[test]
    fn recall_at_budget_is_none_with_no_frauds() {
        let scored = vec![(0.5, false), (0.9, false)];
        assert_eq!(recall_at_budget(&scored, 50), None);
    }

    #[test]
    fn threshold_curve_endpoints_are_sane() {
        let scored = sample();
        let curve = threshold_curve(&scored);
        let all_alerted = curve.first().unwrap();
        assert_eq!(all_alerted.alerts, scored.len());
        let none_alerted = curve.last().unwrap();
        assert!(none_alerted.alerts <= 1);
    }
}
