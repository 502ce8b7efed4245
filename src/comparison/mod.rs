//! Window Comparison Engine: compares an entity's fraud
//! metrics between two resolved windows (typically `recent_14d` against a
//! `retro_14d_Nmo_back` baseline), producing confusion-matrix metrics,
//! deltas, drift statistics, workload metrics, and a merchant breakdown.
//!
//! Grounded on `comparison_engine.py`'s top-level `compare` orchestration,
//! which stitches together window resolution, auto-expand, metrics, drift,
//! and threshold/workload computation into one response object.

pub mod drift;
pub mod metrics;
pub mod threshold;
pub mod window;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::warehouse::{Transaction, TimeRange};

pub use drift::MIN_SCORED_FOR_DRIFT;
pub use metrics::{ConfusionMatrix, DerivedMetrics, MetricDeltas};
pub use threshold::{ScoredOutcome, ThresholdPoint, WorkloadMetrics};
pub use window::{AutoExpandMeta, LabeledWindow, MinimumSupport, WindowPreset};

/// Decouples the comparison engine from the concrete mapper/gateway stack
/// so `auto_expand` can re-fetch arbitrarily many candidate windows
/// without the engine owning a warehouse connection itself (grounded on
/// `comparison_engine.py`'s injected `fetch_transactions` callback).
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn transactions_for_window(&self, entity: &Entity, window: TimeRange) -> Result<Vec<Transaction>>;
}

#[derive(Debug, Clone, Copy)]
pub struct ComparisonOptions {
    pub risk_threshold: f64,
    pub support: MinimumSupport,
    pub max_expand_days: i64,
    pub label_maturity_days: i64,
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self {
            risk_threshold: 0.5,
            support: MinimumSupport::default(),
            max_expand_days: window::DEFAULT_MAX_EXPAND_DAYS,
            label_maturity_days: window::DEFAULT_LABEL_MATURITY_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub label: String,
    pub range: (DateTime<Utc>, DateTime<Utc>),
    pub confusion_matrix: ConfusionMatrix,
    pub derived: DerivedMetrics,
    pub workload: WorkloadMetrics,
    /// Precision/recall/F1/alert-count swept across candidate thresholds
    /// (spec §4.9 step 6, "threshold curves").
    pub threshold_curve: Vec<ThresholdPoint>,
    pub histogram: Vec<usize>,
    pub auto_expand: AutoExpandMeta,
    pub excluded_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriftStatistics {
    pub psi: f64,
    pub ks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantBreakdown {
    pub merchant_id: String,
    pub window_a_count: usize,
    pub window_b_count: usize,
}

/// Non-fatal signal that the comparison is incomplete on one side: either
/// window A has no eligible data while B does (`window_a: None`), or
/// window B has no eligible data while A does (`window_b_empty: true`,
/// `window_b` left zero-valued). Either case sets `partial` and skips
/// deltas/drift, since both require real data on both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResponse {
    pub window_a: Option<WindowMetrics>,
    pub window_b: WindowMetrics,
    /// `true` when window B had zero eligible transactions; `window_b`
    /// is still present but zero-valued (spec §4.9 scenario 2).
    pub window_b_empty: bool,
    pub deltas: Option<MetricDeltas>,
    pub drift: Option<DriftStatistics>,
    pub merchant_breakdown: Vec<MerchantBreakdown>,
    pub partial: bool,
    pub notes: Vec<String>,
}

fn scored_outcomes(transactions: &[Transaction]) -> Vec<ScoredOutcome> {
    transactions
        .iter()
        .filter(|tx| tx.eligible_for_confusion_matrix())
        .map(|tx| (tx.predicted_risk.unwrap(), tx.actual_label.unwrap()))
        .collect()
}

/// Per-merchant transaction counts across both windows, requested
/// on-demand and capped at `cap` merchants (spec §4.9 step 7). Merchants
/// are ranked by combined transaction count (most active first) before
/// truncation, so capping drops the least active merchants rather than an
/// arbitrary alphabetical tail.
fn merchant_breakdown(a: &[Transaction], b: &[Transaction], cap: usize) -> Vec<MerchantBreakdown> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for tx in a {
        counts.entry(tx.merchant_id.clone()).or_default().0 += 1;
    }
    for tx in b {
        counts.entry(tx.merchant_id.clone()).or_default().1 += 1;
    }
    let mut out: Vec<MerchantBreakdown> = counts
        .into_iter()
        .map(|(merchant_id, (window_a_count, window_b_count))| MerchantBreakdown {
            merchant_id,
            window_a_count,
            window_b_count,
        })
        .collect();
    out.sort_by(|x, y| {
        let total_x = x.window_a_count + x.window_b_count;
        let total_y = y.window_a_count + y.window_b_count;
        total_y.cmp(&total_x).then_with(|| x.merchant_id.cmp(&y.merchant_id))
    });
    out.truncate(cap);
    out
}

async fn build_window_metrics<S: TransactionSource>(
    source: &S,
    entity: &Entity,
    preset: &WindowPreset,
    options: ComparisonOptions,
    now: DateTime<Utc>,
) -> Result<(WindowMetrics, Vec<Transaction>)> {
    let (labeled, label) = window::resolve(preset, now)?;

    let entity_for_fetch = entity.clone();
    let source_ref = source;
    let (range, auto_expand_meta) = window::auto_expand(
        labeled,
        options.support,
        options.max_expand_days,
        options.label_maturity_days,
        now,
        |candidate| {
            let entity_for_fetch = entity_for_fetch.clone();
            async move {
                let txs = source_ref.transactions_for_window(&entity_for_fetch, candidate).await?;
                let known_transactions = txs.len();
                let actual_frauds = txs.iter().filter(|t| t.actual_label == Some(true)).count();
                let predicted_positives = txs
                    .iter()
                    .filter(|t| t.predicted_risk.map(|r| r >= options.risk_threshold).unwrap_or(false))
                    .count();
                Ok(window::WindowSupportCounts {
                    known_transactions,
                    actual_frauds,
                    predicted_positives,
                })
            }
        },
    )
    .await?;

    let transactions = source.transactions_for_window(entity, range).await?;
    let excluded_count = transactions.iter().filter(|t| !t.eligible_for_confusion_matrix()).count();

    let matrix = metrics::compute_confusion_matrix(&transactions, options.risk_threshold);
    let derived = metrics::derived_metrics(matrix);
    let scored = scored_outcomes(&transactions);
    let alerts = transactions
        .iter()
        .filter(|t| t.predicted_risk.map(|r| r >= options.risk_threshold).unwrap_or(false))
        .count();
    let window_days = (range.end - range.start).num_days().max(1) as f64;
    let workload = threshold::workload_metrics(&scored, alerts, window_days);
    let curve = threshold::threshold_curve(&scored);
    let histogram = metrics::histogram(&transactions);

    Ok((
        WindowMetrics {
            label,
            range: (range.start, range.end),
            confusion_matrix: matrix,
            derived,
            workload,
            threshold_curve: curve,
            histogram,
            auto_expand: auto_expand_meta,
            excluded_count,
        },
        transactions,
    ))
}

/// Run the full comparison.
///
/// Edge cases: both windows yielding zero eligible transactions fails
/// with [`Error::InsufficientData`] naming `"both"`; only window A empty
/// fails naming `"a"`; only window B empty is NOT an error — it returns a
/// `partial: true` response with `window_b_empty: true` and no deltas/drift
/// (spec §4.9 scenario 2).
pub async fn compare<S: TransactionSource>(
    source: &S,
    entity: &Entity,
    preset_a: &WindowPreset,
    preset_b: &WindowPreset,
    options: ComparisonOptions,
    now: DateTime<Utc>,
) -> Result<ComparisonResponse> {
    compare_with_merchant_cap(source, entity, preset_a, preset_b, options, now, None).await
}

/// Same as [`compare`] but with an optional cap on the number of merchants
/// returned in `merchant_breakdown` (spec §4.9 step 7: "capped at N
/// merchants"). `None` means the breakdown is not requested at all.
pub async fn compare_with_merchant_cap<S: TransactionSource>(
    source: &S,
    entity: &Entity,
    preset_a: &WindowPreset,
    preset_b: &WindowPreset,
    options: ComparisonOptions,
    now: DateTime<Utc>,
    merchant_cap: Option<usize>,
) -> Result<ComparisonResponse> {
    let (metrics_b, transactions_b) = build_window_metrics(source, entity, preset_b, options, now).await?;
    let eligible_b = metrics_b.confusion_matrix.scored_total();
    let window_b_empty = eligible_b == 0;

    let a_result = build_window_metrics(source, entity, preset_a, options, now).await;

    let (metrics_a, transactions_a) = match a_result {
        Ok((m, t)) => {
            let eligible_a = m.confusion_matrix.scored_total();
            if eligible_a == 0 && eligible_b == 0 {
                return Err(Error::insufficient_data("both"));
            }
            if eligible_a == 0 {
                return Err(Error::insufficient_data("a"));
            }
            (Some(m), t)
        }
        Err(_) if eligible_b == 0 => return Err(Error::insufficient_data("both")),
        Err(_) => (None, Vec::new()),
    };

    let mut notes = Vec::new();
    let partial = metrics_a.is_none() || window_b_empty;
    if metrics_a.is_none() {
        notes.push("window A had no eligible data; returning partial result for window B only".to_string());
    }
    if window_b_empty {
        notes.push("window B had no eligible data; B metrics are zero-valued".to_string());
    }

    let deltas = if partial {
        None
    } else {
        metrics_a.as_ref().map(|a| metrics::metric_deltas(&a.derived, &metrics_b.derived))
    };

    let drift = if !partial {
        let a_scores: Vec<f64> = transactions_a.iter().filter_map(|t| t.predicted_risk).collect();
        let b_scores: Vec<f64> = transactions_b.iter().filter_map(|t| t.predicted_risk).collect();
        if a_scores.len() >= MIN_SCORED_FOR_DRIFT && b_scores.len() >= MIN_SCORED_FOR_DRIFT {
            Some(DriftStatistics {
                psi: drift::psi(&a_scores, &b_scores),
                ks: drift::ks_statistic(&a_scores, &b_scores),
            })
        } else {
            notes.push("fewer than 10 scored transactions on one side; drift statistics skipped".to_string());
            None
        }
    } else {
        None
    };

    let breakdown = merchant_cap
        .map(|cap| merchant_breakdown(&transactions_a, &transactions_b, cap))
        .unwrap_or_default();

    Ok(ComparisonResponse {
        window_a: metrics_a,
        window_b: metrics_b,
        window_b_empty,
        deltas,
        drift,
        merchant_breakdown: breakdown,
        partial,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::warehouse::Decision;
    use std::sync::Mutex;

    struct FixedSource {
        by_range: Mutex<HashMap<(DateTime<Utc>, DateTime<Utc>), Vec<Transaction>>>,
        default: Vec<Transaction>,
    }

    #[async_trait]
    impl TransactionSource for FixedSource {
        async fn transactions_for_window(&self, _entity: &Entity, window: TimeRange) -> Result<Vec<Transaction>> {
            let map = self.by_range.lock().unwrap();
            Ok(map.get(&(window.start, window.end)).cloned().unwrap_or_else(|| self.default.clone()))
        }
    }

    fn tx(id: &str, predicted: Option<f64>, actual: Option<bool>) -> Transaction {
        Transaction {
            tx_id: id.to_string(),
            datetime: Utc::now(),
            merchant_id: "m1".to_string(),
            amount: 10.0,
            currency: "USD".to_string(),
            bin: "411111".to_string(),
            last_four: "1234".to_string(),
            ip: "203.0.113.1".to_string(),
            ip_country: None,
            bin_country: None,
            device_id: None,
            email_normalized: None,
            user_agent: None,
            decision: Some(Decision::Approved),
            predicted_risk: predicted,
            actual_label: actual,
        }
    }

    fn minimal_options() -> ComparisonOptions {
        ComparisonOptions {
            risk_threshold: 0.5,
            support: MinimumSupport { min_known_transactions: 0, min_actual_frauds: 0, min_predicted_positives: 0 },
            max_expand_days: 30,
            label_maturity_days: 3,
        }
    }

    #[tokio::test]
    async fn both_windows_empty_fails() {
        let source = FixedSource { by_range: Mutex::new(HashMap::new()), default: vec![] };
        let entity = Entity::new(EntityType::Email, "a@b.com").unwrap();
        let now = Utc::now();
        let result = compare(
            &source,
            &entity,
            &WindowPreset::Recent14d,
            &WindowPreset::Retro14dMonthsBack(1),
            minimal_options(),
            now,
        )
        .await;
        assert!(matches!(result, Err(Error::InsufficientData { side }) if side == "both"));
    }

    #[tokio::test]
    async fn only_b_empty_succeeds_partial() {
        let now = Utc::now();
        let (recent, _) = window::resolve(&WindowPreset::Recent14d, now).unwrap();

        struct AsymmetricSource {
            empty_range: TimeRange,
            filled: Vec<Transaction>,
        }

        #[async_trait]
        impl TransactionSource for AsymmetricSource {
            async fn transactions_for_window(&self, _entity: &Entity, window: TimeRange) -> Result<Vec<Transaction>> {
                if window.start == self.empty_range.start && window.end == self.empty_range.end {
                    Ok(vec![])
                } else {
                    Ok(self.filled.clone())
                }
            }
        }

        let source = AsymmetricSource {
            empty_range: recent.range,
            filled: vec![tx("t1", Some(0.9), Some(true)), tx("t2", Some(0.1), Some(false))],
        };
        let entity = Entity::new(EntityType::Email, "a@b.com").unwrap();

        let result = compare(
            &source,
            &entity,
            &WindowPreset::Retro14dMonthsBack(1),
            &WindowPreset::Recent14d,
            minimal_options(),
            now,
        )
        .await
        .unwrap();

        assert!(result.partial);
        assert!(result.window_b_empty);
        assert!(result.window_a.is_some());
        assert!(result.deltas.is_none());
        assert!(result.drift.is_none());
    }

    #[tokio::test]
    async fn only_a_empty_fails() {
        let now = Utc::now();
        let (recent, _) = window::resolve(&WindowPreset::Recent14d, now).unwrap();

        struct AsymmetricSource {
            empty_range: TimeRange,
            filled: Vec<Transaction>,
        }

        #[async_trait]
        impl TransactionSource for AsymmetricSource {
            async fn transactions_for_window(&self, _entity: &Entity, window: TimeRange) -> Result<Vec<Transaction>> {
                if window.start == self.empty_range.start && window.end == self.empty_range.end {
                    Ok(vec![])
                } else {
                    Ok(self.filled.clone())
                }
            }
        }

        let source = AsymmetricSource {
            empty_range: recent.range,
            filled: vec![tx("t1", Some(0.9), Some(true)), tx("t2", Some(0.1), Some(false))],
        };
        let entity = Entity::new(EntityType::Email, "a@b.com").unwrap();

        let result = compare(
            &source,
            &entity,
            &WindowPreset::Recent14d,
            &WindowPreset::Retro14dMonthsBack(1),
            minimal_options(),
            now,
        )
        .await;

        assert!(matches!(result, Err(Error::InsufficientData { side }) if side == "a"));
    }

    #[test]
    fn merchant_breakdown_counts_both_sides() {
        let a = vec![tx("a1", None, None)];
        let b = vec![tx("b1", None, None), tx("b2", None, None)];
        let breakdown = merchant_breakdown(&a, &b, 10);
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].window_a_count, 1);
        assert_eq!(breakdown[0].window_b_count, 2);
    }

    fn tx_for_merchant(id: &str, merchant_id: &str) -> Transaction {
        let mut t = tx(id, None, None);
        t.merchant_id = merchant_id.to_string();
        t
    }

    #[test]
    fn merchant_breakdown_caps_to_n_ranked_by_activity() {
        let a = vec![
            tx_for_merchant("a1", "busy"),
            tx_for_merchant("a2", "busy"),
            tx_for_merchant("a3", "quiet"),
        ];
        let b = vec![tx_for_merchant("b1", "busy"), tx_for_merchant("b2", "medium")];

        let breakdown = merchant_breakdown(&a, &b, 2);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].merchant_id, "busy");
        assert_eq!(breakdown[1].merchant_id, "medium");
    }
}
