//! Label Joiner (spec §4.3): post-hoc join of transaction ids to
//! ground-truth fraud labels, with a fallback source cascade and label
//! maturity gating.
//!
//! Deliberately does NOT filter by window — the caller (the mapper) has
//! already constrained `tx_ids` to its window, and labels are populated at
//! fraud-detection time rather than transaction time, so they can lag by
//! an arbitrary interval. Filtering by transaction-time here would
//! silently drop labels (a documented historical defect, see
//! `build_label_lookup_query`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::warehouse::{build_label_lookup_query, Dialect, Gateway, WarehouseProvider};

/// A ground-truth label source, queried in a fixed cascade when the
/// primary warehouse column is unavailable for too many transactions
/// (spec §4.3: "falls back to secondary sources in a fixed cascade
/// (chargeback/manual-review/external-source)").
#[async_trait]
pub trait LabelSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn lookup(&self, tx_ids: &[String]) -> Result<HashMap<String, bool>>;
}

/// Fraction of `⊥` results from the primary source above which the
/// cascade kicks in.
const FALLBACK_TRIGGER_FRACTION: f64 = 0.5;

/// Minimum age, in days, before a missing label is treated as a genuine
/// negative signal rather than "not yet mature" (DESIGN.md Open Question
/// 2: before this bound a transaction is excluded, not imputed).
const DEFAULT_LABEL_MATURITY_DAYS: i64 = 3;

pub struct LabelJoiner<P: WarehouseProvider> {
    gateway: Arc<Gateway<P>>,
    dialect: Dialect,
    fallback_sources: Vec<Arc<dyn LabelSource>>,
    label_maturity_days: i64,
}

impl<P: WarehouseProvider> LabelJoiner<P> {
    pub fn new(gateway: Arc<Gateway<P>>, dialect: Dialect) -> Self {
        Self {
            gateway,
            dialect,
            fallback_sources: Vec::new(),
            label_maturity_days: DEFAULT_LABEL_MATURITY_DAYS,
        }
    }

    /// Register a fallback source; sources are tried in registration order
    /// once the primary cascade trigger fires.
    pub fn with_fallback(mut self, source: Arc<dyn LabelSource>) -> Self {
        self.fallback_sources.push(source);
        self
    }

    pub fn with_label_maturity_days(mut self, days: i64) -> Self {
        self.label_maturity_days = days;
        self
    }

    /// Join `(tx_id, tx_datetime)` pairs to `Option<bool>` labels.
    /// `None` is `⊥` — semantically distinct from `Some(false)` — and
    /// means the affected transaction must be EXCLUDED (not imputed) from
    /// confusion-matrix arithmetic, per spec §7.
    pub async fn join_labels(
        &self,
        txs: &[(String, DateTime<Utc>)],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Option<bool>>> {
        if txs.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<String> = txs.iter().map(|(id, _)| id.clone()).collect();
        let primary = self.query_primary(&ids, cancel).await?;

        let mut result: HashMap<String, Option<bool>> =
            ids.iter().map(|id| (id.clone(), None)).collect();
        for (id, label) in &primary {
            result.insert(id.clone(), Some(*label));
        }

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !primary.contains_key(id.as_str()))
            .cloned()
            .collect();

        let missing_fraction = missing.len() as f64 / ids.len() as f64;
        if missing_fraction > FALLBACK_TRIGGER_FRACTION && !missing.is_empty() {
            let mut still_missing = missing;
            for source in &self.fallback_sources {
                if still_missing.is_empty() {
                    break;
                }
                let found = source.lookup(&still_missing).await?;
                for (id, label) in &found {
                    result.insert(id.clone(), Some(*label));
                }
                still_missing.retain(|id| !found.contains_key(id));
            }
        }

        // Label maturity gating (Open Question 2): a label that is still
        // `⊥` after the full cascade stays `⊥` if the transaction hasn't
        // reached maturity yet (it simply hasn't had time to be labeled);
        // this is already the `None` default above, so no further action
        // is needed here besides documenting the invariant — maturity
        // does NOT turn a missing label into `Some(false)`.
        for (id, tx_datetime) in txs {
            let age_days = (now - *tx_datetime).num_days();
            if age_days < self.label_maturity_days {
                result.insert(id.clone(), None);
            }
        }

        Ok(result)
    }

    async fn query_primary(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, bool>> {
        let rows = self
            .gateway
            .fetch_in_batches(ids, None, cancel, |chunk| {
                let q = build_label_lookup_query(chunk, self.dialect);
                (q.sql, q.binds)
            })
            .await?;

        let mut out = HashMap::new();
        for row in rows {
            let tx_id = row.get("tx_id").and_then(|v| v.as_str()).map(str::to_string);
            let label = row.get("is_fraud_tx").and_then(|v| {
                v.as_bool()
                    .or_else(|| v.as_i64().map(|n| n != 0))
            });
            if let (Some(tx_id), Some(label)) = (tx_id, label) {
                out.insert(tx_id, label);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::gateway::Row;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        labeled: HashMap<String, bool>,
    }

    #[async_trait]
    impl WarehouseProvider for FakeProvider {
        async fn query(&self, _sql: &str, binds: &[String]) -> Result<Vec<Row>> {
            Ok(binds
                .iter()
                .filter_map(|id| {
                    self.labeled.get(id).map(|label| {
                        let mut row = Row::new();
                        row.insert("tx_id".into(), Value::String(id.clone()));
                        row.insert("is_fraud_tx".into(), Value::Bool(*label));
                        row
                    })
                })
                .collect())
        }
    }

    struct FakeFallback {
        calls: AtomicUsize,
        labeled: HashMap<String, bool>,
    }

    #[async_trait]
    impl LabelSource for FakeFallback {
        fn name(&self) -> &'static str {
            "chargeback"
        }
        async fn lookup(&self, tx_ids: &[String]) -> Result<HashMap<String, bool>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(tx_ids
                .iter()
                .filter_map(|id| self.labeled.get(id).map(|l| (id.clone(), *l)))
                .collect())
        }
    }

    fn mature_now() -> DateTime<Utc> {
        Utc::now()
    }

    #[tokio::test]
    async fn bottom_is_distinct_from_false() {
        let mut labeled = HashMap::new();
        labeled.insert("t1".to_string(), false);
        let provider = Arc::new(FakeProvider { labeled });
        let gateway = Arc::new(Gateway::new(provider, 4));
        let joiner = LabelJoiner::new(gateway, Dialect::Postgres).with_label_maturity_days(0);

        let old = mature_now() - chrono::Duration::days(10);
        let txs = vec![("t1".to_string(), old), ("t2".to_string(), old)];
        let cancel = CancellationToken::new();
        let result = joiner.join_labels(&txs, mature_now(), &cancel).await.unwrap();

        assert_eq!(result["t1"], Some(false));
        assert_eq!(result["t2"], None);
    }

    #[tokio::test]
    async fn falls_back_when_primary_mostly_missing() {
        let provider = Arc::new(FakeProvider {
            labeled: HashMap::new(),
        });
        let gateway = Arc::new(Gateway::new(provider, 4));
        let mut fallback_labels = HashMap::new();
        fallback_labels.insert("t1".to_string(), true);
        let fallback = Arc::new(FakeFallback {
            calls: AtomicUsize::new(0),
            labeled: fallback_labels,
        });
        let joiner = LabelJoiner::new(gateway, Dialect::Postgres)
            .with_label_maturity_days(0)
            .with_fallback(fallback.clone());

        let old = mature_now() - chrono::Duration::days(10);
        let txs = vec![("t1".to_string(), old), ("t2".to_string(), old)];
        let cancel = CancellationToken::new();
        let result = joiner.join_labels(&txs, mature_now(), &cancel).await.unwrap();

        assert_eq!(result["t1"], Some(true));
        assert_eq!(result["t2"], None);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn immature_label_stays_bottom_even_if_known() {
        let mut labeled = HashMap::new();
        labeled.insert("t1".to_string(), true);
        let provider = Arc::new(FakeProvider { labeled });
        let gateway = Arc::new(Gateway::new(provider, 4));
        let joiner = LabelJoiner::new(gateway, Dialect::Postgres).with_label_maturity_days(3);

        let recent = mature_now() - chrono::Duration::hours(1);
        let txs = vec![("t1".to_string(), recent)];
        let cancel = CancellationToken::new();
        let result = joiner.join_labels(&txs, mature_now(), &cancel).await.unwrap();

        assert_eq!(result["t1"], None);
    }
}
