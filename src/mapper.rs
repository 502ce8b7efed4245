//! Transaction↔Investigation Mapper (spec §4.8).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;
use crate::investigation::Investigation;
use crate::label_joiner::LabelJoiner;
use crate::warehouse::{
    build_transactions_query, Decision, DecisionFilter, Dialect, Gateway, Row, Transaction,
    TimeRange, WarehouseProvider,
};

/// Result of mapping an investigation to its transactions, with the
/// exclusion accounting spec §4.9 requires the comparison engine to
/// surface ("the comparison engine reports the exclusion count").
#[derive(Debug, Clone, Default)]
pub struct MappingResult {
    pub transactions: Vec<Transaction>,
    /// Transactions whose entity-level predicted score could not be
    /// located in `progress.transaction_scores` — excluded, never
    /// silently backfilled with an entity-level score (spec §4.8).
    pub excluded_no_score: usize,
    /// Transactions the decision filter excluded even though their label
    /// was populated (only non-zero under `APPROVED_ONLY`, spec §4.8
    /// "critical contract").
    pub excluded_by_filter: usize,
}

/// Deterministic investigation-selection rules (spec §4.8): (a) most
/// recent `created_at` among investigations fully covering the window;
/// (b) else largest overlap duration; (c) tiebreak by higher version.
pub fn select_best_investigation<'a>(
    candidates: &'a [Investigation],
    window: TimeRange,
) -> Option<&'a Investigation> {
    let covering: Vec<&Investigation> = candidates.iter().filter(|i| i.covers(window)).collect();
    if !covering.is_empty() {
        return covering
            .into_iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.version.cmp(&b.version)));
    }

    candidates.iter().max_by(|a, b| {
        a.overlap_duration(window)
            .cmp(&b.overlap_duration(window))
            .then(a.version.cmp(&b.version))
    })
}

fn parse_transaction_row(row: &Row) -> Option<Transaction> {
    let get_str = |key: &str| row.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let tx_id = get_str("tx_id")?;
    let datetime = row
        .get("tx_datetime")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&chrono::Utc))?;
    let amount = row.get("paid_amount_value").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let decision = get_str("decision").and_then(|d| Decision::parse(&d));

    Some(Transaction {
        tx_id,
        datetime,
        merchant_id: get_str("store_id").unwrap_or_default(),
        amount,
        currency: get_str("paid_amount_currency").unwrap_or_default(),
        bin: get_str("card_bin").unwrap_or_default(),
        last_four: get_str("last_four").unwrap_or_default(),
        ip: get_str("ip").unwrap_or_default(),
        ip_country: get_str("ip_country"),
        bin_country: get_str("bin_country"),
        device_id: get_str("device_id"),
        email_normalized: get_str("email_normalized"),
        user_agent: get_str("user_agent"),
        decision,
        predicted_risk: None,
        actual_label: None,
    })
}

/// Fetch transactions for the investigation's `entities ∧ window`, attach
/// predicted scores already computed during the investigation (from
/// `progress.transaction_scores`), and invoke the label joiner to attach
/// `actual_label`.
pub async fn map_to_transactions<P: WarehouseProvider>(
    investigation: &Investigation,
    window: TimeRange,
    gateway: &Gateway<P>,
    dialect: Dialect,
    filter: DecisionFilter,
    label_joiner: &LabelJoiner<P>,
    cancel: &CancellationToken,
) -> Result<MappingResult> {
    let mut all_rows = Vec::new();
    for entity in &investigation.entities {
        let query = build_transactions_query(entity, window, filter, dialect);
        let rows = gateway.execute(&query.sql, &query.binds, cancel).await?;
        all_rows.extend(rows);
    }

    let mut excluded_no_score = 0usize;
    let mut excluded_by_filter = 0usize;
    let mut candidates = Vec::new();

    for row in &all_rows {
        let Some(mut tx) = parse_transaction_row(row) else {
            continue;
        };

        if !filter.admits(tx.decision.map(|d| d.as_str())) {
            excluded_by_filter += 1;
            continue;
        }

        match investigation.progress.transaction_scores.get(&tx.tx_id) {
            Some(score) => tx.predicted_risk = Some(*score),
            None => {
                excluded_no_score += 1;
                continue;
            }
        }
        candidates.push(tx);
    }

    let ids: Vec<(String, chrono::DateTime<chrono::Utc>)> = candidates
        .iter()
        .map(|t| (t.tx_id.clone(), t.datetime))
        .collect();
    let labels = label_joiner.join_labels(&ids, chrono::Utc::now(), cancel).await?;

    for tx in &mut candidates {
        tx.actual_label = labels.get(&tx.tx_id).copied().flatten();
    }

    info!(
        investigation_id = %investigation.id,
        mapped = candidates.len(),
        excluded_no_score,
        excluded_by_filter,
        "mapped investigation to transactions"
    );

    Ok(MappingResult {
        transactions: candidates,
        excluded_no_score,
        excluded_by_filter,
    })
}
