//! Dialect-aware SQL builders for the two tables the core reads.
//!
//! Investigation-phase transaction queries never select `MODEL_SCORE` /
//! `IS_FRAUD_TX` — predicted risk is sourced only from `predictions`, never
//! from the transaction row itself. This avoids a model effectively
//! scoring itself when the warehouse happens to carry a historical score
//! column alongside the raw transaction.

use chrono::{DateTime, Utc};

use crate::entity::{build_predicate, Entity};
use crate::warehouse::dialect::Dialect;
use crate::warehouse::filter::DecisionFilter;

/// A half-open UTC window, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// A built query: the SQL text plus its positional bind values, already
/// ordered to match the placeholders emitted for the target dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub sql: String,
    pub binds: Vec<String>,
}

const TRANSACTION_COLUMNS: &[&str] = &[
    "tx_id",
    "tx_datetime",
    "store_id",
    "paid_amount_value",
    "paid_amount_currency",
    "card_bin",
    "last_four",
    "email",
    "email_normalized",
    "device_id",
    "ip",
    "ip_country",
    "bin_country",
    "user_agent",
    "card_type",
    "decision",
];

/// Build the transactions query for an investigation's entity ∧ window.
/// `MODEL_SCORE`/`IS_FRAUD_TX` are deliberately absent from the select
/// list — investigation-phase reads never see the label or any
/// precomputed score on the transaction row.
pub fn build_transactions_query(
    entity: &Entity,
    window: TimeRange,
    filter: DecisionFilter,
    dialect: Dialect,
) -> BuiltQuery {
    let table = dialect.quote_ident("transactions");
    let pred = build_predicate(entity, dialect);
    let datetime_col = match dialect {
        Dialect::Snowflake => "TX_DATETIME",
        Dialect::Postgres => "tx_datetime",
    };
    let decision_col = match dialect {
        Dialect::Snowflake => "DECISION",
        Dialect::Postgres => "decision",
    };
    let columns = TRANSACTION_COLUMNS
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut binds = pred.binds.clone();
    binds.push(window.start.to_rfc3339());
    binds.push(window.end.to_rfc3339());

    let sql = format!(
        "SELECT {columns} FROM {table} WHERE {where_pred} AND {datetime_col} >= ? AND {datetime_col} < ? AND {decision_filter}",
        where_pred = pred.clause,
        decision_filter = filter.sql_fragment(decision_col),
    );

    BuiltQuery { sql, binds }
}

/// Build a ground-truth label lookup by `tx_id`, WITHOUT a window bound.
/// The label joiner (§4.3) deliberately never filters by window here:
/// labels are populated at fraud-detection time, which can lag the
/// transaction by an arbitrary interval, and filtering by transaction-time
/// at this layer silently drops labels (a documented real defect).
pub fn build_label_lookup_query(tx_ids: &[String], dialect: Dialect) -> BuiltQuery {
    let table = dialect.quote_ident("transactions");
    let tx_col = dialect.quote_ident("tx_id");
    let label_col = dialect.quote_ident("is_fraud_tx");
    let placeholders = (0..tx_ids.len())
        .map(|_| "?")
        .collect::<Vec<_>>()
        .join(", ");
    BuiltQuery {
        sql: format!("SELECT {tx_col}, {label_col} FROM {table} WHERE {tx_col} IN ({placeholders})"),
        binds: tx_ids.to_vec(),
    }
}

/// Build the prediction upsert for a single transaction: one row per
/// `tx_id`, insert-or-replace on conflict.
pub fn build_prediction_upsert(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Snowflake => {
            "MERGE INTO PREDICTIONS AS t USING (SELECT ? AS TX_ID) AS s ON t.TX_ID = s.TX_ID \
             WHEN MATCHED THEN UPDATE SET PREDICTED_RISK=?, PREDICTED_LABEL=?, MODEL_VERSION=?, \
             INVESTIGATION_ID=?, ENTITY_TYPE=?, ENTITY_ID=?, MERCHANT_ID=?, WINDOW_START=?, \
             WINDOW_END=?, RISK_THRESHOLD=?, UPDATED_AT=CURRENT_TIMESTAMP() \
             WHEN NOT MATCHED THEN INSERT (TX_ID, PREDICTED_RISK, PREDICTED_LABEL, MODEL_VERSION, \
             INVESTIGATION_ID, ENTITY_TYPE, ENTITY_ID, MERCHANT_ID, WINDOW_START, WINDOW_END, \
             RISK_THRESHOLD, UPDATED_AT) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP())"
        }
        Dialect::Postgres => {
            "INSERT INTO predictions (tx_id, predicted_risk, predicted_label, model_version, \
             investigation_id, entity_type, entity_id, merchant_id, window_start, window_end, \
             risk_threshold, updated_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11, now()) \
             ON CONFLICT (tx_id) DO UPDATE SET predicted_risk=excluded.predicted_risk, \
             predicted_label=excluded.predicted_label, model_version=excluded.model_version, \
             investigation_id=excluded.investigation_id, updated_at=now()"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    #[test]
    fn transaction_query_excludes_model_score() {
        let e = Entity::new(EntityType::Email, "a@b.com").unwrap();
        let window = TimeRange::new(Utc::now(), Utc::now());
        let q = build_transactions_query(&e, window, DecisionFilter::Finalized, Dialect::Postgres);
        assert!(!q.sql.to_lowercase().contains("model_score"));
        assert!(!q.sql.to_lowercase().contains("is_fraud_tx"));
    }

    #[test]
    fn label_query_has_no_window_binds() {
        let ids = vec!["t1".to_string(), "t2".to_string()];
        let q = build_label_lookup_query(&ids, Dialect::Snowflake);
        assert_eq!(q.binds, ids);
        assert!(q.sql.contains("IN (?, ?)"));
    }
}
