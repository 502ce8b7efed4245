//! Warehouse gateway: parameterized query building, batched IN-clause
//! execution, and the decision-filter policy that governs which
//! transactions are visible to investigation vs. confusion-matrix reads.

pub mod dialect;
pub mod filter;
pub mod gateway;
pub mod query;

pub use dialect::Dialect;
pub use filter::DecisionFilter;
pub use gateway::{Gateway, Row, WarehouseProvider};
pub use query::{build_label_lookup_query, build_transactions_query, BuiltQuery, TimeRange};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Finalized decision states a transaction can carry; "NULL" is modeled as
/// `decision: None` rather than a variant, matching the warehouse column's
/// actual nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approved,
    Authorized,
    Settled,
    Rejected,
}

impl Decision {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "APPROVED" => Some(Self::Approved),
            "AUTHORIZED" => Some(Self::Authorized),
            "SETTLED" => Some(Self::Settled),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Authorized => "AUTHORIZED",
            Self::Settled => "SETTLED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// A read-only transaction fact. `predicted_risk` and `actual_label` are
/// populated downstream (mapper + label joiner), never read directly off
/// the warehouse row during investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: String,
    pub datetime: DateTime<Utc>,
    pub merchant_id: String,
    pub amount: f64,
    pub currency: String,
    pub bin: String,
    pub last_four: String,
    pub ip: String,
    pub ip_country: Option<String>,
    pub bin_country: Option<String>,
    pub device_id: Option<String>,
    pub email_normalized: Option<String>,
    pub user_agent: Option<String>,
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_risk: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_label: Option<bool>,
}

impl Transaction {
    /// A transaction is eligible for confusion-matrix arithmetic when both
    /// sides are known. `decision` is NOT re-checked here: which decisions
    /// reach this point at all is the gateway/mapper's `DecisionFilter`
    /// job (spec §4.2), not the matrix's. Re-checking it here would drop
    /// `decision IS NULL` rows under `FINALIZED` mode even when their
    /// `IS_FRAUD` label is populated, which is exactly the permissive-filter
    /// case the mode exists to allow.
    pub fn eligible_for_confusion_matrix(&self) -> bool {
        self.predicted_risk.is_some() && self.actual_label.is_some()
    }
}

/// One row of the `predictions` table. Unique on `tx_id`; insert-or-replace
/// on conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub tx_id: String,
    pub predicted_risk: f64,
    pub predicted_label: bool,
    pub model_version: String,
    pub investigation_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub risk_threshold: f64,
}
