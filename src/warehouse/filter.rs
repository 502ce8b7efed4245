//! Decision-filter policy for transaction queries.
//!
//! Confusion-matrix arithmetic needs the permissive `FINALIZED` filter
//! because `is_fraud` labels may be populated for historically-approved
//! transactions whose `decision` column has since gone `NULL`; the risk
//! analyzer path wants strict `APPROVED_ONLY` equality. The mode is
//! runtime-selectable, never hard-coded into a query builder.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionFilter {
    ApprovedOnly,
    Finalized,
    All,
}

impl DecisionFilter {
    /// Render the SQL fragment for this filter against the given decision
    /// column name (already dialect-cased by the caller).
    pub fn sql_fragment(&self, decision_col: &str) -> String {
        match self {
            DecisionFilter::ApprovedOnly => format!("upper({decision_col}) = 'APPROVED'"),
            DecisionFilter::Finalized => format!(
                "(upper({decision_col}) IN ('APPROVED', 'AUTHORIZED', 'SETTLED') OR {decision_col} IS NULL)"
            ),
            DecisionFilter::All => "true".to_string(),
        }
    }

    /// Whether a transaction with the given decision value passes this
    /// filter. Used in-process once rows are already in hand (e.g. by the
    /// mapper, which re-applies the same semantics it pushed into SQL so
    /// that in-memory fixtures and live queries agree).
    pub fn admits(&self, decision: Option<&str>) -> bool {
        match self {
            DecisionFilter::ApprovedOnly => {
                decision.map(|d| d.eq_ignore_ascii_case("APPROVED")).unwrap_or(false)
            }
            DecisionFilter::Finalized => match decision {
                None => true,
                Some(d) => {
                    let d = d.to_ascii_uppercase();
                    matches!(d.as_str(), "APPROVED" | "AUTHORIZED" | "SETTLED")
                }
            },
            DecisionFilter::All => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalized_admits_null_decision() {
        assert!(DecisionFilter::Finalized.admits(None));
        assert!(!DecisionFilter::ApprovedOnly.admits(None));
    }

    #[test]
    fn approved_only_rejects_authorized() {
        assert!(!DecisionFilter::ApprovedOnly.admits(Some("AUTHORIZED")));
        assert!(DecisionFilter::Finalized.admits(Some("authorized")));
    }

    #[test]
    fn all_admits_everything() {
        assert!(DecisionFilter::All.admits(Some("REJECTED")));
        assert!(DecisionFilter::All.admits(None));
    }
}
