//! Process-wide configuration, loaded once from the environment at startup.
//!
//! Nothing here is re-read after [`InvestigatorConfig::from_env`]
//! returns; the orchestrator and its collaborators are handed an
//! `Arc<InvestigatorConfig>` at construction time and it stays immutable
//! for the life of the process.

use std::env;

use crate::error::{Error, Result};
use crate::warehouse::dialect::Dialect;
use crate::warehouse::filter::DecisionFilter;

/// Which recursion-limit/LLM-mock profile the orchestrator runs under.
///
/// `TEST_MODE=demo` raises the recursion limit and substitutes a mock LLM
/// collaborator; anything else (unset included) is the live profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMode {
    Live,
    Demo,
}

impl TestMode {
    fn from_env_value(v: Option<&str>) -> Self {
        match v {
            Some(s) if s.eq_ignore_ascii_case("demo") => Self::Demo,
            _ => Self::Live,
        }
    }

    /// Recursion limit for this mode: LIVE=120, DEMO=150.
    pub fn recursion_limit(&self) -> u32 {
        match self {
            Self::Live => 120,
            Self::Demo => 150,
        }
    }
}

/// Which group-by dimension analytics default to when none is specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Email,
    Ip,
    DeviceId,
}

impl GroupBy {
    fn from_env_value(v: Option<&str>) -> Self {
        match v.map(str::to_ascii_uppercase).as_deref() {
            Some("IP") => Self::Ip,
            Some("DEVICE_ID") => Self::DeviceId,
            _ => Self::Email,
        }
    }
}

/// Immutable, process-global configuration assembled from environment
/// variables. Construct once via [`InvestigatorConfig::from_env`] and
/// share via `Arc`.
#[derive(Debug, Clone)]
pub struct InvestigatorConfig {
    pub database_provider: Dialect,
    pub risk_threshold_default: f64,
    pub transaction_decision_filter: DecisionFilter,
    pub analytics_default_group_by: GroupBy,
    pub analytics_max_lookback_months: u32,
    pub isfraud_batch_size: usize,
    pub use_enhanced_risk_scoring: bool,
    pub test_mode: TestMode,
}

impl InvestigatorConfig {
    /// Read the recognized env set, applying the documented defaults for
    /// anything unset. Malformed values that name an
    /// enumerated variable but don't match any of its variants are a
    /// configuration error (exit code 2 for CLI drivers), not a silent
    /// default.
    pub fn from_env() -> Result<Self> {
        let database_provider = match env::var("DATABASE_PROVIDER").ok().as_deref() {
            None => Dialect::Postgres,
            Some(s) if s.eq_ignore_ascii_case("postgresql") => Dialect::Postgres,
            Some(s) if s.eq_ignore_ascii_case("snowflake") => Dialect::Snowflake,
            Some(other) => {
                return Err(Error::Config(format!(
                    "DATABASE_PROVIDER: unrecognized value {other:?}"
                )))
            }
        };

        let risk_threshold_default = match env::var("RISK_THRESHOLD_DEFAULT").ok() {
            None => 0.3,
            Some(s) => s
                .parse::<f64>()
                .ok()
                .filter(|v| (0.0..=1.0).contains(v))
                .ok_or_else(|| {
                    Error::Config(format!("RISK_THRESHOLD_DEFAULT: invalid value {s:?}"))
                })?,
        };

        let transaction_decision_filter = match env::var("TRANSACTION_DECISION_FILTER")
            .ok()
            .as_deref()
        {
            None => DecisionFilter::Finalized,
            Some(s) if s.eq_ignore_ascii_case("APPROVED_ONLY") => DecisionFilter::ApprovedOnly,
            Some(s) if s.eq_ignore_ascii_case("FINALIZED") => DecisionFilter::Finalized,
            Some(s) if s.eq_ignore_ascii_case("ALL") => DecisionFilter::All,
            Some(other) => {
                return Err(Error::Config(format!(
                    "TRANSACTION_DECISION_FILTER: unrecognized value {other:?}"
                )))
            }
        };

        let analytics_default_group_by =
            GroupBy::from_env_value(env::var("ANALYTICS_DEFAULT_GROUP_BY").ok().as_deref());

        let analytics_max_lookback_months = env::var("ANALYTICS_MAX_LOOKBACK_MONTHS")
            .ok()
            .map(|s| s.parse::<u32>())
            .transpose()
            .map_err(|_| Error::Config("ANALYTICS_MAX_LOOKBACK_MONTHS: not an integer".into()))?
            .unwrap_or(6);

        let isfraud_batch_size = env::var("ISFRAUD_BATCH_SIZE")
            .ok()
            .map(|s| s.parse::<usize>())
            .transpose()
            .map_err(|_| Error::Config("ISFRAUD_BATCH_SIZE: not an integer".into()))?
            .unwrap_or(500);

        let use_enhanced_risk_scoring = env::var("USE_ENHANCED_RISK_SCORING")
            .ok()
            .map(|s| !s.eq_ignore_ascii_case("false") && s != "0")
            .unwrap_or(true);

        let test_mode = TestMode::from_env_value(env::var("TEST_MODE").ok().as_deref());

        Ok(Self {
            database_provider,
            risk_threshold_default,
            transaction_decision_filter,
            analytics_default_group_by,
            analytics_max_lookback_months,
            isfraud_batch_size,
            use_enhanced_risk_scoring,
            test_mode,
        })
    }

    /// A config with every default applied, for tests and local tooling.
    pub fn defaults() -> Self {
        Self {
            database_provider: Dialect::Postgres,
            risk_threshold_default: 0.3,
            transaction_decision_filter: DecisionFilter::Finalized,
            analytics_default_group_by: GroupBy::Email,
            analytics_max_lookback_months: 6,
            isfraud_batch_size: 500,
            use_enhanced_risk_scoring: true,
            test_mode: TestMode::Live,
        }
    }
}
