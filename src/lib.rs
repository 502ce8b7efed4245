//! # fraud-investigator-core
//!
//! Multi-domain fraud investigation engine: an orchestrator that, given an
//! entity (email, device, IP, account, card fingerprint, or merchant) and a
//! time window, fans out domain analyzers (device, network, location,
//! logs, risk) and post-hoc detectors over warehouse transaction data,
//! aggregates their findings into a single risk score, and persists the
//! result as a versioned, resumable investigation.
//!
//! ## Core components
//!
//! - **Entity**: normalization and dialect-aware SQL predicate building
//! - **Warehouse**: gateway, query builders, decision filtering
//! - **Label Joiner**: ground-truth label lookup with fallback and maturity gating
//! - **Analyzers / Detectors**: per-domain findings feeding the aggregator
//! - **Aggregator**: evidence-gated weighted risk composition
//! - **Orchestrator**: scheduling, checkpointing, cancellation, recursion limits
//! - **Comparison**: window-over-window metrics, drift, and workload analysis
//! - **Artifact**: canonical + entity-view persistence with advisory locking
//! - **Store**: investigation state persistence (SQLite)

pub mod aggregator;
pub mod analyzers;
pub mod artifact;
pub mod comparison;
pub mod config;
pub mod detectors;
pub mod entity;
pub mod error;
pub mod investigation;
pub mod label_joiner;
pub mod llm;
pub mod logging;
pub mod mapper;
pub mod orchestrator;
pub mod progress;
pub mod store;
pub mod warehouse;

pub use aggregator::{aggregate, AggregateResult, AggregatorConfig};
pub use comparison::{
    compare, compare_with_merchant_cap, ComparisonOptions, ComparisonResponse, TransactionSource, WindowPreset,
};
pub use config::{GroupBy, InvestigatorConfig, TestMode};
pub use entity::{Entity, EntityType};
pub use error::{Error, Result};
pub use investigation::{Investigation, InvestigationSettings, InvestigationStatus};
pub use label_joiner::LabelJoiner;
pub use llm::{AnthropicClient, ClientConfig, LlmClient, MockLlmClient};
pub use mapper::{map_to_transactions, select_best_investigation, MappingResult};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use progress::ProgressLog;
pub use warehouse::{Dialect, Gateway, Transaction, TimeRange, WarehouseProvider};
