//! Post-hoc detectors: four stateless, high-precision pattern detectors
//! consumed by the risk analyzer. Each is a pure function over a
//! transaction slice — no I/O, no shared state, deterministic.

pub mod geo;
pub mod link_ring;
pub mod merchant_anomaly;
pub mod velocity;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Common shape every post-hoc detector returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorResult {
    pub name: &'static str,
    pub detected: bool,
    pub severity: Severity,
    pub evidence: Vec<String>,
}

impl DetectorResult {
    pub fn clear(name: &'static str) -> Self {
        Self {
            name,
            detected: false,
            severity: Severity::Low,
            evidence: Vec::new(),
        }
    }
}
