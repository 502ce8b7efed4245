//! Risk Aggregator (spec §4.7): the single source of truth that combines
//! domain findings, with evidence-gating, into a final score and
//! confidence.

use crate::analyzers::{Domain, DomainFinding};
use crate::error::{Error, Result};

/// Evidence-gating thresholds (spec §4.7 step 1), configurable so callers
/// can tune sensitivity without touching the algorithm.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    /// Minimum number of domain findings with a non-`⊥` score required
    /// before a score may be reported at all.
    pub n_min: usize,
    /// Minimum total evidence item count required alongside `n_min`.
    pub e_min: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { n_min: 2, e_min: 3 }
    }
}

/// Tolerance for the tie-break rule in spec §4.7: "when two domain scores
/// are equal and within ε of the mean".
const TIE_BREAK_EPSILON: f64 = 0.02;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub final_risk: Option<f64>,
    pub confidence: f64,
    pub narrative: String,
}

/// Combine domain findings into the investigation's final score (spec
/// §4.7). `tools_used`/`max_tools` feed the confidence model's
/// tool-success factor (number of analyzer/detector invocations that
/// actually ran vs. the graph's total possible tool calls).
pub fn aggregate(
    findings: &[DomainFinding],
    tools_used: usize,
    max_tools: usize,
    config: AggregatorConfig,
) -> Result<AggregateResult> {
    let scored: Vec<&DomainFinding> = findings.iter().filter(|f| f.risk_score.is_some()).collect();
    let total_evidence: usize = findings.iter().map(|f| f.evidence.len()).sum();

    // Step 1: evidence gating.
    if scored.len() < config.n_min && total_evidence < config.e_min {
        return Ok(AggregateResult {
            final_risk: None,
            confidence: 0.0,
            narrative: "insufficient evidence: analysis did not run to completion".to_string(),
        });
    }

    if scored.is_empty() {
        return Ok(AggregateResult {
            final_risk: None,
            confidence: 0.0,
            narrative: "all domain scores are bottom (⊥)".to_string(),
        });
    }

    // Step 2: weighted mean composition, renormalized over domains that
    // actually reported a score. The Risk domain's nominal weight (0.3)
    // already represents "full weight" for post-hoc detector output — it
    // is never further discounted once it has fired.
    let total_weight: f64 = scored.iter().map(|f| f.domain.weight()).sum();
    let weighted_sum: f64 = scored
        .iter()
        .map(|f| f.domain.weight() * f.risk_score.unwrap())
        .sum();
    let final_risk = if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        scored.iter().map(|f| f.risk_score.unwrap()).sum::<f64>() / scored.len() as f64
    };

    // Step 3: confidence, four weighted factors.
    let domain_coverage = scored.len() as f64 / Domain::ALL.len() as f64;
    let evidence_density = (total_evidence as f64 / 3.0).min(1.0);
    let tool_success = if max_tools > 0 {
        (tools_used as f64 / max_tools as f64).min(1.0)
    } else {
        0.0
    };
    let score_plausibility = if (0.2..=0.8).contains(&final_risk) {
        1.0
    } else {
        0.5
    };

    let factors = [domain_coverage, evidence_density, tool_success, score_plausibility];
    if factors.iter().all(|f| *f == 0.0) {
        return Err(Error::NoAnalysisData);
    }
    let confidence = factors.iter().sum::<f64>() / factors.len() as f64;

    let narrative = build_narrative(&scored, final_risk);

    Ok(AggregateResult {
        final_risk: Some(final_risk.clamp(0.0, 1.0)),
        confidence: confidence.clamp(0.0, 1.0),
        narrative,
    })
}

fn build_narrative(scored: &[&DomainFinding], mean: f64) -> String {
    let mut parts: Vec<String> = scored
        .iter()
        .map(|f| format!("{}={:.2}", f.domain, f.risk_score.unwrap_or(0.0)))
        .collect();

    // Tie-break rule: when two domain scores are equal and both within ε
    // of the mean, call out the higher-severity (larger evidence count)
    // detector explicitly.
    let near_mean: Vec<&&DomainFinding> = scored
        .iter()
        .filter(|f| (f.risk_score.unwrap_or(0.0) - mean).abs() <= TIE_BREAK_EPSILON)
        .collect();
    if near_mean.len() >= 2 {
        if let Some(dominant) = near_mean.iter().max_by_key(|f| f.evidence.len()) {
            parts.push(format!("tie-break favors {} (more evidence)", dominant.domain));
        }
    }

    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::Evidence;

    fn finding(domain: Domain, score: Option<f64>, evidence_count: usize) -> DomainFinding {
        DomainFinding {
            domain,
            risk_score: score,
            confidence: 0.5,
            evidence: (0..evidence_count)
                .map(|i| Evidence::new("e", i.to_string()))
                .collect(),
            narrative: String::new(),
        }
    }

    #[test]
    fn gates_when_below_both_thresholds() {
        let findings = vec![finding(Domain::Device, Some(0.5), 1)];
        let result = aggregate(&findings, 1, 5, AggregatorConfig::default()).unwrap();
        assert_eq!(result.final_risk, None);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn weighted_mean_over_scored_domains() {
        let findings = vec![
            finding(Domain::Device, Some(0.8), 2),
            finding(Domain::Network, Some(0.4), 2),
            finding(Domain::Risk, None, 1),
        ];
        let result = aggregate(&findings, 3, 5, AggregatorConfig::default()).unwrap();
        assert!(result.final_risk.is_some());
        let expected = (0.2 * 0.8 + 0.2 * 0.4) / (0.2 + 0.2);
        assert!((result.final_risk.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn bottom_when_all_domains_bottom() {
        let findings = vec![
            finding(Domain::Device, None, 2),
            finding(Domain::Network, None, 2),
        ];
        let result = aggregate(&findings, 2, 5, AggregatorConfig::default()).unwrap();
        assert_eq!(result.final_risk, None);
    }
}
