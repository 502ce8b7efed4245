//! Distribution-drift statistics: population stability index and the
//! Kolmogorov-Smirnov statistic.
//!
//! Grounded on `distribution_statistics.py`. Both require at least 10
//! scored transactions per side; the caller in
//! `comparison::mod` enforces that gate before invoking these functions.

pub const MIN_SCORED_FOR_DRIFT: usize = 10;
const DRIFT_BINS: usize = 10;
const PSI_EPSILON: f64 = 1e-6;

fn bin_distribution(scores: &[f64]) -> Vec<f64> {
    let mut counts = vec![0usize; DRIFT_BINS];
    for &s in scores {
        let idx = ((s.clamp(0.0, 1.0) * DRIFT_BINS as f64) as usize).min(DRIFT_BINS - 1);
        counts[idx] += 1;
    }
    let n = scores.len().max(1) as f64;
    counts.into_iter().map(|c| c as f64 / n).collect()
}

/// Population Stability Index: `Σᵢ (pᵦ,ᵢ − pₐ,ᵢ) · ln(pᵦ,ᵢ/pₐ,ᵢ)` over
/// `DRIFT_BINS` equal-width bins of `predicted_risk`.
pub fn psi(a_scores: &[f64], b_scores: &[f64]) -> f64 {
    let a_dist = bin_distribution(a_scores);
    let b_dist = bin_distribution(b_scores);
    a_dist
        .iter()
        .zip(b_dist.iter())
        .map(|(pa, pb)| {
            let pa = pa.max(PSI_EPSILON);
            let pb = pb.max(PSI_EPSILON);
            (pb - pa) * (pb / pa).ln()
        })
        .sum()
}

/// Kolmogorov-Smirnov statistic: `max over x of |Fₐ(x) − Fᵦ(x)|` on the
/// two empirical CDFs.
pub fn ks_statistic(a_scores: &[f64], b_scores: &[f64]) -> f64 {
    let mut a_sorted = a_scores.to_vec();
    a_sorted.sort_by(|x, y| x.partial_cmp(y).unwrap());
    let mut b_sorted = b_scores.to_vec();
    b_sorted.sort_by(|x, y| x.partial_cmp(y).unwrap());

    let mut candidates: Vec<f64> = a_sorted.iter().chain(b_sorted.iter()).copied().collect();
    candidates.sort_by(|x, y| x.partial_cmp(y).unwrap());
    candidates.dedup();

    let ecdf = |sorted: &[f64], x: f64| -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        sorted.partition_point(|&v| v <= x) as f64 / sorted.len() as f64
    };

    candidates
        .iter()
        .map(|&x| (ecdf(&a_sorted, x) - ecdf(&b_sorted, x)).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psi_is_zero_for_identical_distributions() {
        let scores = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.95];
        assert!(psi(&scores, &scores).abs() < 1e-9);
    }

    #[test]
    fn psi_is_positive_for_shifted_distribution() {
        let a: Vec<f64> = (0..20).map(|i| i as f64 / 40.0).collect();
        let b: Vec<f64> = (0..20).map(|i| 0.5 + i as f64 / 40.0).collect();
        assert!(psi(&a, &b) > 0.0);
    }

    #[test]
    fn ks_is_zero_for_identical_samples() {
        let scores = vec![0.1, 0.5, 0.9];
        assert_eq!(ks_statistic(&scores, &scores), 0.0);
    }

    #[test]
    fn ks_is_one_for_disjoint_extremes() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 1.0, 1.0];
        assert!((ks_statistic(&a, &b) - 1.0).abs() < 1e-9);
    }
}
