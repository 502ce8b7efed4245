//! Window resolution and auto-expansion.
//!
//! Grounded on `window_computation.py` (preset resolution, half-open
//! `[start, end)` semantics, `recent_14d` anchored at local midnight in
//! America/New_York) and `auto_expand.py` (backward-stepping expansion to
//! meet minimum statistical support, capped by `max_days`).

use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::warehouse::TimeRange;

/// Backward expansion step.
pub const EXPAND_STEP_DAYS: i64 = 7;
/// Default ceiling on total expansion.
pub const DEFAULT_MAX_EXPAND_DAYS: i64 = 180;
/// Default label maturity bound, shared with [`crate::label_joiner`]'s
/// default.
pub const DEFAULT_LABEL_MATURITY_DAYS: i64 = 3;

/// Largest N accepted by `retro_14d_Nmo_back`.
pub const MAX_RETRO_MONTHS_BACK: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPreset {
    Recent14d,
    Retro14dMonthsBack(u32),
    Custom { start: DateTime<Utc>, end: DateTime<Utc> },
}

/// Minimum statistical support a window must meet before its metrics are
/// trusted as-is: `known_transactions ≥ T_tx`, `actual_frauds ≥ T_f`,
/// `predicted_positives ≥ T_p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumSupport {
    pub min_known_transactions: usize,
    pub min_actual_frauds: usize,
    pub min_predicted_positives: usize,
}

impl Default for MinimumSupport {
    fn default() -> Self {
        Self {
            min_known_transactions: 30,
            min_actual_frauds: 5,
            min_predicted_positives: 5,
        }
    }
}

/// A resolved window plus its human label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabeledWindow {
    pub range: TimeRange,
    pub is_retro: bool,
}

/// Resolve a preset into a concrete half-open UTC window.
pub fn resolve(preset: &WindowPreset, now: DateTime<Utc>) -> Result<(LabeledWindow, String)> {
    match preset {
        WindowPreset::Recent14d => {
            let end = local_midnight_new_york(now)?;
            let start = end - Duration::days(14);
            Ok((
                LabeledWindow { range: TimeRange::new(start, end), is_retro: false },
                "recent_14d".to_string(),
            ))
        }
        WindowPreset::Retro14dMonthsBack(n) => {
            if *n == 0 || *n > MAX_RETRO_MONTHS_BACK {
                return Err(Error::Config(format!(
                    "retro_14d_{n}mo_back: N must be in 1..={MAX_RETRO_MONTHS_BACK}"
                )));
            }
            let recent_end = local_midnight_new_york(now)?;
            let shifted_end = shift_months_back(recent_end, *n);
            let shifted_start = shifted_end - Duration::days(14);
            Ok((
                LabeledWindow { range: TimeRange::new(shifted_start, shifted_end), is_retro: true },
                format!("retro_14d_{n}mo_back"),
            ))
        }
        WindowPreset::Custom { start, end } => Ok((
            LabeledWindow { range: TimeRange::new(*start, *end), is_retro: false },
            "custom".to_string(),
        )),
    }
}

fn local_midnight_new_york(now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let local_date = now.with_timezone(&New_York).date_naive();
    let local_midnight = local_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::Internal("invalid local midnight".to_string()))?;
    New_York
        .from_local_datetime(&local_midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::Internal("ambiguous or nonexistent local midnight (DST transition)".to_string()))
}

fn shift_months_back(dt: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let naive = dt.date_naive();
    let shifted = naive.checked_sub_months(Months::new(months)).unwrap_or(naive);
    Utc.from_utc_datetime(&shifted.and_time(dt.time()))
}

/// Counts the auto-expand loop needs to evaluate support against
/// `MinimumSupport`. Computed by the caller from
/// whatever transaction set it already fetched for the candidate window.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowSupportCounts {
    pub known_transactions: usize,
    pub actual_frauds: usize,
    pub predicted_positives: usize,
}

impl WindowSupportCounts {
    fn meets(&self, support: MinimumSupport) -> bool {
        self.known_transactions >= support.min_known_transactions
            && self.actual_frauds >= support.min_actual_frauds
            && self.predicted_positives >= support.min_predicted_positives
    }
}

/// `auto_expand_meta` returned alongside the (possibly expanded) window,
/// e.g. `{expanded, attempts:[14,21,28,35], reasons:[]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoExpandMeta {
    pub expanded: bool,
    /// Window length in days at each attempt, first entry is the
    /// original (unexpanded) length.
    pub attempts: Vec<i64>,
    pub reasons: Vec<String>,
}

/// Expand `window` backward in `EXPAND_STEP_DAYS` increments until
/// `count_fn` reports support meeting `support`, or `max_days`/the retro
/// label-maturity boundary stops it.
///
/// `count_fn` is handed each candidate window and must return the support
/// counts for it (typically: re-run the mapper + label joiner over the
/// wider window).
pub async fn auto_expand<F, Fut>(
    window: LabeledWindow,
    support: MinimumSupport,
    max_days: i64,
    label_maturity_days: i64,
    now: DateTime<Utc>,
    mut count_fn: F,
) -> Result<(TimeRange, AutoExpandMeta)>
where
    F: FnMut(TimeRange) -> Fut,
    Fut: std::future::Future<Output = Result<WindowSupportCounts>>,
{
    let mut current = window.range;
    let mut attempts = vec![window_days(current)];
    let mut reasons = Vec::new();

    let mut counts = count_fn(current).await?;
    if counts.meets(support) {
        return Ok((current, AutoExpandMeta { expanded: false, attempts, reasons }));
    }

    loop {
        let candidate_days = window_days(current) + EXPAND_STEP_DAYS;
        if candidate_days > max_days {
            reasons.push(format!("max_days ({max_days}) exceeded, stopping expansion"));
            break;
        }

        let candidate = TimeRange::new(current.start - Duration::days(EXPAND_STEP_DAYS), current.end);

        if window.is_retro {
            let maturity_bound = now - Duration::days(label_maturity_days);
            if candidate.end > maturity_bound {
                reasons.push(
                    "retro window end would exceed label maturity bound, stopping expansion".to_string(),
                );
                break;
            }
        }

        current = candidate;
        attempts.push(window_days(current));
        counts = count_fn(current).await?;
        if counts.meets(support) {
            return Ok((current, AutoExpandMeta { expanded: true, attempts, reasons }));
        }
    }

    Ok((current, AutoExpandMeta { expanded: attempts.len() > 1, attempts, reasons }))
}

fn window_days(range: TimeRange) -> i64 {
    (range.end - range.start).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn recent_14d_is_exactly_fourteen_days() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 15, 30, 0).unwrap();
        let (window, label) = resolve(&WindowPreset::Recent14d, now).unwrap();
        assert_eq!(label, "recent_14d");
        assert_eq!(window.range.end - window.range.start, Duration::days(14));
        assert!(!window.is_retro);
    }

    #[test]
    fn retro_rejects_n_above_six() {
        let now = Utc::now();
        assert!(resolve(&WindowPreset::Retro14dMonthsBack(7), now).is_err());
        assert!(resolve(&WindowPreset::Retro14dMonthsBack(0), now).is_err());
    }

    #[test]
    fn retro_shifts_recent_window_back_by_n_months() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let (recent, _) = resolve(&WindowPreset::Recent14d, now).unwrap();
        let (retro, label) = resolve(&WindowPreset::Retro14dMonthsBack(2), now).unwrap();
        assert_eq!(label, "retro_14d_2mo_back");
        assert!(retro.range.end < recent.range.end);
        assert_eq!(retro.range.end - retro.range.start, Duration::days(14));
    }

    #[tokio::test]
    async fn expands_until_support_met_matching_scenario() {
        let window = LabeledWindow {
            range: TimeRange::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            ),
            is_retro: true,
        };
        let support = MinimumSupport {
            min_known_transactions: 1,
            min_actual_frauds: 5,
            min_predicted_positives: 1,
        };
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let (_, meta) = auto_expand(window, support, 180, 3, now, |range| async move {
            let days = window_days(range);
            // 3 frauds at 14 days, +2 per extra week, crossing T_f=5 at 28 days.
            let frauds = 3 + ((days - 14) / 7) * 2;
            Ok(WindowSupportCounts {
                known_transactions: 10,
                actual_frauds: frauds.max(0) as usize,
                predicted_positives: 10,
            })
        })
        .await
        .unwrap();

        assert!(meta.expanded);
        assert_eq!(meta.attempts, vec![14, 21, 28]);
    }

    #[tokio::test]
    async fn stops_at_max_days() {
        let window = LabeledWindow {
            range: TimeRange::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            ),
            is_retro: false,
        };
        let support = MinimumSupport::default();
        let now = Utc::now();

        let (_, meta) = auto_expand(window, support, 20, 3, now, |_| async {
            Ok(WindowSupportCounts::default())
        })
        .await
        .unwrap();

        assert!(meta.reasons.iter().any(|r| r.contains("max_days")));
    }
}
