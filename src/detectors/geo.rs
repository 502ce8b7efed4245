//! Geo-impossibility-with-corroboration detector.
//!
//! Flags consecutive transactions implying a travel speed over 600 mph
//! AND sharing either `device_id` or the card fingerprint (`BIN|last4`).
//! Requiring corroboration avoids VPN false positives, where IP-derived
//! location jumps without any other shared signal.

use crate::detectors::{DetectorResult, Severity};
use crate::warehouse::Transaction;

const IMPOSSIBLE_SPEED_MPH: f64 = 600.0;
const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Country-centroid lookup used as a coarse proxy for "location" when the
/// only signal available is `ip_country`/`bin_country` (no precise
/// geocoding is in scope for this core). Unknown countries are treated as
/// "no distance computable" rather than defaulting to (0, 0).
fn country_centroid(country: &str) -> Option<(f64, f64)> {
    match country.to_ascii_uppercase().as_str() {
        "US" => Some((39.8, -98.6)),
        "GB" => Some((54.0, -2.0)),
        "CA" => Some((56.1, -106.3)),
        "AU" => Some((-25.3, 133.8)),
        "DE" => Some((51.2, 10.4)),
        "FR" => Some((46.2, 2.2)),
        "JP" => Some((36.2, 138.3)),
        "BR" => Some((-14.2, -51.9)),
        "IN" => Some((20.6, 78.9)),
        "CN" => Some((35.9, 104.2)),
        "RU" => Some((61.5, 105.3)),
        "NG" => Some((9.1, 8.7)),
        "ZA" => Some((-30.6, 22.9)),
        _ => None,
    }
}

fn haversine_miles(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().asin()
}

fn card_fingerprint(tx: &Transaction) -> String {
    format!("{}|{}", tx.bin, tx.last_four)
}

fn corroborated(a: &Transaction, b: &Transaction) -> bool {
    let same_device = match (&a.device_id, &b.device_id) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    };
    same_device || card_fingerprint(a) == card_fingerprint(b)
}

pub fn detect(transactions: &[Transaction]) -> DetectorResult {
    let mut sorted: Vec<&Transaction> = transactions.iter().collect();
    sorted.sort_by_key(|t| t.datetime);

    let mut evidence = Vec::new();
    let mut max_speed = 0.0f64;

    for pair in sorted.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (Some(country_a), Some(country_b)) = (a.ip_country.as_deref(), b.ip_country.as_deref())
        else {
            continue;
        };
        if country_a == country_b {
            continue;
        }
        let (Some(pa), Some(pb)) = (country_centroid(country_a), country_centroid(country_b))
        else {
            continue;
        };

        let hours = (b.datetime - a.datetime).num_seconds() as f64 / 3600.0;
        if hours <= 0.0 {
            continue;
        }
        let distance = haversine_miles(pa, pb);
        let speed = distance / hours;

        if speed > IMPOSSIBLE_SPEED_MPH && corroborated(a, b) {
            max_speed = max_speed.max(speed);
            evidence.push(format!(
                "{} -> {}: {country_a} to {country_b} at ~{speed:.0} mph (corroborated by {})",
                a.tx_id,
                b.tx_id,
                if a.device_id == b.device_id && a.device_id.is_some() {
                    "device_id"
                } else {
                    "card fingerprint"
                }
            ));
        }
    }

    let detected = !evidence.is_empty();
    let severity = if max_speed > 3000.0 {
        Severity::High
    } else if detected {
        Severity::Medium
    } else {
        Severity::Low
    };

    DetectorResult {
        name: "geo_impossible_with_corroboration",
        detected,
        severity,
        evidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::Decision;
    use chrono::{Duration, Utc};

    fn tx(id: &str, country: &str, device: &str, minutes_offset: i64) -> Transaction {
        Transaction {
            tx_id: id.to_string(),
            datetime: Utc::now() + Duration::minutes(minutes_offset),
            merchant_id: "m1".to_string(),
            amount: 10.0,
            currency: "USD".to_string(),
            bin: "411111".to_string(),
            last_four: "1234".to_string(),
            ip: "203.0.113.1".to_string(),
            ip_country: Some(country.to_string()),
            bin_country: None,
            device_id: Some(device.to_string()),
            email_normalized: None,
            user_agent: None,
            decision: Some(Decision::Approved),
            predicted_risk: None,
            actual_label: None,
        }
    }

    #[test]
    fn flags_impossible_travel_with_shared_device() {
        let txs = vec![tx("t1", "US", "dev-1", 0), tx("t2", "JP", "dev-1", 30)];
        let result = detect(&txs);
        assert!(result.detected);
    }

    #[test]
    fn no_flag_without_corroboration() {
        let txs = vec![tx("t1", "US", "dev-1", 0), tx("t2", "JP", "dev-2", 30)];
        let result = detect(&txs);
        assert!(!result.detected, "VPN-looking jump without corroboration must not flag");
    }

    #[test]
    fn no_flag_for_same_country() {
        let txs = vec![tx("t1", "US", "dev-1", 0), tx("t2", "US", "dev-1", 1)];
        let result = detect(&txs);
        assert!(!result.detected);
    }
}
