//! Entity normalization and predicate building.
//!
//! Normalization must be idempotent and total: every accepted raw form has
//! exactly one canonical form, and re-normalizing a canonical form is a
//! no-op. `build_predicate` is dialect-aware because column names and
//! case-sensitivity differ between the columnar and relational warehouse
//! providers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::warehouse::dialect::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Email,
    Phone,
    Device,
    Ip,
    Account,
    CardFingerprint,
    Merchant,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Device => "device",
            Self::Ip => "ip",
            Self::Account => "account",
            Self::CardFingerprint => "card_fingerprint",
            Self::Merchant => "merchant",
        };
        write!(f, "{s}")
    }
}

/// A normalized entity value, the atomic unit the orchestrator investigates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub normalized_value: String,
}

impl Entity {
    pub fn new(entity_type: EntityType, raw: &str) -> Result<Self> {
        let normalized_value = normalize(entity_type, raw)?;
        Ok(Self {
            entity_type,
            normalized_value,
        })
    }

    /// The `/24` (IPv4) or `/48` (IPv6) subnet for an IP entity, used by the
    /// network analyzer for ASN/VPN diversity checks. Returns `None` for
    /// non-IP entities.
    pub fn subnet(&self) -> Option<String> {
        if self.entity_type != EntityType::Ip {
            return None;
        }
        subnet_of(&self.normalized_value)
    }
}

/// Boolean combinator over a set of entities: compound entities are
/// ordered sets of `Entity` values combined under a boolean predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundEntity {
    pub op: CompoundOp,
    pub members: Vec<Entity>,
}

static PHONE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9+]").unwrap());

/// Normalize a raw value for the given entity type.
pub fn normalize(entity_type: EntityType, raw: &str) -> Result<String> {
    match entity_type {
        EntityType::Email => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(Error::invalid_format("email", raw));
            }
            Ok(trimmed.to_lowercase())
        }
        EntityType::Phone => normalize_phone(raw),
        EntityType::CardFingerprint => normalize_card_fingerprint(raw),
        // Per spec: unchanged value, no rejection case. Subnet derivation
        // (`subnet_of`) tolerates unparseable input by returning `None`
        // rather than rejecting the entity itself.
        EntityType::Ip => Ok(raw.trim().to_string()),
        EntityType::Device | EntityType::Account | EntityType::Merchant => {
            Ok(raw.trim().to_string())
        }
    }
}

fn normalize_phone(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_format("phone", raw));
    }
    let has_plus = trimmed.starts_with('+');
    let digits: String = PHONE_DIGITS.replace_all(trimmed, "").chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(Error::invalid_format("phone", raw));
    }
    // E.164: leading '+', country code + subscriber number, max 15 digits.
    let e164 = if has_plus {
        format!("+{digits}")
    } else if digits.len() == 10 {
        // Bare 10-digit number: assume NANP (+1) the way the source's
        // `to_e164` helper defaults unprefixed US-shaped numbers.
        format!("+1{digits}")
    } else {
        format!("+{digits}")
    };
    if e164.len() > 16 {
        return Err(Error::invalid_format("phone", raw));
    }
    Ok(e164)
}

fn normalize_card_fingerprint(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let sep = if trimmed.contains('|') {
        '|'
    } else if trimmed.contains('-') {
        '-'
    } else {
        return Err(Error::invalid_format("card_fingerprint", raw));
    };
    let parts: Vec<&str> = trimmed.split(sep).map(str::trim).collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(Error::invalid_format("card_fingerprint", raw));
    }
    Ok(format!("{}|{}", parts[0], parts[1]))
}

fn subnet_of(ip: &str) -> Option<String> {
    use std::net::IpAddr;
    match ip.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            Some(format!("{}.{}.{}.0/24", o[0], o[1], o[2]))
        }
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            Some(format!(
                "{:x}:{:x}:{:x}::/48",
                seg[0], seg[1], seg[2]
            ))
        }
    }
}

/// A dialect-rendered WHERE fragment plus its bind value, built by
/// `build_predicate`. Kept as a simple struct (no query-builder AST) since
/// the gateway composes these textually per §4.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment {
    pub clause: String,
    pub binds: Vec<String>,
}

/// Build the dialect-specific WHERE fragment for an entity, following
/// `entity_filtering.py`'s asymmetric email-column mapping.
pub fn build_predicate(entity: &Entity, dialect: Dialect) -> SqlFragment {
    match entity.entity_type {
        EntityType::Email => match dialect {
            Dialect::Snowflake => SqlFragment {
                clause: "LOWER(EMAIL) = ?".to_string(),
                binds: vec![entity.normalized_value.clone()],
            },
            Dialect::Postgres => SqlFragment {
                clause: "email_normalized = ?".to_string(),
                binds: vec![entity.normalized_value.clone()],
            },
        },
        EntityType::CardFingerprint => {
            let (bin, last4) = entity
                .normalized_value
                .split_once('|')
                .unwrap_or((entity.normalized_value.as_str(), ""));
            let (bin_col, last4_col) = match dialect {
                Dialect::Snowflake => ("CARD_BIN", "LAST_FOUR"),
                Dialect::Postgres => ("card_bin", "last_four"),
            };
            SqlFragment {
                clause: format!("{bin_col} = ? AND {last4_col} = ?"),
                binds: vec![bin.to_string(), last4.to_string()],
            }
        }
        other => {
            let col = dialect.column_for(other);
            SqlFragment {
                clause: format!("{col} = ?"),
                binds: vec![entity.normalized_value.clone()],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_idempotent() {
        let once = normalize(EntityType::Email, "  Fraudster@Example.com ").unwrap();
        let twice = normalize(EntityType::Email, &once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, "fraudster@example.com");
    }

    #[test]
    fn card_fingerprint_splits_on_pipe_or_dash() {
        assert_eq!(
            normalize(EntityType::CardFingerprint, "411111|1234").unwrap(),
            "411111|1234"
        );
        assert_eq!(
            normalize(EntityType::CardFingerprint, "411111-1234").unwrap(),
            "411111|1234"
        );
        assert!(normalize(EntityType::CardFingerprint, "411111").is_err());
        assert!(normalize(EntityType::CardFingerprint, "a-b-c").is_err());
    }

    #[test]
    fn ip_subnet_v4_is_slash24() {
        let e = Entity::new(EntityType::Ip, "203.0.113.42").unwrap();
        assert_eq!(e.subnet().unwrap(), "203.0.113.0/24");
    }

    #[test]
    fn ip_normalization_never_rejects() {
        let e = Entity::new(EntityType::Ip, "not-an-ip").unwrap();
        assert_eq!(e.normalized_value, "not-an-ip");
        assert!(e.subnet().is_none());
    }

    #[test]
    fn device_account_merchant_are_trim_only() {
        assert_eq!(normalize(EntityType::Device, "  abc-123  ").unwrap(), "abc-123");
        assert!(normalize(EntityType::Device, "").is_ok());
    }

    #[test]
    fn email_predicate_differs_by_dialect() {
        let e = Entity::new(EntityType::Email, "a@b.com").unwrap();
        let sf = build_predicate(&e, Dialect::Snowflake);
        let pg = build_predicate(&e, Dialect::Postgres);
        assert!(sf.clause.starts_with("LOWER(EMAIL)"));
        assert_eq!(pg.clause, "email_normalized = ?");
    }
}
