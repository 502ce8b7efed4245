//! Canonical + entity-view artifact path resolution: "For
//! investigation result artifacts, the resolver produces two paths:
//! canonical `workspace/investigations/YYYY/MM/<inv_id>/artifacts/
//! investigation_<type>_<id>_<range>.json`, and entity-view
//! `workspace/artifacts/<entity_type>/<entity_id>/YYYY/MM/
//! inv_<id>__artifact.json`."
//!
//! Grounded on `artifact_persistence.py`'s
//! `resolve_investigation_artifact_path` two-path contract.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::entity::Entity;

/// Sanitizes an entity value for use as a path component: anything that
/// isn't alphanumeric, `-`, or `_` becomes `_`, since entity values may
/// contain `@`, `.`, `:` which are unsafe path segments.
fn normalize_for_path(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub canonical: PathBuf,
    pub entity_view: PathBuf,
}

/// Resolves both paths for an investigation artifact of `kind` (e.g.
/// `"comparison"`, `"findings"`) over `[range_start, range_end)`.
pub fn resolve_investigation_artifact_path(
    workspace_root: &std::path::Path,
    investigation_id: &str,
    entity: &Entity,
    kind: &str,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    created_at: DateTime<Utc>,
) -> ArtifactPaths {
    let entity_type = entity.entity_type.to_string();
    let entity_id = normalize_for_path(&entity.normalized_value);
    let range = format!("{}_{}", range_start.format("%Y%m%d"), range_end.format("%Y%m%d"));

    let canonical = workspace_root
        .join("investigations")
        .join(format!("{:04}", created_at.format("%Y")))
        .join(format!("{:02}", created_at.format("%m")))
        .join(investigation_id)
        .join("artifacts")
        .join(format!("investigation_{kind}_{entity_id}_{range}.json"));

    let entity_view = workspace_root
        .join("artifacts")
        .join(&entity_type)
        .join(&entity_id)
        .join(format!("{:04}", created_at.format("%Y")))
        .join(format!("{:02}", created_at.format("%m")))
        .join(format!("inv_{investigation_id}__artifact.json"));

    ArtifactPaths { canonical, entity_view }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use chrono::TimeZone;

    #[test]
    fn produces_both_paths_with_expected_shape() {
        let entity = Entity::new(EntityType::Email, "a@b.com").unwrap();
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let created = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        let paths = resolve_investigation_artifact_path(
            std::path::Path::new("workspace"),
            "inv-123",
            &entity,
            "comparison",
            start,
            end,
            created,
        );

        assert_eq!(
            paths.canonical,
            PathBuf::from("workspace/investigations/2026/01/inv-123/artifacts/investigation_comparison_a_b_com_20260101_20260115.json")
        );
        assert_eq!(
            paths.entity_view,
            PathBuf::from("workspace/artifacts/email/a_b_com/2026/01/inv_inv-123__artifact.json")
        );
    }

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(normalize_for_path("a@b.com"), "a_b_com");
        assert_eq!(normalize_for_path("192.168.1.1"), "192_168_1_1");
    }
}
