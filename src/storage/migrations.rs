//! Schema migrations for the state document.
//!
//! Migrations operate on the raw JSON value before it is deserialized, so
//! a document written by an older build can be upgraded in place. Each
//! migration lifts the document from `version - 1` to `version`.

use crate::models::CURRENT_SCHEMA_VERSION;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A single ordered migration step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version the document has after this step.
    pub version: u32,
    /// Human-readable description.
    pub description: &'static str,
    /// Transformation applied to the document root.
    pub apply: fn(&mut Map<String, Value>),
}

/// All known migrations, in ascending version order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 2,
    description: "Backfill confidence and access counts on every record",
    apply: backfill_scores,
}];

fn backfill_scores(root: &mut Map<String, Value>) {
    let Some(Value::Array(memories)) = root.get_mut("memories") else {
        return;
    };
    for memory in memories.iter_mut().filter_map(Value::as_object_mut) {
        memory
            .entry("confidence")
            .or_insert_with(|| Value::from(1.0));
        memory.entry("accessCount").or_insert_with(|| Value::from(0));
    }
}

/// Reads the schema version, treating a missing field as version 1.
#[must_use]
pub fn document_version(root: &Map<String, Value>) -> u32 {
    root.get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(1)
}

/// Applies pending migrations to `root`.
///
/// Returns true if the document was changed. Documents newer than this
/// build are left untouched.
pub fn migrate(root: &mut Map<String, Value>) -> bool {
    let from = document_version(root);
    if from > CURRENT_SCHEMA_VERSION {
        warn!(
            document_version = from,
            supported_version = CURRENT_SCHEMA_VERSION,
            "State document is newer than this build; loading as-is"
        );
        return false;
    }
    if from == CURRENT_SCHEMA_VERSION {
        return false;
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > from) {
        debug!(
            version = migration.version,
            description = migration.description,
            "Applying state migration"
        );
        (migration.apply)(root);
    }
    root.insert("version".to_string(), Value::from(CURRENT_SCHEMA_VERSION));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_v1_document_is_backfilled() {
        let mut root = object(json!({
            "version": 1,
            "memories": [
                {"id": "a", "content": "x"},
                {"id": "b", "content": "y", "confidence": 0.4, "accessCount": 7}
            ]
        }));

        assert!(migrate(&mut root));
        assert_eq!(root["version"], CURRENT_SCHEMA_VERSION);
        assert_eq!(root["memories"][0]["confidence"], 1.0);
        assert_eq!(root["memories"][0]["accessCount"], 0);
        // existing values are kept
        assert_eq!(root["memories"][1]["confidence"], 0.4);
        assert_eq!(root["memories"][1]["accessCount"], 7);
    }

    #[test]
    fn test_missing_version_means_v1() {
        let mut root = object(json!({"memories": []}));
        assert_eq!(document_version(&root), 1);
        assert!(migrate(&mut root));
        assert_eq!(document_version(&root), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_current_and_future_versions_untouched() {
        let mut current = object(json!({"version": CURRENT_SCHEMA_VERSION}));
        assert!(!migrate(&mut current));

        let mut future = object(json!({"version": CURRENT_SCHEMA_VERSION + 1}));
        assert!(!migrate(&mut future));
        assert_eq!(document_version(&future), CURRENT_SCHEMA_VERSION + 1);
    }

    #[test]
    fn test_migrations_are_ordered() {
        let versions: Vec<u32> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        assert_eq!(versions, sorted);
        assert_eq!(versions.last().copied(), Some(CURRENT_SCHEMA_VERSION));
    }
}
