//! The persisted project document.

use super::MemoryRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Everything the store knows about one project.
///
/// Superseded and archived records stay in `memories` until pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    /// Document schema version.
    pub version: u32,
    /// Project name shown in the digest header.
    #[serde(default)]
    pub name: String,
    /// Optional one-line project description.
    #[serde(default)]
    pub description: String,
    /// All records, including inactive ones.
    #[serde(default)]
    pub memories: Vec<MemoryRecord>,
    /// Time of the last save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Time of the last applied consolidation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_consolidation: Option<DateTime<Utc>>,
    /// Number of extraction runs recorded.
    #[serde(default)]
    pub extraction_count: u64,
    /// Fields this version does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectState {
    /// Creates an empty state at the current schema version.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            name: name.into(),
            description: String::new(),
            memories: Vec::new(),
            last_updated: None,
            last_consolidation: None,
            extraction_count: 0,
            extra: Map::new(),
        }
    }

    /// Iterates over records that are neither superseded nor archived.
    pub fn active(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.memories.iter().filter(|m| m.is_active())
    }

    /// Number of active records.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Looks up a record by id.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&MemoryRecord> {
        self.memories.iter().find(|m| m.id.as_str() == id)
    }

    /// Looks up a record by id for mutation.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut MemoryRecord> {
        self.memories.iter_mut().find(|m| m.id.as_str() == id)
    }
}

impl Default for ProjectState {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemoryType, TAG_ARCHIVED};

    #[test]
    fn test_fresh_state() {
        let state = ProjectState::new("demo");
        assert_eq!(state.version, CURRENT_SCHEMA_VERSION);
        assert_eq!(state.extraction_count, 0);
        assert!(state.memories.is_empty());
        assert_eq!(state.active_count(), 0);
    }

    #[test]
    fn test_active_excludes_archived() {
        let now = Utc::now();
        let mut state = ProjectState::new("demo");
        let keep = MemoryRecord::new(MemoryType::Decision, "a", now);
        let mut gone = MemoryRecord::new(MemoryType::Decision, "b", now);
        gone.mark(TAG_ARCHIVED, now);
        let gone_id = gone.id.clone();
        state.memories.push(keep);
        state.memories.push(gone);

        assert_eq!(state.active_count(), 1);
        assert!(state.find(gone_id.as_str()).is_some());
    }

    #[test]
    fn test_camel_case_keys() {
        let mut state = ProjectState::new("demo");
        state.extraction_count = 4;
        state.extra.insert("owner".into(), Value::from("team-a"));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["extractionCount"], 4);
        assert_eq!(json["owner"], "team-a");
        assert!(json.get("lastConsolidation").is_none());
    }
}
