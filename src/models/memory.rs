//! Memory records and identifiers.

use super::MemoryType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Bookkeeping tag marking a record replaced by newer knowledge.
pub const TAG_SUPERSEDED: &str = "superseded";

/// Bookkeeping tag marking a record retired by consolidation.
pub const TAG_ARCHIVED: &str = "archived";

/// Returns true for the reserved tags the store manages itself.
#[must_use]
pub fn is_bookkeeping_tag(tag: &str) -> bool {
    tag == TAG_SUPERSEDED || tag == TAG_ARCHIVED
}

/// Unique identifier for a memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// Creates a memory ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, time-ordered identifier (`UUIDv7`).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

const fn default_confidence() -> f64 {
    1.0
}

/// A persisted piece of project knowledge.
///
/// Unknown fields found in the document are carried in `extra` so a
/// load/save cycle does not drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Unique identifier.
    pub id: MemoryId,
    /// Knowledge category.
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Free text content.
    pub content: String,
    /// Ordered tags, possibly including `superseded` / `archived`.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Last modification timestamp; resets the decay clock.
    pub updated: DateTime<Utc>,
    /// Relevance score in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Number of times the record was returned by a query.
    #[serde(default)]
    pub access_count: u32,
    /// Record this one explicitly replaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<MemoryId>,
    /// Sources folded into this record by consolidation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_from: Option<Vec<MemoryId>>,
    /// Fields this version does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MemoryRecord {
    /// Creates a fresh record stamped at `now`.
    #[must_use]
    pub fn new(memory_type: MemoryType, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: MemoryId::generate(),
            memory_type,
            content: content.into(),
            tags: Vec::new(),
            created: now,
            updated: now,
            confidence: 1.0,
            access_count: 0,
            supersedes: None,
            merged_from: None,
            extra: Map::new(),
        }
    }

    /// Returns true if the record carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Returns true if the record is neither superseded nor archived.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.has_tag(TAG_SUPERSEDED) && !self.has_tag(TAG_ARCHIVED)
    }

    /// Returns true if the record has been superseded.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.has_tag(TAG_SUPERSEDED)
    }

    /// Returns true if the record has been archived.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.has_tag(TAG_ARCHIVED)
    }

    /// Adds a bookkeeping tag and stamps `updated`.
    ///
    /// Returns false (and leaves the record untouched) if the tag is present.
    pub fn mark(&mut self, tag: &str, now: DateTime<Utc>) -> bool {
        if self.has_tag(tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        self.updated = now;
        true
    }

    /// Tags excluding `superseded` and `archived`.
    pub fn visible_tags(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .map(String::as_str)
            .filter(|t| !is_bookkeeping_tag(t))
    }
}

/// A candidate memory submitted for insertion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewMemory {
    /// Knowledge category.
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Free text content.
    pub content: String,
    /// Tags to attach.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Record this candidate explicitly replaces.
    #[serde(default)]
    pub supersedes: Option<MemoryId>,
}

impl NewMemory {
    /// Creates a candidate with no tags.
    #[must_use]
    pub fn new(memory_type: MemoryType, content: impl Into<String>) -> Self {
        Self {
            memory_type,
            content: content.into(),
            tags: Vec::new(),
            supersedes: None,
        }
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Names the record this candidate supersedes.
    #[must_use]
    pub fn superseding(mut self, id: impl Into<MemoryId>) -> Self {
        self.supersedes = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = MemoryId::generate();
        let b = MemoryId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_mark_is_idempotent() {
        let t0 = Utc::now();
        let mut record = MemoryRecord::new(MemoryType::Decision, "Use tokio", t0);
        assert!(record.is_active());

        let t1 = t0 + chrono::Duration::hours(1);
        assert!(record.mark(TAG_SUPERSEDED, t1));
        assert_eq!(record.updated, t1);
        assert!(!record.is_active());

        let t2 = t1 + chrono::Duration::hours(1);
        assert!(!record.mark(TAG_SUPERSEDED, t2));
        assert_eq!(record.updated, t1);
        assert_eq!(record.tags, vec![TAG_SUPERSEDED.to_string()]);
    }

    #[test]
    fn test_visible_tags() {
        let mut record = MemoryRecord::new(MemoryType::Pattern, "Builders everywhere", Utc::now());
        record.tags = vec!["api".into(), TAG_ARCHIVED.into(), "style".into()];
        assert_eq!(record.visible_tags().collect::<Vec<_>>(), vec!["api", "style"]);
    }

    #[test]
    fn test_record_json_shape() {
        let mut record = MemoryRecord::new(MemoryType::Gotcha, "Beware", Utc::now());
        record.access_count = 3;
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "gotcha");
        assert_eq!(json["accessCount"], 3);
        assert!(json.get("mergedFrom").is_none());
        assert!(json.get("supersedes").is_none());
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let raw = serde_json::json!({
            "id": "m1",
            "type": "decision",
            "content": "Use Postgres",
            "tags": [],
            "created": "2026-01-01T00:00:00Z",
            "updated": "2026-01-01T00:00:00Z",
            "confidence": 1.0,
            "accessCount": 0,
            "source": "session-42"
        });
        let record: MemoryRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.extra["source"], "session-42");
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["source"], "session-42");
    }
}
