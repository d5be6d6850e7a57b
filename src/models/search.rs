//! Query filters and results.

use super::{MemoryRecord, MemoryType};
use serde::Serialize;
use std::collections::BTreeMap;

/// Filter for listing memories.
///
/// Empty `tags` means no tag constraint; otherwise any overlap matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFilter {
    /// Exact type match.
    pub memory_type: Option<MemoryType>,
    /// Any-tag overlap (exact, case-sensitive).
    pub tags: Vec<String>,
    /// Include superseded and archived records.
    pub include_inactive: bool,
}

impl MemoryFilter {
    /// Creates an unconstrained filter over active records.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one memory type.
    #[must_use]
    pub const fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    /// Restricts to records sharing any of `tags`.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Includes superseded and archived records.
    #[must_use]
    pub const fn including_inactive(mut self) -> Self {
        self.include_inactive = true;
        self
    }

    /// Returns true if `record` passes the filter.
    #[must_use]
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if !self.include_inactive && !record.is_active() {
            return false;
        }
        if self.memory_type.is_some_and(|t| t != record.memory_type) {
            return false;
        }
        self.tags.is_empty() || self.tags.iter().any(|t| record.has_tag(t))
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// The matched record, with its updated access count.
    pub memory: MemoryRecord,
    /// Weighted token-overlap score.
    pub score: u32,
}

/// Record counts by lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    /// All records, active or not.
    pub total: usize,
    /// Records neither superseded nor archived.
    pub active: usize,
    /// Records tagged `superseded`.
    pub superseded: usize,
    /// Records tagged `archived`.
    pub archived: usize,
    /// Active records per type.
    pub by_type: BTreeMap<MemoryType, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TAG_SUPERSEDED;
    use chrono::Utc;

    fn record(ty: MemoryType, tags: &[&str]) -> MemoryRecord {
        let mut r = MemoryRecord::new(ty, "content", Utc::now());
        r.tags = tags.iter().map(ToString::to_string).collect();
        r
    }

    #[test]
    fn test_default_filter_matches_active_only() {
        let filter = MemoryFilter::new();
        assert!(filter.matches(&record(MemoryType::Context, &[])));
        assert!(!filter.matches(&record(MemoryType::Context, &[TAG_SUPERSEDED])));
        assert!(
            filter
                .including_inactive()
                .matches(&record(MemoryType::Context, &[TAG_SUPERSEDED]))
        );
    }

    #[test]
    fn test_type_and_tags() {
        let filter = MemoryFilter::new()
            .with_type(MemoryType::Decision)
            .with_tags(["db", "infra"]);
        assert!(filter.matches(&record(MemoryType::Decision, &["infra"])));
        assert!(!filter.matches(&record(MemoryType::Decision, &["ui"])));
        assert!(!filter.matches(&record(MemoryType::Pattern, &["db"])));
        // tag matching for listings is exact
        assert!(!filter.matches(&record(MemoryType::Decision, &["DB"])));
    }
}
