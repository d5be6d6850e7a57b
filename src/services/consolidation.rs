//! Consolidation protocol.
//!
//! The store proposes its active records grouped by type. An external
//! summarizer answers each group with a plan, which must be validated
//! against the group before it can be applied here. Applying a batch of
//! plans archives drops, supersedes merge sources, synthesizes one record
//! per merge, then prunes archived records past the retention window.

use super::store::clean_tags;
use super::{MemoryStore, record_operation};
use crate::Result;
use crate::models::{
    ConsolidationCandidate, ConsolidationGroup, MemoryRecord, MemoryType, TAG_ARCHIVED,
    TAG_SUPERSEDED, ValidatedPlan,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info_span, instrument};

/// Statistics from applying consolidation plans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationStats {
    /// Plans applied.
    pub groups: usize,
    /// Records synthesized from merges.
    pub merged: usize,
    /// Merge sources tagged `superseded`.
    pub superseded: usize,
    /// Dropped records tagged `archived`.
    pub archived: usize,
    /// Archived records permanently removed.
    pub pruned: usize,
}

impl ConsolidationStats {
    /// Returns true if no record changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.merged == 0 && self.superseded == 0 && self.archived == 0 && self.pruned == 0
    }

    /// Returns a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            format!("No changes from {} consolidation plan(s)", self.groups)
        } else {
            format!(
                "Groups: {}, Merged: {} (from {} sources), Archived: {}, Pruned: {}",
                self.groups, self.merged, self.superseded, self.archived, self.pruned
            )
        }
    }
}

impl MemoryStore {
    /// Returns true when the store should be consolidated.
    ///
    /// That is when the active count exceeds the configured maximum, or
    /// the extraction count is a positive multiple of the interval.
    #[must_use]
    pub fn needs_consolidation(&self) -> bool {
        let config = &self.config().consolidation;
        let count = self.state.extraction_count;
        self.state.active_count() > config.max_active
            || (config.extraction_interval > 0 && count > 0 && count % config.extraction_interval == 0)
    }

    /// The active records of `memory_type`, as a proposal group.
    #[must_use]
    pub fn consolidation_group(&self, memory_type: MemoryType) -> ConsolidationGroup {
        ConsolidationGroup {
            memory_type,
            memories: self
                .state
                .active()
                .filter(|m| m.memory_type == memory_type)
                .map(|m| ConsolidationCandidate {
                    id: m.id.clone(),
                    content: m.content.clone(),
                })
                .collect(),
        }
    }

    /// One non-empty proposal group per type, in fixed type order.
    ///
    /// Callers decide which groups are large enough to be worth sending.
    #[must_use]
    pub fn memories_for_consolidation(&self) -> Vec<ConsolidationGroup> {
        MemoryType::all()
            .iter()
            .map(|t| self.consolidation_group(*t))
            .filter(|g| !g.is_empty())
            .collect()
    }

    /// Applies validated plans, prunes, and persists once.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn apply_consolidation(
        &mut self,
        plans: impl IntoIterator<Item = ValidatedPlan>,
    ) -> Result<ConsolidationStats> {
        self.apply_consolidation_at(plans, Utc::now())
    }

    /// Like [`apply_consolidation`](Self::apply_consolidation) at an explicit time.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    #[instrument(
        name = "strata.memory.consolidate",
        skip(self, plans, now),
        fields(component = "memory", operation = "consolidate")
    )]
    pub fn apply_consolidation_at(
        &mut self,
        plans: impl IntoIterator<Item = ValidatedPlan>,
        now: DateTime<Utc>,
    ) -> Result<ConsolidationStats> {
        let start = Instant::now();
        let mut stats = ConsolidationStats::default();

        for plan in plans {
            let _span = info_span!("strata.memory.consolidate.apply", memory_type = %plan.memory_type())
                .entered();
            self.apply_plan(&plan, now, &mut stats);
            stats.groups += 1;
        }

        stats.pruned = self.prune_archived_at(now);
        self.state.last_consolidation = Some(now);

        debug!(
            merged = stats.merged,
            archived = stats.archived,
            pruned = stats.pruned,
            "Consolidation applied"
        );
        let result = self.persist().map(|()| stats);
        record_operation("consolidate", start, result.is_ok());
        result
    }

    fn apply_plan(&mut self, plan: &ValidatedPlan, now: DateTime<Utc>, stats: &mut ConsolidationStats) {
        for id in plan.drops() {
            if let Some(record) = self.state.find_mut(id.as_str()) {
                if record.mark(TAG_ARCHIVED, now) {
                    stats.archived += 1;
                }
            }
        }

        for merge in plan.merges() {
            let memory_type = merge
                .sources
                .first()
                .and_then(|id| self.state.find(id.as_str()))
                .map_or_else(|| plan.memory_type(), |r| r.memory_type);

            for id in &merge.sources {
                if let Some(record) = self.state.find_mut(id.as_str()) {
                    if record.mark(TAG_SUPERSEDED, now) {
                        stats.superseded += 1;
                    }
                }
            }

            let mut record = MemoryRecord::new(memory_type, merge.content.trim(), now);
            record.tags = clean_tags(merge.tags.clone());
            record.merged_from = Some(merge.sources.clone());
            debug!(id = %record.id, sources = merge.sources.len(), "Synthesized merged record");
            self.state.memories.push(record);
            stats.merged += 1;
        }
    }

    /// Removes archived records untouched for the retention window.
    ///
    /// Returns how many were removed. Does not persist.
    pub fn prune_archived_at(&mut self, now: DateTime<Utc>) -> usize {
        let retention = Duration::days(i64::from(self.config().consolidation.retention_days));
        let before = self.state.memories.len();
        self.state
            .memories
            .retain(|m| !(m.is_archived() && now - m.updated >= retention));
        before - self.state.memories.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConsolidationPlan, MemoryId, MergeEntry, NewMemory};
    use crate::StrataConfig;
    use tempfile::TempDir;

    fn store() -> (TempDir, MemoryStore) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn add(store: &mut MemoryStore, ty: MemoryType, content: &str, at: DateTime<Utc>) -> MemoryId {
        store.add_memory_at(NewMemory::new(ty, content), at).unwrap().id
    }

    #[test]
    fn test_needs_consolidation_thresholds() {
        let (_dir, mut store) = store();
        assert!(!store.needs_consolidation());

        for _ in 0..9 {
            store.increment_extraction_count().unwrap();
        }
        assert!(!store.needs_consolidation());
        store.increment_extraction_count().unwrap();
        assert!(store.needs_consolidation());
        store.increment_extraction_count().unwrap();
        assert!(!store.needs_consolidation());
    }

    #[test]
    fn test_needs_consolidation_by_count() {
        let dir = TempDir::new().unwrap();
        let mut config = StrataConfig::default();
        config.consolidation.max_active = 2;
        let mut store = MemoryStore::open_with_config(dir.path(), config).unwrap();
        let now = Utc::now();
        add(&mut store, MemoryType::Decision, "alpha beta", now);
        add(&mut store, MemoryType::Decision, "gamma delta", now);
        assert!(!store.needs_consolidation());
        add(&mut store, MemoryType::Decision, "epsilon zeta", now);
        assert!(store.needs_consolidation());
    }

    #[test]
    fn test_groups_follow_type_order_and_skip_empty() {
        let (_dir, mut store) = store();
        let now = Utc::now();
        add(&mut store, MemoryType::Context, "Sprint 4 focus", now);
        add(&mut store, MemoryType::Architecture, "Hexagonal core", now);

        let groups = store.memories_for_consolidation();
        let types: Vec<_> = groups.iter().map(|g| g.memory_type).collect();
        assert_eq!(types, vec![MemoryType::Architecture, MemoryType::Context]);
        assert_eq!(groups[0].memories[0].content, "Hexagonal core");
    }

    #[test]
    fn test_apply_merge_and_drop() {
        let (_dir, mut store) = store();
        let now = Utc::now();
        let a = add(&mut store, MemoryType::Gotcha, "Jest needs TZ set", now);
        let b = add(&mut store, MemoryType::Gotcha, "Snapshots break on CI locale", now);
        let c = add(&mut store, MemoryType::Gotcha, "Old webpack alias bug", now);
        let d = add(&mut store, MemoryType::Gotcha, "Docker needs 4GB", now);

        let group = store.consolidation_group(MemoryType::Gotcha);
        let plan = ConsolidationPlan {
            keep: vec![d.clone()],
            merge: vec![MergeEntry {
                content: "Tests depend on TZ and locale env".into(),
                tags: vec![
                    " testing ".into(),
                    "testing".into(),
                    String::new(),
                    TAG_ARCHIVED.into(),
                    "ci".into(),
                ],
                sources: vec![a.clone(), b.clone()],
            }],
            drop: vec![c.clone()],
        }
        .validate(&group)
        .unwrap();

        let stats = store.apply_consolidation_at([plan], now).unwrap();
        assert_eq!(stats.groups, 1);
        assert_eq!(stats.merged, 1);
        assert_eq!(stats.superseded, 2);
        assert_eq!(stats.archived, 1);
        assert_eq!(stats.pruned, 0);

        let state = store.state();
        assert!(state.find(a.as_str()).unwrap().is_superseded());
        assert!(state.find(b.as_str()).unwrap().is_superseded());
        assert!(state.find(c.as_str()).unwrap().is_archived());
        assert!(state.find(d.as_str()).unwrap().is_active());
        assert_eq!(state.last_consolidation, Some(now));

        let merged = state.memories.last().unwrap();
        assert_eq!(merged.memory_type, MemoryType::Gotcha);
        assert_eq!(merged.tags, vec!["testing".to_string(), "ci".to_string()]);
        assert_eq!(merged.merged_from, Some(vec![a, b]));
        assert!((merged.confidence - 1.0).abs() < f64::EPSILON);
        assert!(merged.is_active());
    }

    #[test]
    fn test_prune_respects_retention_window() {
        let (_dir, mut store) = store();
        let start = Utc::now();
        let old = add(&mut store, MemoryType::Pattern, "Legacy singleton", start);
        let recent = add(&mut store, MemoryType::Pattern, "Service locator", start);

        store
            .state
            .find_mut(old.as_str())
            .unwrap()
            .mark(TAG_ARCHIVED, start - Duration::days(14));
        store
            .state
            .find_mut(recent.as_str())
            .unwrap()
            .mark(TAG_ARCHIVED, start - Duration::days(13));

        let stats = store
            .apply_consolidation_at(Vec::<ValidatedPlan>::new(), start)
            .unwrap();
        assert_eq!(stats.pruned, 1);
        assert!(store.state().find(old.as_str()).is_none());
        assert!(store.state().find(recent.as_str()).is_some());
    }

    #[test]
    fn test_summary() {
        let stats = ConsolidationStats {
            groups: 2,
            merged: 1,
            superseded: 3,
            archived: 1,
            pruned: 0,
        };
        assert_eq!(
            stats.summary(),
            "Groups: 2, Merged: 1 (from 3 sources), Archived: 1, Pruned: 0"
        );
        assert_eq!(
            ConsolidationStats::default().summary(),
            "No changes from 0 consolidation plan(s)"
        );
    }
}
