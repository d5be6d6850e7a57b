//! Memory consolidation types.
//!
//! Consolidation is a two-step protocol. The store proposes one
//! [`ConsolidationGroup`] per memory type, an external summarizer answers
//! with a [`ConsolidationPlan`], and the plan is checked against the group
//! it answers before the store will apply it. Only a [`ValidatedPlan`] can
//! be applied, so an ill-formed plan never reaches the store.

use super::{MemoryId, MemoryType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Minimal view of a record handed to the summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationCandidate {
    /// Record id.
    pub id: MemoryId,
    /// Record content.
    pub content: String,
}

/// Active records of one type proposed for consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationGroup {
    /// Type shared by every candidate.
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Candidates in collection order.
    pub memories: Vec<ConsolidationCandidate>,
}

impl ConsolidationGroup {
    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memories.len()
    }

    /// Returns true if the group has no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }
}

/// One synthesized record replacing several sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeEntry {
    /// Synthesized content.
    pub content: String,
    /// Tags for the synthesized record.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ids the new record replaces.
    pub sources: Vec<MemoryId>,
}

/// A plan as returned by the summarizer, not yet trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationPlan {
    /// Ids left untouched.
    #[serde(default)]
    pub keep: Vec<MemoryId>,
    /// Merges to synthesize.
    #[serde(default)]
    pub merge: Vec<MergeEntry>,
    /// Ids to archive.
    #[serde(default)]
    pub drop: Vec<MemoryId>,
}

/// Where an id landed in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Keep,
    Merge(usize),
    Drop,
}

impl Slot {
    fn describe(self) -> String {
        match self {
            Self::Keep => "keep".to_string(),
            Self::Merge(i) => format!("merge[{i}]"),
            Self::Drop => "drop".to_string(),
        }
    }
}

impl ConsolidationPlan {
    /// Parses a plan from the summarizer's JSON answer.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidPlan(format!("unparseable plan: {e}")))
    }

    /// Checks that the plan partitions `group` and returns an applicable plan.
    ///
    /// Every id of the group must appear exactly once across `keep`, the
    /// merge sources and `drop`; no other id may appear. Each merge needs
    /// at least one source and non-blank content.
    pub fn validate(self, group: &ConsolidationGroup) -> Result<ValidatedPlan> {
        let mut seen: HashMap<&str, Slot> = HashMap::new();
        let expected: HashSet<&str> = group.memories.iter().map(|c| c.id.as_str()).collect();

        let placements = self
            .keep
            .iter()
            .map(|id| (id, Slot::Keep))
            .chain(
                self.merge
                    .iter()
                    .enumerate()
                    .flat_map(|(i, m)| m.sources.iter().map(move |id| (id, Slot::Merge(i)))),
            )
            .chain(self.drop.iter().map(|id| (id, Slot::Drop)));

        for (id, slot) in placements {
            if !expected.contains(id.as_str()) {
                return Err(Error::InvalidPlan(format!(
                    "{} lists '{id}', which is not in the proposed {} group",
                    slot.describe(),
                    group.memory_type
                )));
            }
            if let Some(previous) = seen.insert(id.as_str(), slot) {
                return Err(Error::InvalidPlan(format!(
                    "'{id}' appears in both {} and {}",
                    previous.describe(),
                    slot.describe()
                )));
            }
        }

        if let Some(missing) = group
            .memories
            .iter()
            .find(|c| !seen.contains_key(c.id.as_str()))
        {
            return Err(Error::InvalidPlan(format!(
                "'{}' from the proposed group is not accounted for",
                missing.id
            )));
        }

        for (i, entry) in self.merge.iter().enumerate() {
            if entry.sources.is_empty() {
                return Err(Error::InvalidPlan(format!("merge[{i}] has no sources")));
            }
            if entry.content.trim().is_empty() {
                return Err(Error::InvalidPlan(format!("merge[{i}] has empty content")));
            }
        }

        Ok(ValidatedPlan {
            memory_type: group.memory_type,
            plan: self,
        })
    }
}

/// A plan proven to partition its proposal group.
///
/// Only obtainable through [`ConsolidationPlan::validate`]. Applying a plan
/// consumes it, and it cannot be cloned, so each validation is applied at
/// most once:
///
/// ```compile_fail
/// fn reuse(plan: &strata::ValidatedPlan) -> strata::ValidatedPlan {
///     plan.clone()
/// }
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct ValidatedPlan {
    memory_type: MemoryType,
    plan: ConsolidationPlan,
}

impl ValidatedPlan {
    /// Type of the group this plan answers.
    #[must_use]
    pub const fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    /// Ids left untouched.
    #[must_use]
    pub fn keep(&self) -> &[MemoryId] {
        &self.plan.keep
    }

    /// Merges to synthesize.
    #[must_use]
    pub fn merges(&self) -> &[MergeEntry] {
        &self.plan.merge
    }

    /// Ids to archive.
    #[must_use]
    pub fn drops(&self) -> &[MemoryId] {
        &self.plan.drop
    }
}
