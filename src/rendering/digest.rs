//! Size-bounded digest of a project's memory.
//!
//! Visible records are grouped by type and ranked by importance. Each type
//! renders at most its line budget; budgets left unused by small groups
//! are shared equally among groups that overflow theirs.

use crate::config::{DigestConfig, LineBudgets};
use crate::models::{MemoryRecord, MemoryType, ProjectState};
use crate::services::MemoryStore;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Footer appended to every digest.
pub const FOOTER: &str = "_Search the memory store for anything not listed here._";

/// Ranking weight blending confidence with demonstrated usefulness.
#[must_use]
pub fn importance(record: &MemoryRecord) -> f64 {
    record.confidence * (1.0 + f64::from(record.access_count) / 10.0)
}

/// Effective per-type budgets for the given visible counts.
///
/// The unused allowance of every type with fewer records than its budget
/// is pooled and split in equal floor-divided shares among the types with
/// more records than theirs.
#[must_use]
pub fn allocate_budgets(
    budgets: &LineBudgets,
    counts: &BTreeMap<MemoryType, usize>,
) -> BTreeMap<MemoryType, usize> {
    let count = |t: MemoryType| counts.get(&t).copied().unwrap_or(0);

    let surplus: usize = MemoryType::all()
        .iter()
        .map(|t| budgets.for_type(*t).saturating_sub(count(*t)))
        .sum();
    let overflowing = MemoryType::all()
        .iter()
        .filter(|t| count(**t) > budgets.for_type(**t))
        .count();
    let share = surplus.checked_div(overflowing).unwrap_or(0);

    MemoryType::all()
        .iter()
        .map(|t| {
            let base = budgets.for_type(*t);
            let extra = if count(*t) > base { share } else { 0 };
            (*t, base + extra)
        })
        .collect()
}

/// Collapses line breaks and truncates to `max_chars` with an ellipsis.
#[must_use]
pub fn truncate_line(content: &str, max_chars: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let kept: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

/// Renders [`ProjectState`] into the digest text.
#[derive(Debug, Clone)]
pub struct DigestRenderer {
    config: DigestConfig,
}

impl Default for DigestRenderer {
    fn default() -> Self {
        Self::new(DigestConfig::default())
    }
}

impl DigestRenderer {
    /// Creates a renderer.
    #[must_use]
    pub const fn new(config: DigestConfig) -> Self {
        Self { config }
    }

    /// Renders the digest. Pure; nothing is persisted.
    #[must_use]
    pub fn render(&self, state: &ProjectState) -> String {
        let mut groups: BTreeMap<MemoryType, Vec<&MemoryRecord>> = BTreeMap::new();
        for record in state
            .active()
            .filter(|m| m.confidence > self.config.min_confidence)
        {
            groups.entry(record.memory_type).or_default().push(record);
        }
        for records in groups.values_mut() {
            records.sort_by(|a, b| importance(b).total_cmp(&importance(a)));
        }

        let counts = groups.iter().map(|(t, r)| (*t, r.len())).collect();
        let budgets = allocate_budgets(&self.config.budgets, &counts);

        let mut out = header(state);
        for memory_type in MemoryType::all() {
            let Some(records) = groups.get(memory_type) else {
                continue;
            };
            let budget = budgets.get(memory_type).copied().unwrap_or(0);
            out.push_str(&self.section(*memory_type, records, budget));
        }
        let _ = write!(out, "\n---\n{FOOTER}\n");
        out
    }

    fn section(&self, memory_type: MemoryType, records: &[&MemoryRecord], budget: usize) -> String {
        let mut lines = vec![format!("\n## {}", memory_type.heading())];
        for record in records.iter().take(budget) {
            let mut line = format!("- {}", truncate_line(&record.content, self.config.max_line_chars));
            let tags: Vec<&str> = record.visible_tags().collect();
            if !tags.is_empty() {
                let _ = write!(line, " [{}]", tags.join(", "));
            }
            lines.push(line);
        }
        if records.len() > budget {
            lines.push(format!(
                "- ...and {} more (use search to explore)",
                records.len() - budget
            ));
        }
        let mut section = lines.join("\n");
        section.push('\n');
        section
    }
}

/// Title, description and record counts.
fn header(state: &ProjectState) -> String {
    let mut header = format!("# Project Memory: {}\n", state.name);
    if !state.description.trim().is_empty() {
        let _ = writeln!(header, "\n{}", state.description.trim());
    }
    let _ = writeln!(
        header,
        "\n_{} active memories ({} total)_",
        state.active_count(),
        state.memories.len()
    );
    header
}

impl MemoryStore {
    /// Renders the digest of the current state with the configured limits.
    #[must_use]
    pub fn generate_consciousness(&self) -> String {
        DigestRenderer::new(self.config().digest.clone()).render(self.state())
    }
}
