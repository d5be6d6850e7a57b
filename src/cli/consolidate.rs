//! Consolidation commands.
//!
//! `prepare` prints the proposal groups worth summarizing as JSON. The
//! summarizer answers one group with a plan, which `apply` validates
//! against the group as it stands now before touching anything.

use super::{Context, parse_type};
use crate::models::{ConsolidationGroup, ConsolidationPlan};
use crate::{Error, Result};
use std::fmt::Write as _;
use std::io::Read;
use std::path::Path;

/// Reports whether consolidation is due. Read-only.
pub fn status(ctx: &Context) -> Result<String> {
    let store = ctx.open()?;
    let settings = &ctx.config.consolidation;
    let state = store.state();

    let mut out = format!(
        "Consolidation due: {}\nActive: {} (threshold {})\nExtractions: {} (every {})\nLast consolidation: {}",
        if store.needs_consolidation() { "yes" } else { "no" },
        state.active_count(),
        settings.max_active,
        state.extraction_count,
        settings.extraction_interval,
        state
            .last_consolidation
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339()),
    );
    for group in store.memories_for_consolidation() {
        let marker = if group.len() >= settings.min_group_size { "" } else { " (too small)" };
        let _ = write!(out, "\n  {:<12} {}{marker}", group.memory_type.as_str(), group.len());
    }
    Ok(out)
}

/// Proposal groups with at least the configured minimum size.
pub fn proposals(ctx: &Context) -> Result<Vec<ConsolidationGroup>> {
    let min = ctx.config.consolidation.min_group_size;
    Ok(ctx
        .open()?
        .memories_for_consolidation()
        .into_iter()
        .filter(|g| g.len() >= min)
        .collect())
}

/// Prints the proposal groups as JSON. Read-only.
pub fn prepare(ctx: &Context) -> Result<String> {
    serde_json::to_string_pretty(&proposals(ctx)?)
        .map_err(|e| Error::operation("serialize_proposals", e))
}

/// Reads a plan from a file, or stdin for `-`.
pub fn read_plan(source: &Path) -> Result<String> {
    if source == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| Error::operation("read_plan_stdin", e))?;
        return Ok(text);
    }
    std::fs::read_to_string(source)
        .map_err(|e| Error::operation("read_plan", format!("{}: {e}", source.display())))
}

/// Validates `plan_json` against the current group of `memory_type` and applies it.
pub fn apply(ctx: &Context, memory_type: &str, plan_json: &str) -> Result<String> {
    let memory_type = parse_type(memory_type)?;
    let plan = ConsolidationPlan::from_json(plan_json)?;

    ctx.locked(|store| {
        let group = store.consolidation_group(memory_type);
        let validated = plan.validate(&group)?;
        let stats = store.apply_consolidation([validated])?;
        Ok(stats.summary())
    })
}
