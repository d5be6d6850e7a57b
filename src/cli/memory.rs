//! Record commands: init, add, delete, list, search, related, stats, extraction.

use super::{Context, parse_tags, parse_type};
use crate::models::{MemoryFilter, MemoryRecord, NewMemory};
use crate::{Error, Result};
use std::fmt::Write as _;
use tracing::debug;

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::operation("serialize_output", e))
}

/// One listing line: id, type, confidence, content and tags.
#[must_use]
pub fn format_record(record: &MemoryRecord) -> String {
    let mut line = format!(
        "{}  {:<12} {:.2}  {}",
        record.id,
        record.memory_type.as_str(),
        record.confidence,
        record.content
    );
    if !record.tags.is_empty() {
        let _ = write!(line, "  [{}]", record.tags.join(", "));
    }
    line
}

fn format_list<'a>(records: impl IntoIterator<Item = &'a MemoryRecord>) -> String {
    let lines: Vec<String> = records.into_iter().map(format_record).collect();
    if lines.is_empty() {
        "No memories found".to_string()
    } else {
        lines.join("\n")
    }
}

/// Sets the project name and description.
pub fn init(ctx: &Context, name: Option<&str>, description: Option<&str>) -> Result<String> {
    ctx.locked(|store| {
        store.initialize_project(name.unwrap_or_default(), description.unwrap_or_default())?;
        Ok(format!(
            "Initialized project '{}' in {}",
            store.state().name,
            store.state_file().path().display()
        ))
    })
}

/// Adds a memory.
///
/// `supersedes` names the replaced record by id; `supersedes_matching`
/// describes it instead and is resolved against active records of the
/// same type under the lock. A description that matches nothing is ignored.
pub fn add(
    ctx: &Context,
    memory_type: &str,
    content: &str,
    tags: Option<&str>,
    supersedes: Option<&str>,
    supersedes_matching: Option<&str>,
) -> Result<String> {
    let memory_type = parse_type(memory_type)?;
    let mut memory = NewMemory::new(memory_type, content).with_tags(parse_tags(tags));
    if let Some(id) = supersedes {
        memory = memory.superseding(id);
    }

    ctx.locked(|store| {
        if let Some(description) = supersedes_matching.filter(|_| memory.supersedes.is_none()) {
            match store.find_superseded(memory_type, description) {
                Some(id) => memory = memory.superseding(id),
                None => debug!(description, "No record matches the superseded description"),
            }
        }

        let before = store.record_counts().superseded;
        let record = store.add_memory(memory)?;
        let retired = store.record_counts().superseded.saturating_sub(before);
        let mut out = format!("Added {} memory {}", record.memory_type, record.id);
        if retired > 0 {
            let _ = write!(out, " (superseded {retired} older)");
        }
        Ok(out)
    })
}

/// Deletes a memory by id.
pub fn delete(ctx: &Context, id: &str) -> Result<String> {
    ctx.locked(|store| {
        Ok(if store.delete_memory(id)? {
            format!("Deleted {id}")
        } else {
            format!("No memory with id {id}")
        })
    })
}

/// Lists memories. Read-only.
pub fn list(
    ctx: &Context,
    memory_type: Option<&str>,
    tags: Option<&str>,
    all: bool,
    json: bool,
) -> Result<String> {
    let mut filter = MemoryFilter::new().with_tags(parse_tags(tags));
    if let Some(raw) = memory_type {
        filter = filter.with_type(parse_type(raw)?);
    }
    if all {
        filter = filter.including_inactive();
    }

    let store = ctx.open()?;
    let records = store.get_memories(&filter);
    if json {
        to_json(&records)
    } else {
        Ok(format_list(records))
    }
}

/// Ranked keyword search.
pub fn search(ctx: &Context, query: &str, limit: usize, json: bool) -> Result<String> {
    ctx.locked(|store| {
        let hits = store.search_memories(query, limit)?;
        if json {
            return to_json(&hits);
        }
        if hits.is_empty() {
            return Ok("No memories found".to_string());
        }
        Ok(hits
            .iter()
            .map(|h| format!("{:>3}  {}", h.score, format_record(&h.memory)))
            .collect::<Vec<_>>()
            .join("\n"))
    })
}

/// Memories sharing any of the tags.
pub fn related(ctx: &Context, tags: &str, memory_type: Option<&str>, json: bool) -> Result<String> {
    let tags = parse_tags(Some(tags));
    let memory_type = memory_type.map(parse_type).transpose()?;
    ctx.locked(|store| {
        let related = store.get_related(&tags, memory_type)?;
        if json {
            to_json(&related)
        } else {
            Ok(format_list(&related))
        }
    })
}

/// Record counts. Read-only.
pub fn stats(ctx: &Context, json: bool) -> Result<String> {
    let store = ctx.open()?;
    let counts = store.record_counts();
    if json {
        return to_json(&counts);
    }

    let state = store.state();
    let mut out = format!(
        "Project: {}\nMemories: {} total, {} active, {} superseded, {} archived\n",
        state.name, counts.total, counts.active, counts.superseded, counts.archived
    );
    for (memory_type, count) in &counts.by_type {
        let _ = writeln!(out, "  {:<12} {count}", memory_type.heading());
    }
    let _ = write!(
        out,
        "Extractions: {}\nLast consolidation: {}",
        state.extraction_count,
        state
            .last_consolidation
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    );
    Ok(out)
}

/// Bumps the extraction counter.
pub fn extraction(ctx: &Context) -> Result<String> {
    ctx.locked(|store| {
        let count = store.increment_extraction_count()?;
        let mut out = format!("Extraction count: {count}");
        if store.needs_consolidation() {
            out.push_str("\nConsolidation is due");
        }
        Ok(out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrataConfig;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> Context {
        Context {
            project_root: dir.path().to_path_buf(),
            config: StrataConfig::default(),
        }
    }

    #[test]
    fn test_add_reports_supersession() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let first = add(&ctx, "architecture", "Uses Next.js app router", None, None, None).unwrap();
        assert!(first.starts_with("Added architecture memory "));
        assert!(!first.contains("superseded"));

        let second =
            add(&ctx, "architecture", "Project uses Next.js app router", Some("web"), None, None).unwrap();
        assert!(second.ends_with("(superseded 1 older)"));

        let active = list(&ctx, None, None, false, false).unwrap();
        assert_eq!(active.lines().count(), 1);
        assert!(active.contains("[web]"));
        let everything = list(&ctx, None, None, true, false).unwrap();
        assert_eq!(everything.lines().count(), 2);
    }

    #[test]
    fn test_add_supersedes_by_description() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        add(&ctx, "decision", "Deploy the storefront on Heroku dynos", None, None, None).unwrap();
        add(&ctx, "decision", "Cache sessions in Redis", None, None, None).unwrap();

        let out = add(
            &ctx,
            "decision",
            "Moved hosting to Fly machines",
            None,
            None,
            Some("storefront on Heroku dynos"),
        )
        .unwrap();
        assert!(out.ends_with("(superseded 1 older)"));

        let store = ctx.open().unwrap();
        let old = store
            .state()
            .memories
            .iter()
            .find(|m| m.content.contains("Heroku"))
            .unwrap();
        assert!(old.is_superseded());
        let newest = store.state().memories.last().unwrap();
        assert_eq!(newest.supersedes.as_ref(), Some(&old.id));

        // nothing plausible to replace
        let out = add(&ctx, "decision", "Use Postgres", None, None, Some("kafka topics")).unwrap();
        assert!(!out.contains("superseded"));
        assert_eq!(ctx.open().unwrap().state().active_count(), 3);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(add(&context(&dir), "idea", "x", None, None, None).is_err());
    }

    #[test]
    fn test_search_and_stats_json() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        add(&ctx, "decision", "Cache with Redis", Some("infra"), None, None).unwrap();

        let hits: serde_json::Value =
            serde_json::from_str(&search(&ctx, "redis", 5, true).unwrap()).unwrap();
        assert_eq!(hits[0]["score"], 2);
        assert_eq!(hits[0]["memory"]["accessCount"], 1);

        let counts: serde_json::Value = serde_json::from_str(&stats(&ctx, true).unwrap()).unwrap();
        assert_eq!(counts["active"], 1);
        assert_eq!(search(&ctx, "nothing here", 5, false).unwrap(), "No memories found");
    }

    #[test]
    fn test_extraction_flags_due_consolidation() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        for _ in 0..9 {
            assert!(!extraction(&ctx).unwrap().contains("due"));
        }
        assert!(extraction(&ctx).unwrap().ends_with("Consolidation is due"));
    }
}
