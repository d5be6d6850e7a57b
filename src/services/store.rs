//! The memory store.
//!
//! A store is bound to one project directory. It loads the state document
//! when opened, mutates it in memory and rewrites the whole document after
//! every mutating call. Two stores opened on the same project see
//! independent snapshots; the later save wins.

use super::record_operation;
use crate::config::StrataConfig;
use crate::models::{
    MemoryFilter, MemoryId, MemoryRecord, MemoryType, NewMemory, ProjectState, RecordCounts,
    SearchHit, TAG_SUPERSEDED, is_bookkeeping_tag,
};
use crate::similarity::{jaccard, overlap_count, tokenize, tokenize_all};
use crate::storage::{PidFileLock, StateFile};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, instrument};

/// Search weight of a query token found in content.
const CONTENT_WEIGHT: usize = 2;

/// Search weight of a query token found in tags.
const TAG_WEIGHT: usize = 3;

/// Knowledge base of one project.
#[derive(Debug)]
pub struct MemoryStore {
    project_root: PathBuf,
    config: StrataConfig,
    file: StateFile,
    pub(super) state: ProjectState,
}

impl MemoryStore {
    /// Opens the store for `project_root` with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptState`] if an existing document is unreadable.
    pub fn open(project_root: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_config(project_root, StrataConfig::default())
    }

    /// Opens the store for `project_root` with `config`.
    ///
    /// A project without a state document starts empty, named after its
    /// directory. Nothing is written until the first mutation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptState`] if an existing document is unreadable,
    /// or [`Error::OperationFailed`] if it cannot be read.
    pub fn open_with_config(project_root: impl Into<PathBuf>, config: StrataConfig) -> Result<Self> {
        let project_root = project_root.into();
        let file = StateFile::for_project(&project_root, &config.data_dir);
        let default_name = project_root
            .file_name()
            .map_or_else(|| "project".to_string(), |n| n.to_string_lossy().into_owned());
        let state = file.load(&default_name)?;
        Ok(Self {
            project_root,
            config,
            file,
            state,
        })
    }

    /// Returns the current state snapshot.
    #[must_use]
    pub const fn state(&self) -> &ProjectState {
        &self.state
    }

    /// Returns the project directory.
    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &StrataConfig {
        &self.config
    }

    /// Returns the state document handle.
    #[must_use]
    pub const fn state_file(&self) -> &StateFile {
        &self.file
    }

    /// Returns the advisory lock guarding this project.
    #[must_use]
    pub fn lock(&self) -> PidFileLock {
        PidFileLock::for_project(&self.project_root, &self.config.data_dir)
    }

    pub(super) fn persist(&mut self) -> Result<()> {
        self.file.save(&mut self.state)
    }

    /// Sets the project name and description and persists.
    ///
    /// Creates the data directory if needed. Blank values keep the
    /// current ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    #[instrument(name = "strata.store.initialize", skip(self))]
    pub fn initialize_project(&mut self, name: &str, description: &str) -> Result<()> {
        if !name.trim().is_empty() {
            self.state.name = name.trim().to_string();
        }
        if !description.trim().is_empty() {
            self.state.description = description.trim().to_string();
        }
        self.persist()
    }

    /// Inserts a memory, retiring older near-duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for blank content, or an error if
    /// the document cannot be written.
    pub fn add_memory(&mut self, memory: NewMemory) -> Result<MemoryRecord> {
        self.add_memory_at(memory, Utc::now())
    }

    /// Like [`add_memory`](Self::add_memory) with an explicit timestamp.
    ///
    /// The first active record of the same type whose Jaccard similarity
    /// exceeds the dedup threshold is tagged `superseded`; later matches
    /// are not examined. A record named by `supersedes` is tagged too.
    /// The new record is always appended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for blank content, or an error if
    /// the document cannot be written.
    #[instrument(
        name = "strata.store.add",
        skip(self, memory, now),
        fields(memory_type = %memory.memory_type)
    )]
    pub fn add_memory_at(&mut self, memory: NewMemory, now: DateTime<Utc>) -> Result<MemoryRecord> {
        let start = Instant::now();
        let result = self.insert(memory, now);
        record_operation("add", start, result.is_ok());
        result
    }

    fn insert(&mut self, memory: NewMemory, now: DateTime<Utc>) -> Result<MemoryRecord> {
        let content = memory.content.trim();
        if content.is_empty() {
            return Err(Error::InvalidInput("memory content is empty".to_string()));
        }

        let tokens = tokenize(content);
        let threshold = self.config.dedup.similarity_threshold;
        if let Some(older) = self
            .state
            .memories
            .iter_mut()
            .filter(|m| m.is_active() && m.memory_type == memory.memory_type)
            .find(|m| jaccard(&tokens, &tokenize(&m.content)) > threshold)
        {
            older.mark(TAG_SUPERSEDED, now);
            debug!(superseded = %older.id, "Retired near-duplicate");
        }

        if let Some(target) = &memory.supersedes {
            match self.state.find_mut(target.as_str()) {
                Some(older) => {
                    if older.mark(TAG_SUPERSEDED, now) {
                        debug!(superseded = %target, "Retired explicitly superseded record");
                    }
                },
                None => debug!(supersedes = %target, "Superseded record not found"),
            }
        }

        let mut record = MemoryRecord::new(memory.memory_type, content, now);
        record.tags = clean_tags(memory.tags);
        record.supersedes = memory.supersedes;
        self.state.memories.push(record.clone());
        self.persist()?;

        debug!(id = %record.id, "Added memory");
        Ok(record)
    }

    /// Removes a record outright.
    ///
    /// Returns false if no record has `id`; nothing is written then.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    #[instrument(name = "strata.store.delete", skip(self))]
    pub fn delete_memory(&mut self, id: &str) -> Result<bool> {
        let Some(index) = self.state.memories.iter().position(|m| m.id.as_str() == id) else {
            return Ok(false);
        };
        self.state.memories.remove(index);
        self.persist()?;
        Ok(true)
    }

    /// Records that are neither superseded nor archived.
    #[must_use]
    pub fn get_active_memories(&self) -> Vec<&MemoryRecord> {
        self.state.active().collect()
    }

    /// Records passing `filter`, in collection order.
    #[must_use]
    pub fn get_memories(&self, filter: &MemoryFilter) -> Vec<&MemoryRecord> {
        self.state
            .memories
            .iter()
            .filter(|m| filter.matches(m))
            .collect()
    }

    /// Ranks active records by weighted token overlap with `query`.
    ///
    /// Each query token found in the content scores 2, each found among
    /// the tag tokens scores 3. Zero scores are dropped and ties keep
    /// collection order. Returned records have their access count bumped;
    /// the document is written once, and only if something matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    #[instrument(name = "strata.store.search", skip(self), fields(hits = tracing::field::Empty))]
    pub fn search_memories(&mut self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let start = Instant::now();
        let query_tokens = tokenize(query);

        let mut ranked: Vec<(usize, usize)> = self
            .state
            .memories
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_active())
            .map(|(i, m)| {
                let in_content = overlap_count(&query_tokens, &tokenize(&m.content));
                let in_tags = overlap_count(
                    &query_tokens,
                    &tokenize_all(m.tags.iter().map(String::as_str)),
                );
                (i, CONTENT_WEIGHT * in_content + TAG_WEIGHT * in_tags)
            })
            .filter(|(_, score)| *score > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(limit);

        tracing::Span::current().record("hits", ranked.len());
        if ranked.is_empty() {
            record_operation("search", start, true);
            return Ok(Vec::new());
        }

        let hits: Vec<SearchHit> = ranked
            .into_iter()
            .map(|(i, score)| {
                let record = &mut self.state.memories[i];
                record.access_count = record.access_count.saturating_add(1);
                SearchHit {
                    memory: record.clone(),
                    score: u32::try_from(score).unwrap_or(u32::MAX),
                }
            })
            .collect();

        let result = self.persist().map(|()| hits);
        record_operation("search", start, result.is_ok());
        result
    }

    /// Active records sharing any of `tags` (case-insensitive).
    ///
    /// Matches have their access count bumped and the document is written
    /// if anything matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    #[instrument(name = "strata.store.related", skip(self))]
    pub fn get_related(
        &mut self,
        tags: &[String],
        memory_type: Option<MemoryType>,
    ) -> Result<Vec<MemoryRecord>> {
        let wanted: HashSet<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();

        let mut related = Vec::new();
        for record in &mut self.state.memories {
            if !record.is_active() || memory_type.is_some_and(|t| t != record.memory_type) {
                continue;
            }
            if record.tags.iter().any(|t| wanted.contains(&t.to_lowercase())) {
                record.access_count = record.access_count.saturating_add(1);
                related.push(record.clone());
            }
        }

        if !related.is_empty() {
            self.persist()?;
        }
        Ok(related)
    }

    /// Counts records by lifecycle state and active records by type.
    #[must_use]
    pub fn record_counts(&self) -> RecordCounts {
        let mut counts = RecordCounts {
            total: self.state.memories.len(),
            ..RecordCounts::default()
        };
        for record in &self.state.memories {
            if record.is_superseded() {
                counts.superseded += 1;
            }
            if record.is_archived() {
                counts.archived += 1;
            }
            if record.is_active() {
                counts.active += 1;
                *counts.by_type.entry(record.memory_type).or_default() += 1;
            }
        }
        counts
    }

    /// Bumps and persists the extraction counter, returning the new value.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn increment_extraction_count(&mut self) -> Result<u64> {
        self.state.extraction_count = self.state.extraction_count.saturating_add(1);
        self.persist()?;
        Ok(self.state.extraction_count)
    }

    /// Finds the active record of `memory_type` that `description` most
    /// plausibly refers to.
    ///
    /// Returns the best match scoring at least the supersede-match
    /// threshold; ties go to the earlier record. Backs
    /// `strata add --supersedes-matching`.
    #[must_use]
    pub fn find_superseded(&self, memory_type: MemoryType, description: &str) -> Option<MemoryId> {
        let wanted = tokenize(description);
        let threshold = self.config.dedup.supersede_match_threshold;

        let mut best: Option<(&MemoryRecord, f64)> = None;
        for record in self.state.active().filter(|m| m.memory_type == memory_type) {
            let score = jaccard(&wanted, &tokenize(&record.content));
            if score >= threshold && best.is_none_or(|(_, s)| score > s) {
                best = Some((record, score));
            }
        }
        best.map(|(record, _)| record.id.clone())
    }
}

/// Trims tags, dropping blanks, duplicates and reserved bookkeeping tags.
pub(super) fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && !is_bookkeeping_tag(t))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TAG_ARCHIVED;
    use tempfile::TempDir;

    fn store() -> (TempDir, MemoryStore) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn add(store: &mut MemoryStore, ty: MemoryType, content: &str, tags: &[&str]) -> MemoryRecord {
        store
            .add_memory(NewMemory::new(ty, content).with_tags(tags.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_open_fresh_project() {
        let (dir, store) = store();
        let expected = dir.path().file_name().unwrap().to_string_lossy();
        assert_eq!(store.state().name, expected);
        assert!(store.state().memories.is_empty());
        assert!(!store.state_file().exists());
    }

    #[test]
    fn test_add_assigns_defaults() {
        let (_dir, mut store) = store();
        let record = add(&mut store, MemoryType::Gotcha, "  Tests need TZ=UTC  ", &["ci"]);
        assert_eq!(record.content, "Tests need TZ=UTC");
        assert!((record.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(record.access_count, 0);
        assert_eq!(record.created, record.updated);
        assert!(store.state_file().exists());
    }

    #[test]
    fn test_add_rejects_blank_content() {
        let (_dir, mut store) = store();
        let err = store
            .add_memory(NewMemory::new(MemoryType::Context, "   "))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(store.state().memories.is_empty());
    }

    #[test]
    fn test_near_duplicate_ignores_other_types() {
        let (_dir, mut store) = store();
        let a = add(&mut store, MemoryType::Architecture, "Uses Next.js app router", &[]);
        // different type, never compared
        let b = add(&mut store, MemoryType::Decision, "Uses Next.js app router", &[]);
        let c = add(&mut store, MemoryType::Architecture, "Project uses Next.js app router", &[]);

        let state = store.state();
        assert!(state.find(a.id.as_str()).unwrap().is_superseded());
        assert!(state.find(b.id.as_str()).unwrap().is_active());
        assert!(state.find(c.id.as_str()).unwrap().is_active());
        assert_eq!(state.memories.len(), 3);
    }

    #[test]
    fn test_near_duplicate_supersedes_first_match_only() {
        let (_dir, mut store) = store();
        // 3 shared of 5 tokens: 0.6 is not above the threshold
        let a = add(&mut store, MemoryType::Pattern, "aa bb cc dd", &[]);
        let b = add(&mut store, MemoryType::Pattern, "aa bb cc ee", &[]);
        assert!(store.state().find(a.id.as_str()).unwrap().is_active());

        // 0.8 against both; only the first is retired
        let c = add(&mut store, MemoryType::Pattern, "aa bb cc dd ee", &[]);
        let state = store.state();
        assert!(state.find(a.id.as_str()).unwrap().is_superseded());
        assert!(state.find(b.id.as_str()).unwrap().is_active());
        assert!(state.find(c.id.as_str()).unwrap().is_active());
        assert_eq!(state.active_count(), 2);
    }

    #[test]
    fn test_explicit_supersedes() {
        let (_dir, mut store) = store();
        let old = add(&mut store, MemoryType::Decision, "Deploy with Heroku", &[]);
        let new = store
            .add_memory(
                NewMemory::new(MemoryType::Decision, "Moved hosting to Fly").superseding(old.id.clone()),
            )
            .unwrap();
        assert_eq!(new.supersedes.as_ref(), Some(&old.id));
        assert!(store.state().find(old.id.as_str()).unwrap().is_superseded());

        // superseding an unknown id is tolerated
        let orphan = store
            .add_memory(NewMemory::new(MemoryType::Decision, "Use Postgres").superseding("missing"))
            .unwrap();
        assert!(orphan.is_active());
    }

    #[test]
    fn test_bookkeeping_tags_are_not_accepted_from_callers() {
        let (_dir, mut store) = store();
        let record = add(&mut store, MemoryType::Pattern, "Builder everywhere", &[
            "api",
            TAG_ARCHIVED,
            " api ",
            "",
        ]);
        assert_eq!(record.tags, vec!["api".to_string()]);
        assert!(record.is_active());
    }

    #[test]
    fn test_delete() {
        let (_dir, mut store) = store();
        let record = add(&mut store, MemoryType::Context, "Working on auth", &[]);
        assert!(store.delete_memory(record.id.as_str()).unwrap());
        assert!(!store.delete_memory(record.id.as_str()).unwrap());
        assert!(store.state().memories.is_empty());
    }

    #[test]
    fn test_search_scores_tags_above_content() {
        let (_dir, mut store) = store();
        add(&mut store, MemoryType::Decision, "Redis is the cache", &[]);
        add(&mut store, MemoryType::Pattern, "Invalidate on write", &["redis"]);
        add(&mut store, MemoryType::Gotcha, "Unrelated note", &[]);

        let hits = store.search_memories("redis", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, 3);
        assert_eq!(hits[0].memory.content, "Invalidate on write");
        assert_eq!(hits[1].score, 2);
        assert!(hits.iter().all(|h| h.memory.access_count == 1));
    }

    #[test]
    fn test_search_ties_keep_collection_order_and_limit() {
        let (_dir, mut store) = store();
        let first = add(&mut store, MemoryType::Decision, "Kafka topics", &[]);
        add(&mut store, MemoryType::Pattern, "Kafka consumers", &[]);
        add(&mut store, MemoryType::Gotcha, "Kafka offsets", &[]);

        let hits = store.search_memories("kafka", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id, first.id);

        let untouched = store.get_active_memories();
        assert_eq!(untouched.iter().map(|m| m.access_count).sum::<u32>(), 1);
    }

    #[test]
    fn test_search_without_hits_changes_nothing() {
        let (_dir, mut store) = store();
        add(&mut store, MemoryType::Decision, "Redis is the cache", &[]);
        let before = std::fs::read_to_string(store.state_file().path()).unwrap();

        assert!(store.search_memories("nonexistent term", 10).unwrap().is_empty());
        let after = std::fs::read_to_string(store.state_file().path()).unwrap();
        assert_eq!(before, after);
        assert_eq!(store.state().memories[0].access_count, 0);
    }

    #[test]
    fn test_related_is_case_insensitive() {
        let (_dir, mut store) = store();
        add(&mut store, MemoryType::Decision, "JWT in cookies", &["Auth"]);
        add(&mut store, MemoryType::Gotcha, "Token refresh races", &["auth", "client"]);
        add(&mut store, MemoryType::Pattern, "Retry with jitter", &["client"]);

        let related = store.get_related(&["AUTH".to_string()], None).unwrap();
        assert_eq!(related.len(), 2);
        assert!(related.iter().all(|m| m.access_count == 1));

        let gotchas = store
            .get_related(&["client".to_string()], Some(MemoryType::Gotcha))
            .unwrap();
        assert_eq!(gotchas.len(), 1);
        assert_eq!(gotchas[0].access_count, 2);
    }

    #[test]
    fn test_record_counts() {
        let (_dir, mut store) = store();
        add(&mut store, MemoryType::Architecture, "Uses Next.js app router", &[]);
        add(&mut store, MemoryType::Architecture, "Project uses Next.js app router", &[]);
        add(&mut store, MemoryType::Progress, "Auth flow done", &[]);

        let counts = store.record_counts();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.active, 2);
        assert_eq!(counts.superseded, 1);
        assert_eq!(counts.archived, 0);
        assert_eq!(counts.by_type.get(&MemoryType::Architecture), Some(&1));
        assert_eq!(counts.by_type.get(&MemoryType::Progress), Some(&1));
    }

    #[test]
    fn test_extraction_count_persists() {
        let (dir, mut store) = store();
        assert_eq!(store.increment_extraction_count().unwrap(), 1);
        assert_eq!(store.increment_extraction_count().unwrap(), 2);
        let reopened = MemoryStore::open(dir.path()).unwrap();
        assert_eq!(reopened.state().extraction_count, 2);
    }

    #[test]
    fn test_initialize_project() {
        let (dir, mut store) = store();
        store.initialize_project("shop", "Storefront monorepo").unwrap();
        store.initialize_project("", "").unwrap();
        let reopened = MemoryStore::open(dir.path()).unwrap();
        assert_eq!(reopened.state().name, "shop");
        assert_eq!(reopened.state().description, "Storefront monorepo");
    }

    #[test]
    fn test_find_superseded_picks_best_match() {
        let (_dir, mut store) = store();
        add(&mut store, MemoryType::Decision, "Store sessions in Redis", &[]);
        let best = add(&mut store, MemoryType::Decision, "Use Postgres for user accounts", &[]);

        let found = store.find_superseded(MemoryType::Decision, "use postgres for accounts");
        assert_eq!(found, Some(best.id));
        assert_eq!(store.find_superseded(MemoryType::Pattern, "use postgres for accounts"), None);
        assert_eq!(store.find_superseded(MemoryType::Decision, "frontend styling"), None);
    }
}
