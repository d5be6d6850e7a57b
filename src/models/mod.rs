//! Data models for strata.
//!
//! This module contains the persisted document, its records and the
//! request/response shapes exchanged with callers.

mod consolidation;
mod memory;
mod memory_type;
mod search;
mod state;

pub use consolidation::{
    ConsolidationCandidate, ConsolidationGroup, ConsolidationPlan, MergeEntry, ValidatedPlan,
};
pub use memory::{
    MemoryId, MemoryRecord, NewMemory, TAG_ARCHIVED, TAG_SUPERSEDED, is_bookkeeping_tag,
};
pub use memory_type::MemoryType;
pub use search::{MemoryFilter, RecordCounts, SearchHit};
pub use state::{CURRENT_SCHEMA_VERSION, ProjectState};
