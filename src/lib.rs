//! # Strata
//!
//! A durable, self-consolidating knowledge base about a software project.
//!
//! Strata keeps the facts an assistant learns while working on a project
//! (architecture, decisions, patterns, gotchas, progress and context) in a
//! single JSON document per project, and renders them into a bounded digest
//! that can be spliced into a host document.
//!
//! ## Features
//!
//! - Insert-time near-duplicate supersession (Jaccard over token sets)
//! - Confidence decay for volatile knowledge (progress, context)
//! - Plan-driven consolidation with validated merge/drop plans and pruning
//! - Size-bounded digest rendering with per-type line budgets
//! - Atomic whole-document persistence and an advisory PID lock
//!
//! ## Example
//!
//! ```rust,no_run
//! use strata::{MemoryStore, MemoryType, NewMemory};
//!
//! let mut store = MemoryStore::open("/path/to/project")?;
//! store.add_memory(NewMemory::new(MemoryType::Decision, "Use SQLite for the cache"))?;
//! let hits = store.search_memories("sqlite cache", 5)?;
//! println!("{}", store.generate_consciousness());
//! # Ok::<(), strata::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod models;
pub mod observability;
pub mod rendering;
pub mod services;
pub mod similarity;
pub mod storage;

// Re-exports for convenience
pub use config::StrataConfig;
pub use models::{
    ConsolidationGroup, ConsolidationPlan, MemoryFilter, MemoryId, MemoryRecord, MemoryType,
    MergeEntry, NewMemory, ProjectState, RecordCounts, SearchHit, ValidatedPlan,
};
pub use rendering::DigestRenderer;
pub use services::{ConsolidationStats, DecayPolicy, MemoryStore};
pub use storage::{PidFileLock, ProjectLock, StateFile, run_locked};

/// Error type for strata operations.
///
/// Expected conditions (missing files, a busy lock, unknown ids) are not
/// errors; they surface as booleans, options or empty collections.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty content, unknown memory type names, bad CLI arguments |
/// | `OperationFailed` | Filesystem I/O or serialization fails |
/// | `CorruptState` | The persisted state document cannot be parsed |
/// | `InvalidPlan` | A consolidation plan does not partition its proposal group |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Reading or writing the state, lock or digest documents fails
    /// - JSON serialization fails
    /// - The configuration file cannot be read or parsed
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The persisted state document is unreadable.
    ///
    /// This is fatal for the invocation: the document is left untouched and
    /// no fallback to an empty state is attempted.
    #[error("state document {} is corrupt: {cause}", path.display())]
    CorruptState {
        /// Path of the offending document.
        path: PathBuf,
        /// Parser diagnostic.
        cause: String,
    },

    /// A consolidation plan failed validation.
    #[error("invalid consolidation plan: {0}")]
    InvalidPlan(String),
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation name and cause.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for strata operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("empty content".to_string());
        assert_eq!(err.to_string(), "invalid input: empty content");

        let err = Error::operation("write_state", "disk full");
        assert_eq!(err.to_string(), "operation 'write_state' failed: disk full");

        let err = Error::CorruptState {
            path: PathBuf::from("/tmp/memory.json"),
            cause: "expected value at line 1".to_string(),
        };
        assert!(err.to_string().contains("/tmp/memory.json"));

        let err = Error::InvalidPlan("id listed twice".to_string());
        assert_eq!(
            err.to_string(),
            "invalid consolidation plan: id listed twice"
        );
    }
}
