//! CLI command implementations.
//!
//! Each submodule implements one group of commands over a [`MemoryStore`].
//! Handlers return the text to print; the binary owns stdout.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `init` | Name and describe the project |
//! | `add` | Insert a memory (near-duplicates are superseded) |
//! | `delete` | Remove a memory by id |
//! | `list` | List memories by type and tags |
//! | `search` | Ranked keyword search |
//! | `related` | Memories sharing any tag |
//! | `stats` | Record counts |
//! | `extraction` | Bump the extraction counter |
//! | `decay` | Recompute confidence of volatile memories |
//! | `digest` | Render the digest into the host document |
//! | `consolidate` | Report, propose and apply consolidation plans |
//!
//! Every command that writes runs under the project lock. When another
//! process holds it the command does nothing and still succeeds.

pub mod consolidate;
pub mod maintenance;
pub mod memory;

use crate::config::StrataConfig;
use crate::models::MemoryType;
use crate::services::MemoryStore;
use crate::storage::{PidFileLock, run_locked};
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::info;

/// Resolved project and configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Context {
    /// Project directory.
    pub project_root: PathBuf,
    /// Effective configuration.
    pub config: StrataConfig,
}

impl Context {
    /// Resolves configuration for `project_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if a selected config file is unreadable.
    pub fn load(project_root: &Path, config_path: Option<&Path>) -> Result<Self> {
        Ok(Self {
            project_root: project_root.to_path_buf(),
            config: StrataConfig::load_for_project(project_root, config_path)?,
        })
    }

    /// Opens the store without taking the lock, for read-only commands.
    ///
    /// # Errors
    ///
    /// Returns an error if the state document is unreadable.
    pub fn open(&self) -> Result<MemoryStore> {
        MemoryStore::open_with_config(&self.project_root, self.config.clone())
    }

    /// The project's advisory lock.
    #[must_use]
    pub fn lock(&self) -> PidFileLock {
        PidFileLock::for_project(&self.project_root, &self.config.data_dir)
    }

    /// Opens the store under the project lock and runs `f`.
    ///
    /// The store is loaded after the lock is taken, so `f` sees the latest
    /// state. A busy lock yields an informational message instead.
    ///
    /// # Errors
    ///
    /// Propagates errors from loading the store or from `f`.
    pub fn locked(&self, f: impl FnOnce(&mut MemoryStore) -> Result<String>) -> Result<String> {
        let lock = self.lock();
        let outcome = run_locked(&lock, || {
            let mut store = self.open()?;
            f(&mut store)
        })?;
        Ok(outcome.unwrap_or_else(|| {
            info!(lock = %lock.path().display(), "Lock busy, skipping");
            format!(
                "Another strata process is working on this project ({}); nothing done.",
                lock.path().display()
            )
        }))
    }
}

/// Parses a memory type argument.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] naming the accepted values.
pub fn parse_type(raw: &str) -> Result<MemoryType> {
    raw.parse()
}

/// Splits a comma-separated tag list, dropping blanks.
#[must_use]
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ProjectLock;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> Context {
        Context {
            project_root: dir.path().to_path_buf(),
            config: StrataConfig::default(),
        }
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags(Some(" db, ,infra ")), vec!["db", "infra"]);
        assert!(parse_tags(None).is_empty());
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(parse_type("Decisions").unwrap(), MemoryType::Decision);
        let err = parse_type("idea").unwrap_err().to_string();
        assert!(err.contains("architecture, decision"));
    }

    #[test]
    fn test_locked_runs_and_releases() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let out = ctx
            .locked(|store| {
                store.increment_extraction_count()?;
                Ok("done".to_string())
            })
            .unwrap();
        assert_eq!(out, "done");
        assert!(!ctx.lock().path().exists());
    }

    #[test]
    fn test_locked_skips_when_busy() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let held = ctx.lock();
        assert!(held.acquire().unwrap());

        let mut ran = false;
        let out = ctx
            .locked(|_| {
                ran = true;
                Ok(String::new())
            })
            .unwrap();
        assert!(!ran);
        assert!(out.contains("nothing done"));
        held.release().unwrap();
    }
}
