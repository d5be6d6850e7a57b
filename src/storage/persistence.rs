//! Whole-document JSON persistence.
//!
//! One state document per project. Loading treats a missing file as an
//! empty project; saving writes to a temporary file in the same directory
//! and renames it over the target, so readers never observe a partial
//! document.

use super::migrations;
use crate::models::ProjectState;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// File name of the state document inside the data directory.
pub const STATE_FILE_NAME: &str = "memory.json";

/// Handle to a project's state document.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    /// Creates a handle for an explicit document path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a handle for `<project_root>/<data_dir>/memory.json`.
    pub fn for_project(project_root: &Path, data_dir: &Path) -> Self {
        Self::new(project_root.join(data_dir).join(STATE_FILE_NAME))
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the document exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads the document, migrating older schema versions.
    ///
    /// A missing document yields a fresh state named `default_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptState`] if the document cannot be parsed,
    /// or [`Error::OperationFailed`] if it cannot be read.
    #[instrument(name = "strata.storage.load", skip(self, default_name), fields(path = %self.path.display()))]
    pub fn load(&self, default_name: &str) -> Result<ProjectState> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No state document yet, starting fresh");
                return Ok(ProjectState::new(default_name));
            },
            Err(e) => return Err(Error::operation("read_state", e)),
        };

        let value: Value = serde_json::from_str(&raw).map_err(|e| self.corrupt(e))?;
        let Value::Object(mut root) = value else {
            return Err(self.corrupt("top-level value is not an object"));
        };

        if migrations::migrate(&mut root) {
            debug!("Migrated state document to current schema");
        }

        let state: ProjectState =
            serde_json::from_value(Value::Object(root)).map_err(|e| self.corrupt(e))?;
        debug!(memories = state.memories.len(), "Loaded state document");
        Ok(state)
    }

    /// Stamps `last_updated` and atomically replaces the document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn save(&self, state: &mut ProjectState) -> Result<()> {
        self.save_at(state, Utc::now())
    }

    /// Like [`save`](Self::save) with an explicit timestamp.
    #[instrument(name = "strata.storage.save", skip(self, state), fields(path = %self.path.display()))]
    pub fn save_at(&self, state: &mut ProjectState, now: DateTime<Utc>) -> Result<()> {
        state.last_updated = Some(now);
        let json =
            serde_json::to_string_pretty(state).map_err(|e| Error::operation("serialize_state", e))?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| Error::operation("create_state_dir", e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::operation("create_temp_state", e))?;
        write_synced(&mut tmp, json.as_bytes())
            .map_err(|e| Error::operation("write_temp_state", e))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::operation("rename_state", e.error))?;

        debug!(memories = state.memories.len(), "Saved state document");
        Ok(())
    }

    fn corrupt(&self, cause: impl std::fmt::Display) -> Error {
        Error::CorruptState {
            path: self.path.clone(),
            cause: cause.to_string(),
        }
    }
}

fn write_synced(tmp: &mut tempfile::NamedTempFile, bytes: &[u8]) -> std::io::Result<()> {
    tmp.write_all(bytes)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()
}
