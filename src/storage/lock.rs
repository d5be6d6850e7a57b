//! Advisory cross-process lock.
//!
//! Serializes short-lived invocations on the same host (hook firings, CLI
//! runs) that mutate one project's state document. The lock file holds the
//! PID of its owner; a lock whose owner is no longer running is stale and
//! may be taken over. This is not a distributed mutex, and any doubt about
//! the owner's liveness resolves in favour of acquiring.

use crate::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// File name of the lock inside the data directory.
pub const LOCK_FILE_NAME: &str = "memory.lock";

/// Acquire/release capability guarding a project's state.
pub trait ProjectLock {
    /// Tries to take the lock.
    ///
    /// Returns `Ok(false)` when another live process holds it; callers
    /// must then skip their work rather than wait or retry.
    fn acquire(&self) -> Result<bool>;

    /// Gives the lock up. Releasing an absent lock is not an error.
    fn release(&self) -> Result<()>;
}

/// Runs `f` while holding `lock`.
///
/// Returns `Ok(None)` without running `f` if the lock is busy. The lock is
/// released whether or not `f` succeeds.
pub fn run_locked<L, T, F>(lock: &L, f: F) -> Result<Option<T>>
where
    L: ProjectLock + ?Sized,
    F: FnOnce() -> Result<T>,
{
    if !lock.acquire()? {
        return Ok(None);
    }
    let outcome = f();
    let released = lock.release();
    let value = outcome?;
    released?;
    Ok(Some(value))
}

/// Returns true if a process with `pid` is currently running.
#[must_use]
pub fn process_is_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    system.process(pid).is_some()
}

/// File-based lock keyed by process liveness.
#[derive(Debug, Clone)]
pub struct PidFileLock {
    path: PathBuf,
    pid: u32,
    is_alive: fn(u32) -> bool,
}

impl PidFileLock {
    /// Creates a lock at `path` owned by the current process.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pid: std::process::id(),
            is_alive: process_is_alive,
        }
    }

    /// Creates the lock at `<project_root>/<data_dir>/memory.lock`.
    pub fn for_project(project_root: &Path, data_dir: &Path) -> Self {
        Self::new(project_root.join(data_dir).join(LOCK_FILE_NAME))
    }

    /// Replaces the liveness probe.
    #[must_use]
    pub fn with_liveness(mut self, is_alive: fn(u32) -> bool) -> Self {
        self.is_alive = is_alive;
        self
    }

    /// Returns the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the PID recorded in the lock file, if any.
    fn holder(&self) -> Option<u32> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let parsed = raw.trim().parse().ok();
                if parsed.is_none() {
                    warn!(path = %self.path.display(), "Unreadable lock contents, treating as stale");
                }
                parsed
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read lock file, treating as stale");
                None
            },
        }
    }
}

impl ProjectLock for PidFileLock {
    fn acquire(&self) -> Result<bool> {
        if let Some(holder) = self.holder() {
            if (self.is_alive)(holder) {
                debug!(holder, "Lock held by a live process");
                return Ok(false);
            }
            debug!(holder, "Taking over stale lock");
        }

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::operation("create_lock_dir", e))?;
        }
        fs::write(&self.path, self.pid.to_string())
            .map_err(|e| Error::operation("write_lock", e))?;
        Ok(true)
    }

    fn release(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::operation("remove_lock", e)),
        }
    }
}
