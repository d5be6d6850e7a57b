//! Storage layer.
//!
//! - **Persistence**: one JSON state document per project, replaced atomically
//! - **Migrations**: in-place upgrades of older documents on load
//! - **Lock**: advisory PID lock serializing same-host writers

mod lock;
pub mod migrations;
mod persistence;

pub use lock::{LOCK_FILE_NAME, PidFileLock, ProjectLock, process_is_alive, run_locked};
pub use persistence::{STATE_FILE_NAME, StateFile};
