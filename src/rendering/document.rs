//! Splicing the digest into a host document.
//!
//! The host document belongs to the user. Only the region between the two
//! markers is ours; everything outside it is kept byte for byte.

use crate::{Error, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{debug, instrument};

/// Opening sentinel.
pub const DIGEST_START: &str = "<!-- strata:digest:start -->";

/// Closing sentinel.
pub const DIGEST_END: &str = "<!-- strata:digest:end -->";

/// Byte range of the marked region, markers included.
fn marked_region(document: &str) -> Option<(usize, usize)> {
    let start = document.find(DIGEST_START)?;
    let after_start = start + DIGEST_START.len();
    let end = document[after_start..].find(DIGEST_END)? + after_start;
    Some((start, end + DIGEST_END.len()))
}

/// Returns the text currently between the markers, if both are present.
#[must_use]
pub fn extract_digest(document: &str) -> Option<&str> {
    let (start, end) = marked_region(document)?;
    Some(document[start + DIGEST_START.len()..end - DIGEST_END.len()].trim_matches('\n'))
}

/// Replaces the marked region of `document` with `digest`.
///
/// Without a complete marker pair the region is appended at the end.
#[must_use]
pub fn splice_digest(document: &str, digest: &str) -> String {
    let block = format!("{DIGEST_START}\n{}\n{DIGEST_END}", digest.trim_end_matches('\n'));

    if let Some((start, end)) = marked_region(document) {
        let mut out = String::with_capacity(document.len() + block.len());
        out.push_str(&document[..start]);
        out.push_str(&block);
        out.push_str(&document[end..]);
        return out;
    }

    let mut out = document.to_string();
    if !out.is_empty() {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str(&block);
    out.push('\n');
    out
}

/// Writes `digest` into the host document at `path`, creating it if needed.
///
/// Returns false if the document already held this digest.
///
/// # Errors
///
/// Returns an error if the document cannot be read or replaced.
#[instrument(name = "strata.digest.write", skip(digest), fields(path = %path.display()))]
pub fn write_digest(path: &Path, digest: &str) -> Result<bool> {
    let existing = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(Error::operation("read_digest_document", e)),
    };

    let updated = splice_digest(&existing, digest);
    if updated == existing {
        debug!("Digest unchanged");
        return Ok(false);
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| Error::operation("create_digest_dir", e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::operation("create_temp_digest", e))?;
    tmp.write_all(updated.as_bytes())
        .map_err(|e| Error::operation("write_temp_digest", e))?;
    tmp.persist(path)
        .map_err(|e| Error::operation("rename_digest", e.error))?;

    debug!(bytes = updated.len(), "Digest written");
    Ok(true)
}
