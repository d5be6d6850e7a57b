//! Digest rendering.
//!
//! [`DigestRenderer`] turns project state into a bounded text summary and
//! [`document`] splices that summary into a user-owned host document.

mod digest;
pub mod document;

pub use digest::{DigestRenderer, FOOTER, allocate_budgets, importance, truncate_line};
pub use document::{DIGEST_END, DIGEST_START, splice_digest, write_digest};
