//! Confidence decay for volatile knowledge.
//!
//! Progress and context records lose confidence linearly with the time
//! since they were last updated. Any mutation that stamps `updated`
//! restarts the clock. Other types keep their confidence permanently.

use super::{MemoryStore, record_operation};
use crate::models::MemoryType;
use crate::Result;
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, instrument};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Linear decay windows, in days, for volatile types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayPolicy {
    /// Days until a `progress` record reaches zero.
    pub progress_days: f64,
    /// Days until a `context` record reaches zero.
    pub context_days: f64,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            progress_days: 7.0,
            context_days: 30.0,
        }
    }
}

impl DecayPolicy {
    /// Decay window for `memory_type`, or `None` if it never decays.
    #[must_use]
    pub const fn window_days(&self, memory_type: MemoryType) -> Option<f64> {
        match memory_type {
            MemoryType::Progress => Some(self.progress_days),
            MemoryType::Context => Some(self.context_days),
            MemoryType::Architecture
            | MemoryType::Decision
            | MemoryType::Pattern
            | MemoryType::Gotcha => None,
        }
    }

    /// Confidence of a record last updated at `updated`, as seen at `now`.
    ///
    /// Returns `None` for non-decaying types. The result is clamped into
    /// `[0, 1]`, so a timestamp in the future yields 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn confidence_at(
        &self,
        memory_type: MemoryType,
        updated: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let window = self.window_days(memory_type)?;
        if window <= 0.0 {
            return Some(0.0);
        }
        let age_days = (now - updated).num_milliseconds() as f64 / MILLIS_PER_DAY;
        Some((1.0 - age_days / window).clamp(0.0, 1.0))
    }
}

impl MemoryStore {
    /// Recomputes confidence of every active volatile record and persists.
    ///
    /// Returns the number of records whose confidence changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn decay_confidence(&mut self) -> Result<usize> {
        self.decay_confidence_at(Utc::now())
    }

    /// Like [`decay_confidence`](Self::decay_confidence) at an explicit time.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    #[instrument(name = "strata.decay.run", skip(self, now), fields(changed = tracing::field::Empty))]
    pub fn decay_confidence_at(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let start = Instant::now();
        let policy = self.config().decay;

        let mut changed = 0;
        for record in self.state.memories.iter_mut().filter(|m| m.is_active()) {
            let Some(confidence) = policy.confidence_at(record.memory_type, record.updated, now)
            else {
                continue;
            };
            if (confidence - record.confidence).abs() > f64::EPSILON {
                record.confidence = confidence;
                changed += 1;
            }
        }

        tracing::Span::current().record("changed", changed);
        debug!(changed, "Decay pass complete");
        let result = self.persist().map(|()| changed);
        record_operation("decay", start, result.is_ok());
        result
    }
}
