//! Memory type categories.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of knowledge categories a memory can belong to.
///
/// The declaration order is the digest output order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// System structure, components and their boundaries.
    Architecture,
    /// Choices made and their rationale.
    Decision,
    /// Conventions and recurring idioms in the codebase.
    Pattern,
    /// Pitfalls, surprising behavior and workarounds.
    Gotcha,
    /// Work status and milestones. Decays over a week.
    Progress,
    /// Situational background. Decays over a month.
    #[default]
    Context,
}

impl MemoryType {
    /// Returns all memory types in digest order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Architecture,
            Self::Decision,
            Self::Pattern,
            Self::Gotcha,
            Self::Progress,
            Self::Context,
        ]
    }

    /// Returns the type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Decision => "decision",
            Self::Pattern => "pattern",
            Self::Gotcha => "gotcha",
            Self::Progress => "progress",
            Self::Context => "context",
        }
    }

    /// Section heading used by the digest.
    #[must_use]
    pub const fn heading(&self) -> &'static str {
        match self {
            Self::Architecture => "Architecture",
            Self::Decision => "Decisions",
            Self::Pattern => "Patterns",
            Self::Gotcha => "Gotchas",
            Self::Progress => "Progress",
            Self::Context => "Context",
        }
    }

    /// Returns true for types whose confidence decays with staleness.
    #[must_use]
    pub const fn is_volatile(&self) -> bool {
        matches!(self, Self::Progress | Self::Context)
    }

    /// Parses a memory type from a string, accepting plural forms.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "architecture" => Some(Self::Architecture),
            "decision" | "decisions" => Some(Self::Decision),
            "pattern" | "patterns" => Some(Self::Pattern),
            "gotcha" | "gotchas" => Some(Self::Gotcha),
            "progress" => Some(Self::Progress),
            "context" => Some(Self::Context),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s).ok_or_else(|| {
            crate::Error::InvalidInput(format!(
                "unknown memory type '{s}' (expected one of: {})",
                Self::all()
                    .iter()
                    .map(Self::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }
}
