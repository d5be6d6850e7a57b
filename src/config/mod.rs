//! Configuration management.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `STRATA_*` environment variables.

use crate::models::MemoryType;
use crate::services::DecayPolicy;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "STRATA_CONFIG_PATH";

/// Name of the config file inside a config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory under the project root.
const DEFAULT_DATA_DIR: &str = ".strata";

/// Main configuration for strata.
#[derive(Debug, Clone, PartialEq)]
pub struct StrataConfig {
    /// Directory under the project root holding state and lock.
    pub data_dir: PathBuf,
    /// Insert-time deduplication.
    pub dedup: DedupConfig,
    /// Confidence decay windows.
    pub decay: DecayPolicy,
    /// Consolidation triggers and retention.
    pub consolidation: ConsolidationConfig,
    /// Digest rendering.
    pub digest: DigestConfig,
}

/// Similarity thresholds.
///
/// Both values are tunable; neither is load-bearing for correctness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupConfig {
    /// A same-type active record scoring strictly above this is superseded.
    pub similarity_threshold: f64,
    /// Minimum score for resolving a described record by content.
    pub supersede_match_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            supersede_match_threshold: 0.5,
        }
    }
}

/// Consolidation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidationConfig {
    /// Consolidate once the active count exceeds this.
    pub max_active: usize,
    /// Consolidate whenever the extraction count is a positive multiple of this.
    pub extraction_interval: u64,
    /// Archived records untouched this many days are pruned.
    pub retention_days: u32,
    /// Proposal groups smaller than this are skipped by callers.
    pub min_group_size: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            max_active: 80,
            extraction_interval: 10,
            retention_days: 14,
            min_group_size: 3,
        }
    }
}

/// Nominal per-type line budgets for the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineBudgets {
    /// Architecture lines.
    pub architecture: usize,
    /// Decision lines.
    pub decision: usize,
    /// Pattern lines.
    pub pattern: usize,
    /// Gotcha lines.
    pub gotcha: usize,
    /// Progress lines.
    pub progress: usize,
    /// Context lines.
    pub context: usize,
}

impl Default for LineBudgets {
    fn default() -> Self {
        Self {
            architecture: 25,
            decision: 25,
            pattern: 25,
            gotcha: 20,
            progress: 30,
            context: 15,
        }
    }
}

impl LineBudgets {
    /// Returns the budget for `memory_type`.
    #[must_use]
    pub const fn for_type(&self, memory_type: MemoryType) -> usize {
        match memory_type {
            MemoryType::Architecture => self.architecture,
            MemoryType::Decision => self.decision,
            MemoryType::Pattern => self.pattern,
            MemoryType::Gotcha => self.gotcha,
            MemoryType::Progress => self.progress,
            MemoryType::Context => self.context,
        }
    }

    /// Sum of all budgets.
    #[must_use]
    pub fn total(&self) -> usize {
        MemoryType::all().iter().map(|t| self.for_type(*t)).sum()
    }
}

/// Digest settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestConfig {
    /// Host document, relative to the project root unless absolute.
    pub path: PathBuf,
    /// Records at or below this confidence are hidden.
    pub min_confidence: f64,
    /// Content longer than this is truncated.
    pub max_line_chars: usize,
    /// Nominal line budgets.
    pub budgets: LineBudgets,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("CLAUDE.md"),
            min_confidence: 0.3,
            max_line_chars: 120,
            budgets: LineBudgets::default(),
        }
    }
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            dedup: DedupConfig::default(),
            decay: DecayPolicy::default(),
            consolidation: ConsolidationConfig::default(),
            digest: DigestConfig::default(),
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Deduplication section.
    pub dedup: Option<ConfigFileDedup>,
    /// Decay section.
    pub decay: Option<ConfigFileDecay>,
    /// Consolidation section.
    pub consolidation: Option<ConfigFileConsolidation>,
    /// Digest section.
    pub digest: Option<ConfigFileDigest>,
}

/// `[dedup]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileDedup {
    /// Insert-time threshold.
    pub similarity_threshold: Option<f64>,
    /// Content-resolution threshold.
    pub supersede_match_threshold: Option<f64>,
}

/// `[decay]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileDecay {
    /// Progress window in days.
    pub progress_days: Option<f64>,
    /// Context window in days.
    pub context_days: Option<f64>,
}

/// `[consolidation]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileConsolidation {
    /// Active count threshold.
    pub max_active: Option<usize>,
    /// Extraction modulus.
    pub extraction_interval: Option<u64>,
    /// Pruning window in days.
    pub retention_days: Option<u32>,
    /// Caller-side group threshold.
    pub min_group_size: Option<usize>,
}

/// `[digest]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileDigest {
    /// Host document path.
    pub path: Option<String>,
    /// Visibility threshold.
    pub min_confidence: Option<f64>,
    /// Truncation width.
    pub max_line_chars: Option<usize>,
    /// `[digest.budgets]` table.
    pub budgets: Option<ConfigFileBudgets>,
}

/// `[digest.budgets]` table.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileBudgets {
    /// Architecture lines.
    pub architecture: Option<usize>,
    /// Decision lines.
    pub decision: Option<usize>,
    /// Pattern lines.
    pub pattern: Option<usize>,
    /// Gotcha lines.
    pub gotcha: Option<usize>,
    /// Progress lines.
    pub progress: Option<usize>,
    /// Context lines.
    pub context: Option<usize>,
}

impl StrataConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::operation("read_config_file", format!("{}: {e}", path.display())))?;
        Self::parse(&contents)
    }

    /// Parses a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid config TOML.
    pub fn parse(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::operation("parse_config_file", e))?;
        Ok(Self::from_config_file(file))
    }

    /// Resolves configuration for a project, including environment overrides.
    ///
    /// The first existing candidate wins:
    /// 1. `explicit` (from `--config`)
    /// 2. `STRATA_CONFIG_PATH`
    /// 3. `<project_root>/<data_dir>/config.toml`
    /// 4. `<platform config dir>/strata/config.toml`
    ///
    /// Explicitly named files must exist; the others are optional.
    ///
    /// # Errors
    ///
    /// Returns an error if a selected file cannot be read or parsed.
    pub fn load_for_project(project_root: &Path, explicit: Option<&Path>) -> Result<Self> {
        Self::resolve(project_root, explicit, |key| std::env::var(key).ok())
    }

    fn resolve(
        project_root: &Path,
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| env(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = if let Some(path) = named {
            debug!(path = %path.display(), "Loading named config file");
            Self::load_from_file(&path)?
        } else if let Some(path) = Self::discover(project_root, &env) {
            debug!(path = %path.display(), "Loading discovered config file");
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_env(env);
        Ok(config)
    }

    fn discover(project_root: &Path, env: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        let data_dir = env("STRATA_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let project_config = project_root.join(data_dir).join(CONFIG_FILE_NAME);
        if project_config.is_file() {
            return Some(project_config);
        }

        let base_dirs = directories::BaseDirs::new()?;
        let user_config = base_dirs.config_dir().join("strata").join(CONFIG_FILE_NAME);
        user_config.is_file().then_some(user_config)
    }

    /// Applies `STRATA_*` overrides read through `env`.
    ///
    /// Unparseable values are ignored.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(
            env: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            env(key).and_then(|v| v.trim().parse().ok())
        }

        if let Some(dir) = env("STRATA_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = parsed(&env, "STRATA_DEDUP_THRESHOLD") {
            self.dedup.similarity_threshold = v;
        }
        if let Some(v) = parsed(&env, "STRATA_SUPERSEDE_MATCH_THRESHOLD") {
            self.dedup.supersede_match_threshold = v;
        }
        if let Some(v) = parsed(&env, "STRATA_DECAY_PROGRESS_DAYS") {
            self.decay.progress_days = v;
        }
        if let Some(v) = parsed(&env, "STRATA_DECAY_CONTEXT_DAYS") {
            self.decay.context_days = v;
        }
        if let Some(v) = parsed(&env, "STRATA_CONSOLIDATION_MAX_ACTIVE") {
            self.consolidation.max_active = v;
        }
        if let Some(v) = parsed(&env, "STRATA_CONSOLIDATION_INTERVAL") {
            self.consolidation.extraction_interval = v;
        }
        if let Some(v) = parsed(&env, "STRATA_RETENTION_DAYS") {
            self.consolidation.retention_days = v;
        }
        if let Some(v) = parsed(&env, "STRATA_CONSOLIDATION_MIN_GROUP") {
            self.consolidation.min_group_size = v;
        }
        if let Some(path) = env("STRATA_DIGEST_PATH").filter(|v| !v.trim().is_empty()) {
            self.digest.path = PathBuf::from(path);
        }
    }

    /// Converts a `ConfigFile` to `StrataConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(dedup) = file.dedup {
            if let Some(v) = dedup.similarity_threshold {
                config.dedup.similarity_threshold = v;
            }
            if let Some(v) = dedup.supersede_match_threshold {
                config.dedup.supersede_match_threshold = v;
            }
        }
        if let Some(decay) = file.decay {
            if let Some(v) = decay.progress_days {
                config.decay.progress_days = v;
            }
            if let Some(v) = decay.context_days {
                config.decay.context_days = v;
            }
        }
        if let Some(c) = file.consolidation {
            let target = &mut config.consolidation;
            target.max_active = c.max_active.unwrap_or(target.max_active);
            target.extraction_interval = c.extraction_interval.unwrap_or(target.extraction_interval);
            target.retention_days = c.retention_days.unwrap_or(target.retention_days);
            target.min_group_size = c.min_group_size.unwrap_or(target.min_group_size);
        }
        if let Some(digest) = file.digest {
            if let Some(path) = digest.path {
                config.digest.path = PathBuf::from(path);
            }
            if let Some(v) = digest.min_confidence {
                config.digest.min_confidence = v;
            }
            if let Some(v) = digest.max_line_chars {
                config.digest.max_line_chars = v;
            }
            if let Some(b) = digest.budgets {
                let target = &mut config.digest.budgets;
                target.architecture = b.architecture.unwrap_or(target.architecture);
                target.decision = b.decision.unwrap_or(target.decision);
                target.pattern = b.pattern.unwrap_or(target.pattern);
                target.gotcha = b.gotcha.unwrap_or(target.gotcha);
                target.progress = b.progress.unwrap_or(target.progress);
                target.context = b.context.unwrap_or(target.context);
            }
        }

        config
    }
}
