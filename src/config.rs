//! Paths and tunables.
//!
//! `Paths` is resolved once at entry and threaded through every call; no
//! module reads the working directory on its own. `Config` follows a
//! precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.instinct/config.toml`)
//! 3. Defaults (lowest priority)
//!
//! All configuration is optional. The system runs with sensible defaults
//! when no config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{InstinctError, Result};

/// Heading under which generated notes land in CLAUDE.md.
pub const LEARNED_PATTERNS_SECTION: &str = "## Learned Patterns";

/// Artifact kinds the evolution engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Append to CLAUDE.md.
    Notes,
    /// `.claude/rules/`
    Rule,
    /// `.claude/skills/`
    Skill,
    /// `.claude/agents/`
    Agent,
    /// `.claude/commands/`
    Command,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Rule => "rule",
            Self::Skill => "skill",
            Self::Agent => "agent",
            Self::Command => "command",
        }
    }

    fn dir_name(&self) -> &'static str {
        match self {
            Self::Rule => "rules",
            Self::Skill => "skills",
            Self::Agent => "agents",
            Self::Command => "commands",
            Self::Notes => "rules",
        }
    }
}

/// Where evolved artifacts are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Project,
    Global,
}

/// All filesystem locations, derived from the project root exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct Paths {
    pub project_root: PathBuf,
}

impl Paths {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Resolve paths from the current working directory, walking up to a
    /// project marker (`.instinct/`, `.git/`, or `CLAUDE.md`).
    pub fn resolve() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::new(find_project_root(&cwd)),
            Err(_) => Self::new("."),
        }
    }

    pub fn instinct_dir(&self) -> PathBuf {
        self.project_root.join(".instinct")
    }

    pub fn observations_file(&self) -> PathBuf {
        self.instinct_dir().join("observations.jsonl")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.instinct_dir().join("archive")
    }

    pub fn learned_dir(&self) -> PathBuf {
        self.instinct_dir().join("learned")
    }

    pub fn state_file(&self) -> PathBuf {
        self.instinct_dir().join(".auto_learn_state.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.instinct_dir().join(".auto_learn.lock")
    }

    pub fn throttle_file(&self) -> PathBuf {
        self.instinct_dir().join(".trigger_count")
    }

    pub fn config_file(&self) -> PathBuf {
        self.instinct_dir().join("config.toml")
    }

    pub fn claude_md(&self) -> PathBuf {
        self.project_root.join("CLAUDE.md")
    }

    /// Output directory for an evolved artifact.
    ///
    /// Falls back to the project scope when the home directory cannot be
    /// resolved.
    pub fn artifact_dir(&self, kind: ArtifactKind, scope: Scope) -> PathBuf {
        let base = match scope {
            Scope::Project => self.project_root.join(".claude"),
            Scope::Global => dirs::home_dir()
                .map(|h| h.join(".claude"))
                .unwrap_or_else(|| self.project_root.join(".claude")),
        };
        base.join(kind.dir_name())
    }
}

/// Find the project root for a given working directory.
///
/// Walks up looking for an existing `.instinct/` directory first (explicit
/// placement wins), then a `.git/` directory or `CLAUDE.md` file. Falls
/// back to the starting directory.
pub fn find_project_root(cwd: &Path) -> PathBuf {
    for ancestor in cwd.ancestors() {
        if ancestor.join(".instinct").is_dir() {
            return ancestor.to_path_buf();
        }
    }
    for ancestor in cwd.ancestors() {
        if ancestor.join(".git").is_dir() || ancestor.join("CLAUDE.md").is_file() {
            return ancestor.to_path_buf();
        }
    }
    cwd.to_path_buf()
}

/// Tunables with serde defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Observation log size at which rotation kicks in.
    pub rotation_max_bytes: u64,
    /// Observation count before auto-learning may trigger.
    pub auto_learn_threshold: usize,
    /// Cooldown between auto-learning runs, in seconds.
    pub auto_learn_cooldown_seconds: u64,
    /// Check the trigger condition every N observations.
    pub trigger_check_interval: usize,
    /// Number of most recent observations fed to analysis.
    pub max_observations_for_analysis: usize,
    /// Trigger similarity above which patterns are considered the same.
    pub similarity_threshold: f64,
    /// Keyword Jaccard similarity for clustering instincts.
    pub cluster_similarity_threshold: f64,
    /// Oracle model identifier.
    pub oracle_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rotation_max_bytes: 10 * 1024 * 1024,
            auto_learn_threshold: 50,
            auto_learn_cooldown_seconds: 300,
            trigger_check_interval: 10,
            max_observations_for_analysis: 1000,
            similarity_threshold: 0.7,
            cluster_similarity_threshold: 0.3,
            oracle_model: "claude-3-haiku-20240307".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with the full precedence chain for the given
    /// paths.
    pub fn load(paths: &Paths) -> Self {
        let mut config = Config::default();
        if let Ok(file_config) = Self::load_from_file(&paths.config_file()) {
            config = file_config;
        }
        config.apply_env_overrides();
        config
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| InstinctError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| InstinctError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    ///
    /// Invalid values warn on stderr and keep the current value.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("INSTINCT_AUTO_LEARN_THRESHOLD") {
            match val.parse::<usize>() {
                Ok(n) if n >= 1 => self.auto_learn_threshold = n,
                _ => eprintln!(
                    "Warning: Invalid INSTINCT_AUTO_LEARN_THRESHOLD value '{}'. \
                    Expected a positive integer. Using default '{}'.",
                    val, self.auto_learn_threshold
                ),
            }
        }

        if let Ok(val) = env::var("INSTINCT_COOLDOWN_SECONDS") {
            match val.parse::<u64>() {
                Ok(n) => self.auto_learn_cooldown_seconds = n,
                Err(_) => eprintln!(
                    "Warning: Invalid INSTINCT_COOLDOWN_SECONDS value '{}'. \
                    Expected a non-negative integer. Using default '{}'.",
                    val, self.auto_learn_cooldown_seconds
                ),
            }
        }

        if let Ok(val) = env::var("INSTINCT_ROTATION_MAX_BYTES") {
            match val.parse::<u64>() {
                Ok(n) if n >= 1 => self.rotation_max_bytes = n,
                _ => eprintln!(
                    "Warning: Invalid INSTINCT_ROTATION_MAX_BYTES value '{}'. \
                    Expected a positive integer. Using default '{}'.",
                    val, self.rotation_max_bytes
                ),
            }
        }

        if let Ok(val) = env::var("INSTINCT_SIMILARITY_THRESHOLD") {
            match val.parse::<f64>() {
                Ok(n) if n.is_finite() && (0.0..=1.0).contains(&n) => {
                    self.similarity_threshold = n;
                }
                _ => eprintln!(
                    "Warning: Invalid INSTINCT_SIMILARITY_THRESHOLD value '{}'. \
                    Must be in range [0.0, 1.0]. Using default '{}'.",
                    val, self.similarity_threshold
                ),
            }
        }

        if let Ok(val) = env::var("INSTINCT_ORACLE_MODEL") {
            if val.is_empty() {
                eprintln!(
                    "Warning: INSTINCT_ORACLE_MODEL is empty. Using default '{}'.",
                    self.oracle_model
                );
            } else {
                self.oracle_model = val;
            }
        }
    }
}
