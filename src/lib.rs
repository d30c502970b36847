//! Instinct - Instinct-Based Learning for Claude Code
//!
//! Instinct observes tool usage through Claude Code hooks, mines the
//! observation log for behavioral patterns, and persists them as
//! confidence-scored instinct records. Mature records evolve into
//! skills, commands, agents, rules, or CLAUDE.md notes.

pub mod analyze;
pub mod cli;
pub mod confidence;
pub mod config;
pub mod detect;
pub mod error;
pub mod evolve;
pub mod hooks;
pub mod models;
pub mod notes;
pub mod oracle;
pub mod reconcile;
pub mod repo;
pub mod store;
pub mod trigger;

pub use config::{ArtifactKind, Config, Paths, Scope};
pub use error::{InstinctError, Result};
pub use models::{Evidence, Instinct, Observation, Pattern, PatternType};
pub use repo::InstinctRepository;
pub use store::ObservationLog;

// CLI commands
pub use cli::{EvolveCommand, LearnCommand, StatusCommand};
