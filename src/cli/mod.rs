//! CLI commands for Instinct.
//!
//! This module provides CLI commands, organized into:
//! - **User commands**: status, learn, evolve
//! - **Hook command**: hook (Claude Code integration, in `crate::hooks`)

pub mod evolve_cmd;
pub mod learn;
pub mod status;

pub use evolve_cmd::EvolveCommand;
pub use learn::LearnCommand;
pub use status::StatusCommand;
