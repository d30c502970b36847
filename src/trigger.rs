//! Auto-learn trigger: observation threshold, cooldown, lock file, and
//! background analysis spawn.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Config, Paths};
use crate::error::{FailOpen, InstinctError, Result};
use crate::store::create_private_dir;

/// Persisted trigger state, alongside the observation log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoLearnState {
    #[serde(default)]
    pub last_analysis_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub observation_count_at_analysis: u64,
}

/// Load trigger state. A missing or corrupt state file yields the
/// default state.
pub fn load_state(paths: &Paths) -> AutoLearnState {
    let state_file = paths.state_file();
    let content = match fs::read_to_string(&state_file) {
        Ok(content) => content,
        Err(_) => return AutoLearnState::default(),
    };
    serde_json::from_str(&content)
        .map_err(InstinctError::from)
        .fail_open_default("load auto-learn state")
}

pub fn save_state(paths: &Paths, state: &AutoLearnState) -> Result<()> {
    create_private_dir(&paths.instinct_dir())?;
    let state_file = paths.state_file();
    let content = serde_json::to_string_pretty(state)?;
    fs::write(&state_file, content).map_err(|e| InstinctError::storage(&state_file, e))
}

fn count_lines(path: &Path) -> usize {
    match fs::read_to_string(path) {
        Ok(content) => content.lines().count(),
        Err(_) => 0,
    }
}

/// True when the log has reached the threshold and the cooldown since
/// the last analysis has elapsed.
pub fn should_trigger(paths: &Paths, config: &Config) -> bool {
    let count = count_lines(&paths.observations_file());
    if count < config.auto_learn_threshold {
        return false;
    }

    let state = load_state(paths);
    if let Some(last) = state.last_analysis_time {
        let elapsed = Utc::now().signed_duration_since(last).num_seconds();
        if elapsed < config.auto_learn_cooldown_seconds as i64 {
            return false;
        }
    }
    true
}

/// Try to take the auto-learn lock. False means another run holds it.
pub fn acquire_lock(paths: &Paths) -> Result<bool> {
    create_private_dir(&paths.instinct_dir())?;
    let lock_file = paths.lock_file();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(&lock_file) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(InstinctError::storage(&lock_file, e)),
    };

    let lock_data = serde_json::json!({
        "pid": std::process::id(),
        "timestamp": Utc::now().to_rfc3339(),
    });
    file.write_all(lock_data.to_string().as_bytes())
        .map_err(|e| InstinctError::storage(&lock_file, e))?;
    Ok(true)
}

pub fn release_lock(paths: &Paths) {
    let lock_file = paths.lock_file();
    if let Err(e) = fs::remove_file(&lock_file) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("failed to release auto-learn lock: {e}");
        }
    }
}

/// Spawn a detached `learn` run of this binary. Failures are logged and
/// swallowed so hooks never block.
pub fn spawn_background_learn(paths: &Paths) {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            tracing::warn!("cannot locate own executable for background learn: {e}");
            return;
        }
    };
    let mut command = Command::new(exe);
    command
        .arg("learn")
        .current_dir(&paths.project_root)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // New process group so the learn run outlives the hook process.
        command.process_group(0);
    }
    match command.spawn() {
        Ok(_) => tracing::debug!("triggered background analysis"),
        Err(e) => tracing::warn!("failed to spawn background analysis: {e}"),
    }
}
