//! Append-only observation log with rotation.
//!
//! Multiple host sessions can write concurrently; appends take an
//! exclusive advisory lock so JSON lines never interleave. Rotation
//! renames the full log into `archive/` with a timestamp+pid name, so a
//! lost rename race is harmless.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::Config;
use crate::error::{InstinctError, Result};
use crate::models::Observation;

/// Safety caps for loading, beyond which the tail window is abandoned.
const MAX_LOAD_BYTES: u64 = 50 * 1024 * 1024;
const MAX_LOAD_LINES: usize = 100_000;

/// The append-only observation log for one project.
pub struct ObservationLog {
    file: PathBuf,
    archive_dir: PathBuf,
    rotation_max_bytes: u64,
}

impl ObservationLog {
    pub fn new(file: PathBuf, archive_dir: PathBuf, config: &Config) -> Self {
        Self {
            file,
            archive_dir,
            rotation_max_bytes: config.rotation_max_bytes,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.file
    }

    /// Append one observation as a JSON line.
    ///
    /// Ensures the parent directory exists, rotates the log when it has
    /// grown past the limit, then writes under an exclusive lock.
    pub fn append(&self, observation: &Observation) -> Result<()> {
        if let Some(parent) = self.file.parent() {
            create_private_dir(parent)?;
        }
        self.rotate_if_needed()?;

        let line = serde_json::to_string(&observation.clone().truncated())?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file)
            .map_err(|e| InstinctError::storage(&self.file, e))?;
        lock_exclusive(&file, &self.file)?;
        let write_result = file
            .write_all(format!("{line}\n").as_bytes())
            .and_then(|()| file.flush());
        unlock(&file);
        write_result.map_err(|e| InstinctError::storage(&self.file, e))
    }

    /// Rotate the log into the archive when it has reached the size limit.
    ///
    /// A NotFound rename error means another process rotated first; that
    /// counts as success.
    fn rotate_if_needed(&self) -> Result<()> {
        let size = match fs::metadata(&self.file) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size < self.rotation_max_bytes {
            return Ok(());
        }

        create_private_dir(&self.archive_dir)?;
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let archive_path = self
            .archive_dir
            .join(format!("observations-{}-{}.jsonl", timestamp, std::process::id()));

        match fs::rename(&self.file, &archive_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(InstinctError::storage(&self.file, e)),
        }
    }

    /// Number of observation lines in the current log, 0 when absent.
    pub fn count(&self) -> usize {
        let file = match File::open(&self.file) {
            Ok(f) => f,
            Err(_) => return 0,
        };
        BufReader::new(file).lines().count()
    }

    /// The last `limit` observations in file order, skipping malformed
    /// lines. Returns empty when the log is absent or oversized.
    pub fn load_recent(&self, limit: usize) -> Result<Vec<Observation>> {
        let size = match fs::metadata(&self.file) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(Vec::new()),
        };
        if size > MAX_LOAD_BYTES {
            tracing::warn!(
                "observation log {} exceeds {} bytes, skipping load",
                self.file.display(),
                MAX_LOAD_BYTES
            );
            return Ok(Vec::new());
        }

        let file = File::open(&self.file).map_err(|e| InstinctError::storage(&self.file, e))?;
        let mut observations = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            if index >= MAX_LOAD_LINES {
                tracing::warn!(
                    "observation log {} exceeds {} lines, truncating load",
                    self.file.display(),
                    MAX_LOAD_LINES
                );
                break;
            }
            let line = line.map_err(|e| InstinctError::storage(&self.file, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Observation>(&line) {
                Ok(obs) => observations.push(obs),
                Err(e) => {
                    tracing::debug!("skipping malformed observation line {}: {}", index + 1, e);
                }
            }
        }

        if observations.len() > limit {
            observations.drain(..observations.len() - limit);
        }
        Ok(observations)
    }
}

/// Counter deciding when the trigger condition gets checked.
///
/// Hook processes are short-lived, so the count persists in a small
/// counter file between invocations. Lost updates between concurrent
/// hooks only delay the next check.
#[derive(Debug, Default)]
pub struct TriggerThrottle {
    count: usize,
    interval: usize,
}

impl TriggerThrottle {
    pub fn new(interval: usize) -> Self {
        Self { count: 0, interval }
    }

    /// Load the persisted count; a missing or corrupt file counts as 0.
    pub fn load(path: &Path, interval: usize) -> Self {
        let count = fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        Self { count, interval }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.count.to_string()).map_err(|e| InstinctError::storage(path, e))
    }

    /// Record one observation; true on every interval-th call, at which
    /// point the counter resets.
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.interval.max(1) {
            self.count = 0;
            return true;
        }
        false
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Create a directory with owner-only permissions on unix.
pub fn create_private_dir(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| InstinctError::storage(path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(path, perms).map_err(|e| InstinctError::storage(path, e))?;
    }
    Ok(())
}

#[cfg(unix)]
fn lock_exclusive(file: &File, path: &Path) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if rc != 0 {
        return Err(InstinctError::storage(
            path,
            std::io::Error::last_os_error(),
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;
    // Unlock failure is moot: close releases the lock anyway.
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File, _path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}
