//! Unified error types for instinct with fail-open philosophy.
//!
//! Infrastructure errors must never crash or block the host tool session.
//! When errors occur we log warnings and return safe defaults rather than
//! propagating failures into the invoking process. The two exceptions are
//! security refusals (symlink write targets) and unexpected oracle
//! failures, which callers are expected to surface.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for instinct operations.
#[derive(Error, Debug)]
pub enum InstinctError {
    /// I/O errors from observation log, record, or state file operations.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or frontmatter parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// Refusal to write through a symlink target.
    #[error("refusing to write to symlink: {path}")]
    SymlinkRefused { path: PathBuf },

    /// A sanitized path escaped its owning directory.
    #[error("path traversal detected: {id}")]
    PathTraversal { id: String },

    /// Evolution rendering or artifact write errors.
    #[error("evolution error: {message}")]
    Evolution { message: String },
}

/// A specialized Result type for instinct operations.
pub type Result<T> = std::result::Result<T, InstinctError>;

impl InstinctError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an evolution error.
    pub fn evolution(message: impl Into<String>) -> Self {
        Self::Evolution {
            message: message.into(),
        }
    }

    /// Check if this error should trigger fail-open behavior.
    ///
    /// Security refusals are fatal for the item being written; everything
    /// else degrades to a safe default.
    pub fn is_fail_open(&self) -> bool {
        !matches!(
            self,
            Self::SymlinkRefused { .. } | Self::PathTraversal { .. }
        )
    }
}

impl From<io::Error> for InstinctError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for InstinctError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Trait for fail-open error handling.
///
/// Log the error as a warning and return a safe default instead of
/// propagating a failure that would block the host.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;

    /// Handle an error by logging a warning and returning the provided fallback.
    fn fail_open_with(self, context: &str, fallback: T) -> T;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }

    fn fail_open_with(self, context: &str, fallback: T) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using fallback)", context, err);
                fallback
            }
        }
    }
}

/// Exit codes for the instinct CLI.
///
/// Hook handlers always exit with SUCCESS so a learning failure can never
/// block the host tool session.
pub mod exit_codes {
    /// Normal completion.
    pub const SUCCESS: i32 = 0;

    /// Command-level failure (never used by hook handlers).
    pub const ERROR: i32 = 1;

    /// Crash handler exit (fail-open, host treats as success).
    pub const CRASH: i32 = 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = InstinctError::storage(
            "/tmp/observations.jsonl",
            io::Error::new(io::ErrorKind::NotFound, "file not found"),
        );
        assert!(err.to_string().contains("storage error"));
        assert!(err.to_string().contains("/tmp/observations.jsonl"));
    }

    #[test]
    fn test_serde_error_display() {
        let err = InstinctError::serde("invalid JSON");
        assert_eq!(err.to_string(), "serialization error: invalid JSON");
    }

    #[test]
    fn test_symlink_refusal_is_not_fail_open() {
        let err = InstinctError::SymlinkRefused {
            path: PathBuf::from("/tmp/evil.md"),
        };
        assert!(!err.is_fail_open());

        let err = InstinctError::PathTraversal {
            id: "../../etc/passwd".to_string(),
        };
        assert!(!err.is_fail_open());
    }

    #[test]
    fn test_infrastructure_errors_are_fail_open() {
        let errors = vec![
            InstinctError::serde("test"),
            InstinctError::config("test"),
            InstinctError::evolution("test"),
        ];
        for err in errors {
            assert!(err.is_fail_open(), "{err} should be fail-open");
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: InstinctError = json_err.into();
        assert!(matches!(err, InstinctError::Serde { .. }));
    }

    #[test]
    fn test_fail_open_default() {
        let result: Result<Vec<String>> = Err(InstinctError::config("test"));
        let value = result.fail_open_default("test context");
        assert!(value.is_empty());
    }

    #[test]
    fn test_fail_open_with() {
        let result: Result<i32> = Err(InstinctError::config("test"));
        assert_eq!(result.fail_open_with("test context", 42), 42);
    }

    #[test]
    fn test_fail_open_success_passthrough() {
        let result: Result<i32> = Ok(100);
        assert_eq!(result.fail_open_default("test context"), 100);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_codes::SUCCESS, 0);
        assert_eq!(exit_codes::ERROR, 1);
        assert_eq!(exit_codes::CRASH, 3);
    }
}
