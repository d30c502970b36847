//! Hook handlers for Claude Code integration.
//!
//! Hooks read JSON from stdin, append an observation, and always exit
//! successfully. A hook failure must never block the host session.

use std::io::Read;

use serde_json::Value;

use crate::config::{Config, Paths};
use crate::error::{exit_codes, FailOpen, Result};
use crate::models::{EventKind, Observation};
use crate::store::{ObservationLog, TriggerThrottle};
use crate::trigger::{should_trigger, spawn_background_learn};

/// Hook event types delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreToolUse,
    PostToolUse,
    UserMessage,
}

/// Parsed hook payload. Field names vary between host versions, so each
/// field is read from a primary key with a fallback.
#[derive(Debug, Clone, Default)]
pub struct HookData {
    pub tool: String,
    pub input: Option<String>,
    pub output: Option<String>,
    pub content: Option<String>,
    pub session_id: String,
}

impl HookData {
    pub fn from_json(value: &Value) -> Self {
        Self {
            tool: extract_field(value, "tool_name", "tool").unwrap_or_default(),
            input: extract_field(value, "tool_input", "input"),
            output: extract_field(value, "tool_output", "output"),
            content: extract_field(value, "prompt", "content"),
            session_id: value
                .get("session_id")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

/// Read a field as a string, serializing objects to JSON text.
fn extract_field(value: &Value, primary: &str, fallback: &str) -> Option<String> {
    let field = value.get(primary).or_else(|| value.get(fallback))?;
    match field {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => serde_json::to_string(other).ok(),
    }
}

pub struct HookRunner {
    paths: Paths,
    config: Config,
}

impl HookRunner {
    pub fn new(paths: Paths, config: Config) -> Self {
        Self { paths, config }
    }

    /// Run a hook over a JSON payload read from `reader`.
    ///
    /// Always returns exit code 0. Malformed payloads and storage errors
    /// are logged and swallowed.
    pub fn run(&self, kind: HookKind, reader: &mut dyn Read) -> i32 {
        let mut raw = String::new();
        if reader.read_to_string(&mut raw).is_err() {
            tracing::warn!("failed to read hook payload from stdin");
            return exit_codes::SUCCESS;
        }

        let data = match serde_json::from_str::<Value>(&raw) {
            Ok(value) => HookData::from_json(&value),
            Err(e) => {
                tracing::warn!("malformed hook payload: {e}");
                return exit_codes::SUCCESS;
            }
        };

        self.handle(kind, &data)
            .fail_open_default("handling hook event");
        exit_codes::SUCCESS
    }

    fn handle(&self, kind: HookKind, data: &HookData) -> Result<()> {
        match kind {
            HookKind::PreToolUse => self.observe_pre(data),
            HookKind::PostToolUse => self.observe_post(data),
            HookKind::UserMessage => self.observe_user_message(data),
        }
    }

    fn log(&self) -> ObservationLog {
        ObservationLog::new(
            self.paths.observations_file(),
            self.paths.archive_dir(),
            &self.config,
        )
    }

    pub fn observe_pre(&self, data: &HookData) -> Result<()> {
        let mut observation = Observation::new(EventKind::ToolStart, &data.tool, &data.session_id);
        observation.input = data.input.clone();
        self.log().append(&observation)
    }

    pub fn observe_post(&self, data: &HookData) -> Result<()> {
        let mut observation =
            Observation::new(EventKind::ToolComplete, &data.tool, &data.session_id);
        observation.output = data.output.clone();
        self.log().append(&observation)?;

        self.maybe_trigger_learning();
        Ok(())
    }

    pub fn observe_user_message(&self, data: &HookData) -> Result<()> {
        let mut observation = Observation::new(EventKind::UserMessage, "", &data.session_id);
        observation.content = data.content.clone();
        self.log().append(&observation)
    }

    /// Check the auto-learn trigger on every Nth observation.
    ///
    /// The throttle count persists in a counter file so the condition is
    /// only evaluated every `trigger_check_interval` post hooks; the
    /// per-hook cost is one tiny read and write.
    fn maybe_trigger_learning(&self) {
        let throttle_file = self.paths.throttle_file();
        let mut throttle =
            TriggerThrottle::load(&throttle_file, self.config.trigger_check_interval);
        let due = throttle.tick();
        if let Err(e) = throttle.save(&throttle_file) {
            tracing::warn!("failed to persist trigger throttle: {e}");
        }
        if !due {
            return;
        }
        if should_trigger(&self.paths, &self.config) {
            spawn_background_learn(&self.paths);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn runner(dir: &TempDir) -> HookRunner {
        HookRunner::new(Paths::new(dir.path()), Config::default())
    }

    fn load_observations(paths: &Paths) -> Vec<Observation> {
        let log = ObservationLog::new(
            paths.observations_file(),
            paths.archive_dir(),
            &Config::default(),
        );
        log.load_recent(100).unwrap()
    }

    #[test]
    fn test_hook_data_primary_keys() {
        let value = serde_json::json!({
            "tool_name": "Write",
            "tool_input": {"file_path": "src/main.rs"},
            "session_id": "s1",
        });
        let data = HookData::from_json(&value);
        assert_eq!(data.tool, "Write");
        assert_eq!(data.session_id, "s1");
        assert!(data.input.as_deref().unwrap().contains("src/main.rs"));
    }

    #[test]
    fn test_hook_data_fallback_keys() {
        let value = serde_json::json!({
            "tool": "Edit",
            "input": "raw input",
            "output": "raw output",
        });
        let data = HookData::from_json(&value);
        assert_eq!(data.tool, "Edit");
        assert_eq!(data.input.as_deref(), Some("raw input"));
        assert_eq!(data.output.as_deref(), Some("raw output"));
        assert_eq!(data.session_id, "unknown");
    }

    #[test]
    fn test_pre_hook_appends_tool_start() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let payload = r#"{"tool_name": "Write", "tool_input": "x", "session_id": "s1"}"#;
        let code = runner.run(HookKind::PreToolUse, &mut Cursor::new(payload));
        assert_eq!(code, exit_codes::SUCCESS);

        let observations = load_observations(&Paths::new(dir.path()));
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].event, EventKind::ToolStart);
        assert_eq!(observations[0].tool, "Write");
        assert_eq!(observations[0].input.as_deref(), Some("x"));
    }

    #[test]
    fn test_post_hook_appends_tool_complete() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let payload = r#"{"tool_name": "Bash", "tool_output": "done", "session_id": "s1"}"#;
        runner.run(HookKind::PostToolUse, &mut Cursor::new(payload));

        let observations = load_observations(&Paths::new(dir.path()));
        assert_eq!(observations[0].event, EventKind::ToolComplete);
        assert_eq!(observations[0].output.as_deref(), Some("done"));
    }

    #[test]
    fn test_post_hook_throttle_persists_across_processes() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::new(dir.path());
        let config = Config {
            trigger_check_interval: 3,
            ..Config::default()
        };
        let payload = r#"{"tool_name": "Bash", "session_id": "s1"}"#;

        // Each hook runs in a fresh process; a new runner per call models
        // that. The counter file carries the throttle across them and
        // resets on the interval-th post hook.
        for expected in ["1", "2", "0"] {
            let runner = HookRunner::new(Paths::new(dir.path()), config.clone());
            runner.run(HookKind::PostToolUse, &mut Cursor::new(payload));
            assert_eq!(
                std::fs::read_to_string(paths.throttle_file()).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn test_pre_hook_leaves_throttle_untouched() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let payload = r#"{"tool_name": "Read", "session_id": "s1"}"#;
        runner.run(HookKind::PreToolUse, &mut Cursor::new(payload));
        assert!(!Paths::new(dir.path()).throttle_file().exists());
    }

    #[test]
    fn test_user_message_hook() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let payload = r#"{"prompt": "no, use the other file", "session_id": "s1"}"#;
        runner.run(HookKind::UserMessage, &mut Cursor::new(payload));

        let observations = load_observations(&Paths::new(dir.path()));
        assert_eq!(observations[0].event, EventKind::UserMessage);
        assert_eq!(
            observations[0].content.as_deref(),
            Some("no, use the other file")
        );
    }

    #[test]
    fn test_malformed_payload_exits_zero() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let code = runner.run(HookKind::PreToolUse, &mut Cursor::new("not json"));
        assert_eq!(code, exit_codes::SUCCESS);
        assert!(!Paths::new(dir.path()).observations_file().exists());
    }

    #[test]
    fn test_empty_payload_exits_zero() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let code = runner.run(HookKind::PostToolUse, &mut Cursor::new(""));
        assert_eq!(code, exit_codes::SUCCESS);
    }

    #[test]
    fn test_long_input_truncated_on_append() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let long = "y".repeat(6000);
        let payload = format!(r#"{{"tool_name": "Bash", "tool_input": "{long}", "session_id": "s1"}}"#);
        runner.run(HookKind::PreToolUse, &mut Cursor::new(payload));

        let observations = load_observations(&Paths::new(dir.path()));
        assert_eq!(observations[0].input.as_ref().unwrap().chars().count(), 5000);
    }
}
