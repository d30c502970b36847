//! User correction detection.
//!
//! Two signals: an Edit that lands on a file the session recently wrote,
//! and a user message carrying a correction keyword shortly after a tool
//! finished.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{EventKind, Evidence, Observation, Pattern, PatternType};

use super::{extract_file_path, group_by_session};

const CORRECTION_KEYWORDS: &[&str] = &["no", "instead", "actually", "don't", "dont"];

/// How many events back a correction keyword may reach for its tool.
const LOOKBACK_LIMIT: usize = 5;

fn correction_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternatives = CORRECTION_KEYWORDS
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"\b(?:{alternatives})\b")).expect("static regex")
    })
}

fn has_correction_keywords(text: &str) -> bool {
    correction_regex().is_match(&text.to_lowercase())
}

pub fn detect_user_corrections(observations: &[Observation]) -> Vec<Pattern> {
    let mut patterns = Vec::new();

    for (session_id, session_obs) in group_by_session(observations) {
        let mut recent_writes: HashMap<String, &Observation> = HashMap::new();

        for (index, obs) in session_obs.iter().enumerate() {
            match (obs.event, obs.tool.as_str()) {
                (EventKind::ToolStart, "Write") => {
                    if let Some(path) = extract_file_path(obs.input.as_deref()) {
                        recent_writes.insert(path, obs);
                    }
                }
                (EventKind::ToolStart, "Edit") => {
                    let Some(path) = extract_file_path(obs.input.as_deref()) else {
                        continue;
                    };
                    if recent_writes.remove(&path).is_some() {
                        patterns.push(write_edit_pattern(obs, &session_id, &path));
                    }
                }
                (EventKind::UserMessage, _) => {
                    let content = obs.content.as_deref().unwrap_or("");
                    if !has_correction_keywords(content) {
                        continue;
                    }
                    if let Some(tool) = recent_tool_completion(&session_obs, index) {
                        patterns.push(keyword_pattern(obs, &session_id, &tool));
                    }
                }
                _ => {}
            }
        }
    }

    patterns
}

/// The most recent tool completion within the lookback window before
/// `current_index`.
fn recent_tool_completion(session_obs: &[&Observation], current_index: usize) -> Option<String> {
    let start = current_index.saturating_sub(LOOKBACK_LIMIT);
    session_obs[start..current_index]
        .iter()
        .rev()
        .find(|obs| obs.event == EventKind::ToolComplete)
        .map(|obs| {
            if obs.tool.is_empty() {
                "unknown".to_string()
            } else {
                obs.tool.clone()
            }
        })
}

fn write_edit_pattern(obs: &Observation, session_id: &str, file_path: &str) -> Pattern {
    let evidence = Evidence::new(
        obs.timestamp,
        session_id,
        format!("Write followed by Edit on same file: {file_path}"),
    );
    Pattern::new(
        PatternType::UserCorrection,
        "when editing recently written files",
        "User corrected content on same file after Write operation",
    )
    .with_domain("workflow")
    .with_evidence(vec![evidence])
    .with_meta("file_path", file_path)
}

fn keyword_pattern(obs: &Observation, session_id: &str, tool: &str) -> Pattern {
    let evidence = Evidence::new(
        obs.timestamp,
        session_id,
        "User correction keyword detected after tool execution",
    );
    Pattern::new(
        PatternType::UserCorrection,
        "when user provides correction feedback",
        "User correction keyword detected in message",
    )
    .with_domain("feedback")
    .with_evidence(vec![evidence])
    .with_meta("tool", tool)
}
