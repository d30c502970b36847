//! Error resolution detection: a failing tool completion followed by a
//! succeeding one in the same session.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{EventKind, Evidence, Observation, Pattern, PatternType};

use super::group_by_session;

const ERROR_KEYWORDS: &[&str] = &["error", "failed", "exception", "failure", "traceback"];

/// Stored error text is capped to keep records small.
const MAX_ERROR_OUTPUT_LEN: usize = 200;

fn error_type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+Error|\w+Exception)").expect("static regex"))
}

fn has_error_keywords(text: &str) -> bool {
    let lower = text.to_lowercase();
    ERROR_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// The specific error type when one is named, else the first matching
/// keyword, else "unknown".
fn extract_error_type(error_output: &str) -> String {
    let lower = error_output.to_lowercase();
    for keyword in ERROR_KEYWORDS {
        if !lower.contains(keyword) {
            continue;
        }
        if let Some(m) = error_type_regex().find(error_output) {
            return m.as_str().to_string();
        }
        return keyword.to_string();
    }
    "unknown".to_string()
}

pub fn detect_error_resolutions(observations: &[Observation]) -> Vec<Pattern> {
    let mut patterns = Vec::new();

    for (session_id, session_obs) in group_by_session(observations) {
        let mut recent_error: Option<&Observation> = None;

        for obs in session_obs {
            if obs.event != EventKind::ToolComplete {
                continue;
            }
            let output = obs.output.as_deref().unwrap_or("");

            if has_error_keywords(output) {
                recent_error = Some(obs);
                continue;
            }

            if let Some(error_obs) = recent_error.take() {
                let error_output = error_obs.output.as_deref().unwrap_or("");
                patterns.push(resolution_pattern(obs, &session_id, error_output));
            }
        }
    }

    patterns
}

fn resolution_pattern(obs: &Observation, session_id: &str, error_output: &str) -> Pattern {
    let error_type = extract_error_type(error_output);
    let evidence = Evidence::new(
        obs.timestamp,
        session_id,
        format!("Error ({error_type}) resolved with successful execution"),
    );
    Pattern::new(
        PatternType::ErrorResolution,
        "when encountering errors",
        format!("Error resolution: {error_type} was resolved"),
    )
    .with_domain("error-handling")
    .with_evidence(vec![evidence])
    .with_meta("error_type", &error_type)
    .with_meta(
        "error_output",
        crate::models::truncate_chars(error_output, MAX_ERROR_OUTPUT_LEN),
    )
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    #[test]
    fn test_error_then_success() {
        let observations = vec![
            tool_complete(0, "Bash", "s1", "ImportError: no module named foo"),
            tool_complete(10, "Bash", "s1", "all tests passed"),
        ];
        let patterns = detect_error_resolutions(&observations);
        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.pattern_type, PatternType::ErrorResolution);
        assert_eq!(p.trigger, "when encountering errors");
        assert_eq!(p.domain, "error-handling");
        assert_eq!(p.meta("error_type"), Some("ImportError"));
        assert!(p.description.contains("ImportError"));
    }

    #[test]
    fn test_error_without_resolution() {
        let observations = vec![tool_complete(0, "Bash", "s1", "error: it broke")];
        assert!(detect_error_resolutions(&observations).is_empty());
    }

    #[test]
    fn test_state_resets_after_resolution() {
        let observations = vec![
            tool_complete(0, "Bash", "s1", "FileNotFoundError: gone"),
            tool_complete(10, "Bash", "s1", "ok"),
            tool_complete(20, "Bash", "s1", "still ok"),
        ];
        assert_eq!(detect_error_resolutions(&observations).len(), 1);
    }

    #[test]
    fn test_consecutive_errors_resolve_once() {
        let observations = vec![
            tool_complete(0, "Bash", "s1", "error: first"),
            tool_complete(10, "Bash", "s1", "failed: second"),
            tool_complete(20, "Bash", "s1", "ok"),
        ];
        let patterns = detect_error_resolutions(&observations);
        assert_eq!(patterns.len(), 1);
        // Pattern carries the latest error output.
        assert!(patterns[0].meta("error_output").unwrap().contains("second"));
    }

    #[test]
    fn test_keyword_fallback_for_unnamed_error() {
        let observations = vec![
            tool_complete(0, "Bash", "s1", "the build failed"),
            tool_complete(10, "Bash", "s1", "ok"),
        ];
        let patterns = detect_error_resolutions(&observations);
        assert_eq!(patterns[0].meta("error_type"), Some("failed"));
    }

    #[test]
    fn test_error_output_truncated() {
        let long_error = format!("ValueError: {}", "x".repeat(500));
        let observations = vec![
            tool_complete(0, "Bash", "s1", &long_error),
            tool_complete(10, "Bash", "s1", "ok"),
        ];
        let patterns = detect_error_resolutions(&observations);
        assert_eq!(
            patterns[0].meta("error_output").unwrap().chars().count(),
            200
        );
    }

    #[test]
    fn test_sessions_are_independent() {
        let observations = vec![
            tool_complete(0, "Bash", "s1", "error: broken"),
            tool_complete(10, "Bash", "s2", "ok"),
        ];
        assert!(detect_error_resolutions(&observations).is_empty());
    }

    #[test]
    fn test_tool_start_events_ignored() {
        let observations = vec![
            tool_complete(0, "Bash", "s1", "TypeError: bad"),
            tool_start(5, "Read", "s1"),
            tool_complete(10, "Bash", "s1", "ok"),
        ];
        assert_eq!(detect_error_resolutions(&observations).len(), 1);
    }
}
