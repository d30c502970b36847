//! Pattern detection over the observation log.
//!
//! Each detector is a pure function over a slice of observations. They
//! share session grouping and keyword matching helpers here.

mod corrections;
mod errors;
mod preferences;
mod workflows;

pub use corrections::detect_user_corrections;
pub use errors::detect_error_resolutions;
pub use preferences::detect_tool_preferences;
pub use workflows::detect_repeated_workflows;

use std::collections::BTreeMap;

use crate::models::{Observation, Pattern};

/// Run every detector and concatenate the results.
pub fn detect_all(observations: &[Observation]) -> Vec<Pattern> {
    if observations.is_empty() {
        return Vec::new();
    }
    let mut patterns = Vec::new();
    patterns.extend(detect_user_corrections(observations));
    patterns.extend(detect_error_resolutions(observations));
    patterns.extend(detect_repeated_workflows(observations));
    patterns.extend(detect_tool_preferences(observations));
    patterns
}

/// Group observations by session, each group sorted by timestamp.
///
/// BTreeMap keeps session iteration deterministic.
pub(crate) fn group_by_session(observations: &[Observation]) -> BTreeMap<String, Vec<&Observation>> {
    let mut by_session: BTreeMap<String, Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        by_session.entry(obs.session.clone()).or_default().push(obs);
    }
    for group in by_session.values_mut() {
        group.sort_by_key(|obs| obs.timestamp);
    }
    by_session
}

/// Pull `file_path` out of a serialized tool input.
pub(crate) fn extract_file_path(input: Option<&str>) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(input?).ok()?;
    parsed.get("file_path")?.as_str().map(|s| s.to_string())
}
