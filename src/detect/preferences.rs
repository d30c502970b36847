//! Tool preference detection: consistent use of a tool across sessions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;

use crate::models::{EventKind, Evidence, Observation, Pattern, PatternType};

use super::group_by_session;

const MIN_SESSIONS: usize = 2;
const MIN_TOTAL_USES: usize = 3;
const MAX_EVIDENCE_ENTRIES: usize = 5;

pub fn detect_tool_preferences(observations: &[Observation]) -> Vec<Pattern> {
    let by_session = group_by_session(observations);

    let mut tool_sessions: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut tool_counts: BTreeMap<String, usize> = BTreeMap::new();
    for (session_id, session_obs) in &by_session {
        for obs in session_obs {
            if obs.event != EventKind::ToolStart || obs.tool.is_empty() {
                continue;
            }
            tool_sessions
                .entry(obs.tool.clone())
                .or_default()
                .insert(session_id.clone());
            *tool_counts.entry(obs.tool.clone()).or_default() += 1;
        }
    }

    tool_sessions
        .into_iter()
        .filter(|(tool, sessions)| {
            sessions.len() >= MIN_SESSIONS && tool_counts[tool] >= MIN_TOTAL_USES
        })
        .map(|(tool, sessions)| preference_pattern(&tool, &sessions, tool_counts[&tool]))
        .collect()
}

fn preference_pattern(tool: &str, sessions: &BTreeSet<String>, total_uses: usize) -> Pattern {
    let evidence: Vec<Evidence> = sessions
        .iter()
        .take(MAX_EVIDENCE_ENTRIES)
        .map(|session_id| {
            Evidence::new(Utc::now(), session_id, format!("Tool {tool} used in session"))
        })
        .collect();

    Pattern::new(
        PatternType::ToolPreference,
        format!("when using {tool} tool"),
        format!(
            "Consistent use of {tool} tool across {} sessions ({total_uses} total uses)",
            sessions.len()
        ),
    )
    .with_domain("tool-usage")
    .with_evidence(evidence)
    .with_meta("tool", tool)
    .with_meta("frequency", total_uses.to_string())
    .with_meta("sessions", sessions.len().to_string())
}
