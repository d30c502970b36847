//! Repeated workflow detection: the same contiguous tool sequence showing
//! up in multiple sessions.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::models::{EventKind, Evidence, Observation, Pattern, PatternType};

use super::group_by_session;

const MIN_SEQUENCE_LENGTH: usize = 3;
const MIN_SESSIONS: usize = 2;

pub fn detect_repeated_workflows(observations: &[Observation]) -> Vec<Pattern> {
    let by_session = group_by_session(observations);

    // Per-session ordered tool names, sessions shorter than the minimum
    // sequence dropped outright.
    let mut session_sequences: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (session_id, session_obs) in by_session {
        let tools: Vec<String> = session_obs
            .iter()
            .filter(|obs| obs.event == EventKind::ToolStart && !obs.tool.is_empty())
            .map(|obs| obs.tool.clone())
            .collect();
        if tools.len() >= MIN_SEQUENCE_LENGTH {
            session_sequences.insert(session_id, tools);
        }
    }

    // Every contiguous subsequence of length >= 3, with the sessions it
    // appears in.
    let mut occurrences: BTreeMap<Vec<String>, Vec<String>> = BTreeMap::new();
    for (session_id, tools) in &session_sequences {
        for length in MIN_SEQUENCE_LENGTH..=tools.len() {
            for window in tools.windows(length) {
                let entry = occurrences.entry(window.to_vec()).or_default();
                if !entry.contains(session_id) {
                    entry.push(session_id.clone());
                }
            }
        }
    }

    let mut repeated: Vec<(Vec<String>, Vec<String>)> = occurrences
        .into_iter()
        .filter(|(_, sessions)| sessions.len() >= MIN_SESSIONS)
        .collect();

    // Longest-first: a sequence contained in a longer kept one is noise.
    repeated.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    let mut kept: Vec<(Vec<String>, Vec<String>)> = Vec::new();
    for (seq, sessions) in repeated {
        let is_subset = kept
            .iter()
            .any(|(longer, _)| seq.len() < longer.len() && is_contiguous_subsequence(&seq, longer));
        if !is_subset {
            kept.push((seq, sessions));
        }
    }

    kept.into_iter()
        .map(|(seq, sessions)| workflow_pattern(&seq, &sessions))
        .collect()
}

fn is_contiguous_subsequence(shorter: &[String], longer: &[String]) -> bool {
    longer.windows(shorter.len()).any(|w| w == shorter)
}

fn workflow_pattern(seq: &[String], sessions: &[String]) -> Pattern {
    let joined = seq.join(" -> ");
    let evidence: Vec<Evidence> = sessions
        .iter()
        .map(|session_id| {
            Evidence::new(
                Utc::now(),
                session_id,
                format!("Workflow sequence detected: {joined}"),
            )
        })
        .collect();

    Pattern::new(
        PatternType::RepeatedWorkflow,
        format!("when performing {} operations", seq[0].to_lowercase()),
        format!("Repeated workflow: {joined}"),
    )
    .with_domain("workflow")
    .with_evidence(evidence)
    .with_meta("sequence", joined)
    .with_meta("frequency", sessions.len().to_string())
}
