//! Reconciliation of algorithm and oracle pattern streams.
//!
//! Patterns found by both sources merge into one record with a confidence
//! boost; oracle-only patterns carry a slight penalty. Matching is greedy
//! and each oracle pattern is consumed at most once.

use std::collections::HashSet;

use crate::models::{Pattern, PatternSource};

pub const CONFIDENCE_BOOST_MATCHED: f64 = 0.1;
pub const LLM_ONLY_CONFIDENCE_MULTIPLIER: f64 = 0.9;

/// Substrings stripped from triggers before comparison.
const TRIGGER_STOP_WORDS: &[&str] = &[
    "when",
    "creating",
    "writing",
    "adding",
    "implementing",
    "testing",
];

/// Lowercase a trigger and strip stop words for comparison.
pub fn normalize_trigger(trigger: &str) -> String {
    let mut normalized = trigger.to_lowercase();
    for word in TRIGGER_STOP_WORDS {
        normalized = normalized.replace(word, "").trim().to_string();
    }
    normalized.trim().to_string()
}

/// Sequence similarity ratio over the normalized triggers.
pub fn trigger_similarity(t1: &str, t2: &str) -> f64 {
    sequence_ratio(&normalize_trigger(t1), &normalize_trigger(t2))
}

/// Ratcliff-Obershelp ratio: 2*M/T where M sums recursive longest common
/// substring matches and T is the combined length.
fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matches = matching_chars(&a, &b);
    2.0 * matches as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (a_start, b_start, length) = longest_common_substring(a, b);
    if length == 0 {
        return 0;
    }
    length
        + matching_chars(&a[..a_start], &b[..b_start])
        + matching_chars(&a[a_start + length..], &b[b_start + length..])
}

fn longest_common_substring(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // lengths[j] = common suffix length ending at a[i], b[j-1]
    let mut lengths = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        let mut prev_diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let current = if ca == cb { prev_diag + 1 } else { 0 };
            prev_diag = lengths[j + 1];
            lengths[j + 1] = current;
            if current > best.2 {
                best = (i + 1 - current, j + 1 - current, current);
            }
        }
    }
    best
}

fn are_similar(p1: &Pattern, p2: &Pattern, threshold: f64) -> bool {
    p1.pattern_type == p2.pattern_type && trigger_similarity(&p1.trigger, &p2.trigger) >= threshold
}

fn set_source(mut pattern: Pattern, source: PatternSource) -> Pattern {
    pattern.metadata.retain(|(k, _)| k != "source");
    pattern
        .metadata
        .push(("source".to_string(), source.as_str().to_string()));
    pattern
}

fn merge_matching(algo: &Pattern, oracle: &Pattern) -> Pattern {
    // The algorithm pattern's shape wins; the oracle contributes evidence.
    let mut merged = set_source(algo.clone(), PatternSource::Merged);
    merged.metadata.push((
        "confidence_boost".to_string(),
        CONFIDENCE_BOOST_MATCHED.to_string(),
    ));
    merged.evidence.extend(oracle.evidence.iter().cloned());
    merged
}

fn mark_oracle_only(pattern: &Pattern) -> Pattern {
    let mut marked = set_source(pattern.clone(), PatternSource::Llm);
    marked.metadata.push((
        "confidence_multiplier".to_string(),
        LLM_ONLY_CONFIDENCE_MULTIPLIER.to_string(),
    ));
    marked
}

/// Merge the two pattern streams under the given similarity threshold.
pub fn merge_patterns(
    algorithm_patterns: &[Pattern],
    oracle_patterns: &[Pattern],
    similarity_threshold: f64,
) -> Vec<Pattern> {
    if algorithm_patterns.is_empty() && oracle_patterns.is_empty() {
        return Vec::new();
    }

    let mut merged = Vec::new();
    let mut used_oracle: HashSet<usize> = HashSet::new();

    for algo in algorithm_patterns {
        let matched = oracle_patterns.iter().enumerate().find(|(idx, oracle)| {
            !used_oracle.contains(idx) && are_similar(algo, oracle, similarity_threshold)
        });
        match matched {
            Some((idx, oracle)) => {
                merged.push(merge_matching(algo, oracle));
                used_oracle.insert(idx);
            }
            None => merged.push(set_source(algo.clone(), PatternSource::Algorithm)),
        }
    }

    for (idx, oracle) in oracle_patterns.iter().enumerate() {
        if !used_oracle.contains(&idx) {
            merged.push(mark_oracle_only(oracle));
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Evidence, PatternType};
    use chrono::Utc;

    fn pattern(pt: PatternType, trigger: &str, sessions: &[&str]) -> Pattern {
        let evidence = sessions
            .iter()
            .map(|s| Evidence::new(Utc::now(), *s, "evidence"))
            .collect();
        Pattern::new(pt, trigger, "description").with_evidence(evidence)
    }

    #[test]
    fn test_normalize_trigger() {
        assert_eq!(normalize_trigger("when creating tests"), "tests");
        assert_eq!(normalize_trigger("When Writing Docs"), "docs");
        assert_eq!(normalize_trigger("using grep"), "using grep");
    }

    #[test]
    fn test_sequence_ratio_basics() {
        assert_eq!(sequence_ratio("", ""), 1.0);
        assert_eq!(sequence_ratio("abc", "abc"), 1.0);
        assert_eq!(sequence_ratio("abc", "xyz"), 0.0);
        // "abcd" vs "bcde": common "bcd" -> 2*3/8
        assert!((sequence_ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_identical_triggers_match() {
        let algo = vec![pattern(
            PatternType::UserCorrection,
            "when editing recently written files",
            &["s1"],
        )];
        let oracle = vec![pattern(
            PatternType::UserCorrection,
            "when editing recently written files",
            &["llm-analysis"],
        )];
        let merged = merge_patterns(&algo, &oracle, 0.7);
        assert_eq!(merged.len(), 1);
        let p = &merged[0];
        assert_eq!(p.meta("source"), Some("merged"));
        assert_eq!(p.meta("confidence_boost"), Some("0.1"));
        // Evidence union from both sides.
        assert_eq!(p.evidence.len(), 2);
        let sessions: Vec<_> = p.evidence.iter().map(|e| e.session_id.as_str()).collect();
        assert!(sessions.contains(&"s1"));
        assert!(sessions.contains(&"llm-analysis"));
    }

    #[test]
    fn test_different_types_never_match() {
        let algo = vec![pattern(PatternType::UserCorrection, "when editing files", &["s1"])];
        let oracle = vec![pattern(PatternType::ToolPreference, "when editing files", &["llm"])];
        let merged = merge_patterns(&algo, &oracle, 0.7);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].meta("source"), Some("algorithm"));
        assert_eq!(merged[1].meta("source"), Some("llm"));
    }

    #[test]
    fn test_algorithm_only_patterns_marked() {
        let algo = vec![pattern(PatternType::ErrorResolution, "when encountering errors", &["s1"])];
        let merged = merge_patterns(&algo, &[], 0.7);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].meta("source"), Some("algorithm"));
        assert_eq!(merged[0].meta("confidence_boost"), None);
    }

    #[test]
    fn test_oracle_only_patterns_penalized() {
        let oracle = vec![pattern(PatternType::ToolPreference, "when grepping", &["llm"])];
        let merged = merge_patterns(&[], &oracle, 0.7);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].meta("source"), Some("llm"));
        assert_eq!(merged[0].meta("confidence_multiplier"), Some("0.9"));
    }

    #[test]
    fn test_each_oracle_pattern_consumed_once() {
        let algo = vec![
            pattern(PatternType::UserCorrection, "when editing files", &["s1"]),
            pattern(PatternType::UserCorrection, "when editing files", &["s2"]),
        ];
        let oracle = vec![pattern(PatternType::UserCorrection, "when editing files", &["llm"])];
        let merged = merge_patterns(&algo, &oracle, 0.7);
        assert_eq!(merged.len(), 2);
        let merged_count = merged
            .iter()
            .filter(|p| p.meta("source") == Some("merged"))
            .count();
        assert_eq!(merged_count, 1);
        assert_eq!(
            merged
                .iter()
                .filter(|p| p.meta("source") == Some("algorithm"))
                .count(),
            1
        );
    }

    #[test]
    fn test_dissimilar_triggers_not_merged() {
        let algo = vec![pattern(PatternType::ToolPreference, "when using Grep tool", &["s1"])];
        let oracle = vec![pattern(
            PatternType::ToolPreference,
            "completely unrelated thing",
            &["llm"],
        )];
        let merged = merge_patterns(&algo, &oracle, 0.7);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(merge_patterns(&[], &[], 0.7).is_empty());
    }

    #[test]
    fn test_stop_words_bridge_phrasing_differences() {
        // "when creating tests" and "when writing tests" normalize to the
        // same string.
        let algo = vec![pattern(PatternType::RepeatedWorkflow, "when creating tests", &["s1"])];
        let oracle = vec![pattern(PatternType::RepeatedWorkflow, "when writing tests", &["llm"])];
        let merged = merge_patterns(&algo, &oracle, 0.7);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].meta("source"), Some("merged"));
    }
}
