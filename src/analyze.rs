//! The analysis pass: observations in, records out.
//!
//! Runs the algorithmic detectors, optionally the oracle, merges the
//! two streams, and writes new records into the learned directory.

use chrono::Utc;

use crate::config::{Config, Paths};
use crate::confidence::{apply_decay, dormant_status};
use crate::detect::detect_all;
use crate::error::Result;
use crate::models::{Instinct, Pattern};
use crate::oracle::{OracleClient, RecordSummary};
use crate::reconcile::merge_patterns;
use crate::repo::{instinct_from_pattern, InstinctRepository};
use crate::store::ObservationLog;

/// Record count at which analysis starts warning about directory size.
const MAX_RECORD_FILES_WARNING: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub dry_run: bool,
    pub skip_oracle: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub patterns_detected: usize,
    pub instincts_created: usize,
    pub instincts_updated: usize,
    pub warnings: Vec<String>,
    pub patterns: Vec<Pattern>,
    pub detection_sources: Vec<String>,
}

/// Run one analysis pass over the observation log.
pub fn run_analysis(
    paths: &Paths,
    config: &Config,
    options: &AnalysisOptions,
) -> Result<AnalysisResult> {
    let mut warnings = Vec::new();
    let mut detection_sources = vec!["algorithm".to_string()];

    let repository = InstinctRepository::new(paths.learned_dir());
    let existing = repository.load_all();
    let mut existing_ids: std::collections::BTreeSet<String> =
        existing.iter().map(|i| i.id.clone()).collect();

    if existing.len() >= MAX_RECORD_FILES_WARNING {
        warnings.push(format!(
            "Warning: {} record files in {} - this may impact performance",
            existing.len(),
            repository.directory().display()
        ));
    }

    let log = ObservationLog::new(paths.observations_file(), paths.archive_dir(), config);
    let observations = log.load_recent(config.max_observations_for_analysis)?;
    if observations.is_empty() {
        return Ok(AnalysisResult {
            warnings,
            detection_sources,
            ..AnalysisResult::default()
        });
    }

    let algorithm_patterns = detect_all(&observations);

    let use_oracle = OracleClient::is_available() && !options.skip_oracle;
    let patterns = if use_oracle {
        detection_sources.push("llm".to_string());
        let oracle = OracleClient::new(&config.oracle_model);
        let serialized: Vec<serde_json::Value> = observations
            .iter()
            .filter_map(|obs| serde_json::to_value(obs).ok())
            .collect();
        let summaries: Vec<RecordSummary> = existing
            .iter()
            .map(|i| RecordSummary {
                id: i.id.clone(),
                trigger: i.trigger.clone(),
            })
            .collect();
        let oracle_patterns = match oracle.detect_patterns(&serialized, &summaries) {
            Ok(patterns) => patterns,
            Err(e) => {
                warnings.push(format!("Oracle analysis failed: {e}"));
                Vec::new()
            }
        };
        merge_patterns(&algorithm_patterns, &oracle_patterns, config.similarity_threshold)
    } else {
        algorithm_patterns
    };

    if patterns.is_empty() {
        return Ok(AnalysisResult {
            warnings,
            detection_sources,
            ..AnalysisResult::default()
        });
    }

    let mut instincts_created = 0;
    let mut instincts_updated = 0;
    if !options.dry_run {
        for pattern in &patterns {
            let instinct = instinct_from_pattern(pattern);
            if existing_ids.contains(&instinct.id) {
                instincts_updated += 1;
            } else {
                repository.write(&instinct)?;
                existing_ids.insert(instinct.id);
                instincts_created += 1;
            }
        }
    }

    Ok(AnalysisResult {
        patterns_detected: patterns.len(),
        instincts_created,
        instincts_updated,
        warnings,
        patterns,
        detection_sources,
    })
}

/// Apply weekly confidence decay across the learned directory.
///
/// Only records whose confidence actually changed are rewritten.
pub fn apply_decay_sweep(repository: &InstinctRepository) -> Result<Vec<Instinct>> {
    let now = Utc::now();
    let mut decayed_instincts = Vec::new();

    for instinct in repository.load_all() {
        let mut decayed = apply_decay(&instinct, now);
        let new_status = dormant_status(decayed.confidence);
        if new_status != decayed.status {
            decayed = decayed.with_status(new_status);
        }

        if decayed.confidence != instinct.confidence {
            repository.write(&decayed)?;
        }
        decayed_instincts.push(decayed);
    }
    Ok(decayed_instincts)
}

pub fn format_analysis_summary(result: &AnalysisResult) -> String {
    let banner = "=".repeat(60);
    let mut lines = vec![
        String::new(),
        banner.clone(),
        "  PATTERN ANALYSIS SUMMARY".to_string(),
        banner.clone(),
        String::new(),
        format!("  Patterns detected:   {}", result.patterns_detected),
        format!("  Instincts created:   {}", result.instincts_created),
        format!("  Instincts updated:   {}", result.instincts_updated),
    ];

    if !result.warnings.is_empty() {
        lines.push(String::new());
        lines.push("  Warnings:".to_string());
        for warning in &result.warnings {
            lines.push(format!("    - {warning}"));
        }
    }

    if result.patterns_detected == 0 {
        lines.push(String::new());
        lines.push("  No patterns detected in observations.".to_string());
    }

    lines.push(String::new());
    lines.push(banner);
    lines.push(String::new());
    lines.join("\n")
}
