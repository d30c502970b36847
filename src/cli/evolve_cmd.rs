//! Evolve command: suggest and generate artifacts from learned records.

use serde::Serialize;

use crate::config::{ArtifactKind, Config, Paths, Scope};
use crate::error::Result;
use crate::evolve::{
    cluster_instincts, evaluate_cluster, generate_agent, generate_command, generate_rule,
    generate_skill, recommend_artifact, suggest_for_instinct, write_evolved, Cluster,
    EvolutionSuggestion,
};
use crate::models::Instinct;
use crate::notes::{generate_patterns_content, insert_patterns, write_claude_md};
use crate::repo::InstinctRepository;

/// Minimum record count before evolution analysis is meaningful.
const MIN_INSTINCTS_FOR_ANALYSIS: usize = 3;
const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;
const MAX_CANDIDATES_DISPLAY: usize = 5;

/// Options for the evolve command.
#[derive(Debug, Clone, Default)]
pub struct EvolveOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Write the suggested artifacts instead of only listing them.
    pub apply: bool,
    /// Record selection, e.g. "1,3,4" or "all".
    pub select: Option<String>,
    /// Where artifacts land.
    pub scope: Scope,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub domain: String,
    pub trigger_pattern: String,
    pub size: usize,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionSummary {
    pub kind: String,
    pub source_id: String,
    pub description: String,
}

/// Output format for the evolve command.
#[derive(Debug, Clone, Serialize)]
pub struct EvolveOutput {
    pub success: bool,
    pub total: usize,
    pub high_confidence: usize,
    pub clusters: Vec<ClusterSummary>,
    pub suggestions: Vec<SuggestionSummary>,
    pub files_written: Vec<String>,
    pub notes_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvolveOutput {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            total: 0,
            high_confidence: 0,
            clusters: Vec::new(),
            suggestions: Vec::new(),
            files_written: Vec::new(),
            notes_updated: false,
            error: Some(error.into()),
        }
    }
}

/// The evolve command implementation.
pub struct EvolveCommand {
    paths: Paths,
    config: Config,
}

impl EvolveCommand {
    pub fn new(paths: Paths, config: Config) -> Self {
        Self { paths, config }
    }

    pub fn run(&self, options: &EvolveOptions) -> EvolveOutput {
        let repository = InstinctRepository::new(self.paths.learned_dir());
        let all = repository.load_all();

        if all.len() < MIN_INSTINCTS_FOR_ANALYSIS {
            return EvolveOutput::failure(format!(
                "Need at least {MIN_INSTINCTS_FOR_ANALYSIS} instincts to analyze patterns. Currently have: {}",
                all.len()
            ));
        }

        let selected = select_records(&all, options.select.as_deref());
        let high_confidence = selected
            .iter()
            .filter(|i| i.confidence >= HIGH_CONFIDENCE_THRESHOLD)
            .count();

        let clusters = cluster_instincts(&selected, self.config.cluster_similarity_threshold);
        let mut suggestions: Vec<EvolutionSuggestion> =
            clusters.iter().filter_map(evaluate_cluster).collect();
        for instinct in &selected {
            if let Some(suggestion) = suggest_for_instinct(instinct) {
                suggestions.push(suggestion);
            }
        }

        let mut files_written = Vec::new();
        let mut notes_updated = false;
        if options.apply {
            match self.apply(&clusters, &selected, options.scope) {
                Ok((files, notes)) => {
                    files_written = files;
                    notes_updated = notes;
                }
                Err(e) => return EvolveOutput::failure(e.to_string()),
            }
        }

        EvolveOutput {
            success: true,
            total: selected.len(),
            high_confidence,
            clusters: clusters
                .iter()
                .map(|c| ClusterSummary {
                    domain: c.domain.clone(),
                    trigger_pattern: c.trigger_pattern.clone(),
                    size: c.instincts.len(),
                    avg_confidence: c.avg_confidence,
                })
                .collect(),
            suggestions: suggestions
                .iter()
                .map(|s| SuggestionSummary {
                    kind: s.kind.as_str().to_string(),
                    source_id: s.source_id.clone(),
                    description: s.description.clone(),
                })
                .collect(),
            files_written,
            notes_updated,
            error: None,
        }
    }

    /// Generate and write the artifacts each record calls for.
    ///
    /// Qualifying clusters become skill files. Each record then gets the
    /// artifact its shape recommends; records recommended as notes are
    /// batched into one CLAUDE.md update.
    fn apply(
        &self,
        clusters: &[Cluster],
        selected: &[Instinct],
        scope: Scope,
    ) -> Result<(Vec<String>, bool)> {
        let mut files = Vec::new();
        let mut notes_records: Vec<Instinct> = Vec::new();

        for cluster in clusters {
            if evaluate_cluster(cluster).is_some() {
                let content = generate_skill(cluster);
                let path =
                    write_evolved(&self.paths, ArtifactKind::Skill, scope, &cluster.domain, &content)?;
                files.push(path.display().to_string());
            }
        }

        for instinct in selected {
            let (kind, content) = match recommend_artifact(instinct) {
                ArtifactKind::Command => (ArtifactKind::Command, generate_command(instinct)),
                ArtifactKind::Agent => (ArtifactKind::Agent, generate_agent(instinct)),
                ArtifactKind::Rule => (ArtifactKind::Rule, generate_rule(instinct)),
                ArtifactKind::Skill if instinct.evidence_count >= 5 => {
                    // Evidence-heavy singletons get a one-record skill.
                    let cluster = Cluster {
                        domain: instinct.domain.clone(),
                        trigger_pattern: instinct.trigger.clone(),
                        instincts: vec![instinct.clone()],
                        avg_confidence: instinct.confidence,
                    };
                    (ArtifactKind::Skill, generate_skill(&cluster))
                }
                _ => {
                    notes_records.push(instinct.clone());
                    continue;
                }
            };
            let path = write_evolved(&self.paths, kind, scope, &instinct.id, &content)?;
            files.push(path.display().to_string());
        }

        let mut notes_updated = false;
        if !notes_records.is_empty() {
            let content = generate_patterns_content(&notes_records);
            let claude_md = self.paths.claude_md();
            let updated = insert_patterns(&claude_md, &content);
            write_claude_md(&claude_md, &updated)?;
            notes_updated = true;
        }

        Ok((files, notes_updated))
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &EvolveOutput, options: &EvolveOptions) -> String {
        if options.quiet {
            return String::new();
        }
        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }
        if !output.success {
            return format!(
                "{}\n",
                output.error.as_deref().unwrap_or("evolve failed")
            );
        }
        format_human_readable(output)
    }
}

/// Parse a selection like "1,3" into a record subset. "all", absence,
/// or unparseable input selects everything.
fn select_records(all: &[Instinct], selection: Option<&str>) -> Vec<Instinct> {
    let raw = match selection {
        Some(raw) if !raw.trim().is_empty() && raw.trim().to_lowercase() != "all" => raw,
        _ => return all.to_vec(),
    };

    let mut indices: Vec<usize> = Vec::new();
    for part in raw.split(',') {
        match part.trim().parse::<usize>() {
            Ok(n) if n >= 1 && n <= all.len() => indices.push(n - 1),
            _ => {
                tracing::warn!("skipping invalid selection entry: {part}");
            }
        }
    }
    if indices.is_empty() {
        return all.to_vec();
    }
    indices.sort_unstable();
    indices.dedup();
    indices.into_iter().map(|i| all[i].clone()).collect()
}

fn format_human_readable(output: &EvolveOutput) -> String {
    let banner = "=".repeat(60);
    let mut lines = vec![
        String::new(),
        banner.clone(),
        format!("  EVOLVE ANALYSIS - {} instincts", output.total),
        banner.clone(),
        String::new(),
        format!(
            "High confidence instincts (>=80%): {}",
            output.high_confidence
        ),
        String::new(),
        format!("Potential skill clusters found: {}", output.clusters.len()),
    ];

    if !output.clusters.is_empty() {
        lines.push(String::new());
        lines.push("## SKILL CANDIDATES".to_string());
        lines.push(String::new());
        for (i, cluster) in output.clusters.iter().take(MAX_CANDIDATES_DISPLAY).enumerate() {
            lines.push(format!("{}. Cluster: \"{}\"", i + 1, cluster.trigger_pattern));
            lines.push(format!("   Instincts: {}", cluster.size));
            lines.push(format!(
                "   Avg confidence: {:.0}%",
                cluster.avg_confidence * 100.0
            ));
            lines.push(format!("   Domain: {}", cluster.domain));
            lines.push(String::new());
        }
    }

    if !output.suggestions.is_empty() {
        lines.push("## SUGGESTIONS".to_string());
        lines.push(String::new());
        for suggestion in &output.suggestions {
            lines.push(format!("- [{}] {}", suggestion.kind, suggestion.description));
        }
        lines.push(String::new());
    }

    if !output.files_written.is_empty() {
        lines.push("## FILES WRITTEN".to_string());
        lines.push(String::new());
        for file in &output.files_written {
            lines.push(format!("- {file}"));
        }
        lines.push(String::new());
    }
    if output.notes_updated {
        lines.push("CLAUDE.md updated with learned patterns.".to_string());
        lines.push(String::new());
    }

    lines.push(banner);
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InstinctStatus;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(id: &str, trigger: &str, domain: &str, confidence: f64, source: &str) -> Instinct {
        Instinct {
            id: id.to_string(),
            trigger: trigger.to_string(),
            confidence,
            domain: domain.to_string(),
            source: source.to_string(),
            evidence_count: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            content: "Use the established approach for this work.".to_string(),
            source_file: None,
            status: InstinctStatus::Active,
            last_observed: None,
        }
    }

    fn seed_cluster(paths: &Paths, confidences: &[f64]) {
        let repository = InstinctRepository::new(paths.learned_dir());
        for (i, conf) in confidences.iter().enumerate() {
            repository
                .write(&record(
                    &format!("testing-record-{i}"),
                    "when writing tests",
                    "testing",
                    *conf,
                    "tool_preference",
                ))
                .unwrap();
        }
    }

    #[test]
    fn test_too_few_records_fails() {
        let dir = TempDir::new().unwrap();
        let cmd = EvolveCommand::new(Paths::new(dir.path()), Config::default());
        let output = cmd.run(&EvolveOptions::default());
        assert!(!output.success);
        assert!(output.error.unwrap().contains("at least 3"));
    }

    #[test]
    fn test_confident_cluster_suggests_skill() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::new(dir.path());
        seed_cluster(&paths, &[0.7, 0.75, 0.8]);

        let cmd = EvolveCommand::new(paths, Config::default());
        let output = cmd.run(&EvolveOptions::default());
        assert!(output.success);
        assert_eq!(output.clusters.len(), 1);
        assert_eq!(output.clusters[0].size, 3);
        let skill_suggestions: Vec<_> = output
            .suggestions
            .iter()
            .filter(|s| s.kind == "skill")
            .collect();
        assert_eq!(skill_suggestions.len(), 1);
    }

    #[test]
    fn test_weak_cluster_gets_no_skill() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::new(dir.path());
        seed_cluster(&paths, &[0.4, 0.5, 0.5]);

        let cmd = EvolveCommand::new(paths, Config::default());
        let output = cmd.run(&EvolveOptions::default());
        assert!(output.success);
        assert!(output.suggestions.iter().all(|s| s.kind != "skill"));
    }

    #[test]
    fn test_apply_writes_skill_file() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::new(dir.path());
        seed_cluster(&paths, &[0.7, 0.75, 0.8]);

        let cmd = EvolveCommand::new(paths.clone(), Config::default());
        let options = EvolveOptions {
            apply: true,
            ..Default::default()
        };
        let output = cmd.run(&options);
        assert!(output.success);
        assert!(output
            .files_written
            .iter()
            .any(|f| f.ends_with("testing-skill.md")));
        assert!(dir
            .path()
            .join(".claude/skills/testing-skill.md")
            .exists());
        // Records below the evidence threshold land in CLAUDE.md.
        assert!(output.notes_updated);
        let claude_md = std::fs::read_to_string(paths.claude_md()).unwrap();
        assert!(claude_md.contains("## Learned Patterns"));
    }

    #[test]
    fn test_apply_writes_command_for_workflow_record() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::new(dir.path());
        let repository = InstinctRepository::new(paths.learned_dir());
        repository
            .write(&record(
                "build-flow",
                "when running builds",
                "workflow",
                0.9,
                "repeated_workflow",
            ))
            .unwrap();
        seed_cluster(&paths, &[0.4, 0.4]);

        let cmd = EvolveCommand::new(paths, Config::default());
        let options = EvolveOptions {
            apply: true,
            ..Default::default()
        };
        let output = cmd.run(&options);
        assert!(output.success);
        assert!(output
            .files_written
            .iter()
            .any(|f| f.ends_with("build-flow-command.md")));
    }

    #[test]
    fn test_select_records() {
        let all = vec![
            record("a", "t", "d", 0.5, "s"),
            record("b", "t", "d", 0.5, "s"),
            record("c", "t", "d", 0.5, "s"),
        ];
        assert_eq!(select_records(&all, None).len(), 3);
        assert_eq!(select_records(&all, Some("all")).len(), 3);

        let picked = select_records(&all, Some("1,3"));
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].id, "a");
        assert_eq!(picked[1].id, "c");

        // Out-of-range entries are skipped, garbage falls back to all.
        assert_eq!(select_records(&all, Some("2,9")).len(), 1);
        assert_eq!(select_records(&all, Some("nope")).len(), 3);
    }

    #[test]
    fn test_format_human_readable() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::new(dir.path());
        seed_cluster(&paths, &[0.7, 0.75, 0.8]);

        let cmd = EvolveCommand::new(paths, Config::default());
        let output = cmd.run(&EvolveOptions::default());
        let formatted = cmd.format_output(&output, &EvolveOptions::default());
        assert!(formatted.contains("EVOLVE ANALYSIS - 3 instincts"));
        assert!(formatted.contains("SKILL CANDIDATES"));
        assert!(formatted.contains("Avg confidence: 75%"));
    }
}
