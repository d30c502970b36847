//! Evolution of learned instincts into generated artifacts.
//!
//! Clusters related instincts, suggests skill/command/agent promotions,
//! recommends one of five artifact shapes per record, and renders and
//! writes the artifact files.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use chrono::Utc;

use crate::config::{ArtifactKind, Paths, Scope};
use crate::error::{InstinctError, Result};
use crate::models::Instinct;
use crate::store::create_private_dir;

pub const MIN_CLUSTER_SIZE_FOR_SKILL: usize = 3;
pub const MIN_AVG_CONFIDENCE_FOR_SKILL: f64 = 0.7;
pub const MIN_CONFIDENCE_FOR_COMMAND: f64 = 0.85;

const KEYWORD_STOP_WORDS: &[&str] = &[
    "when", "the", "a", "an", "to", "for", "of", "in", "on", "is", "are",
];

const MULTI_STEP_INDICATORS: &[&str] = &["1.", "2.", "3.", "step", "then", "->"];
const WORKFLOW_SOURCES: &[&str] = &["repeated_workflow", "pattern-detection"];

/// Line count at which a workflow record graduates from command to agent.
const COMMAND_MAX_LINES: usize = 10;

/// A group of same-domain instincts with overlapping triggers.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub domain: String,
    pub trigger_pattern: String,
    pub instincts: Vec<Instinct>,
    pub avg_confidence: f64,
}

/// A promotion suggestion for a cluster or single instinct.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionSuggestion {
    pub kind: ArtifactKind,
    pub source_id: String,
    pub description: String,
}

/// Keywords of a trigger: lowercased words over 2 chars, stop words out.
fn trigger_keywords(trigger: &str) -> BTreeSet<String> {
    trigger
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > 2 && !KEYWORD_STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Jaccard similarity on trigger keywords.
fn keyword_similarity(t1: &str, t2: &str) -> f64 {
    let k1 = trigger_keywords(t1);
    let k2 = trigger_keywords(t2);
    if k1.is_empty() || k2.is_empty() {
        return 0.0;
    }
    let intersection = k1.intersection(&k2).count();
    let union = k1.union(&k2).count();
    intersection as f64 / union as f64
}

/// Cluster instincts by domain, then greedily by trigger similarity.
pub fn cluster_instincts(instincts: &[Instinct], similarity_threshold: f64) -> Vec<Cluster> {
    if instincts.is_empty() {
        return Vec::new();
    }

    let mut by_domain: BTreeMap<String, Vec<&Instinct>> = BTreeMap::new();
    for instinct in instincts {
        by_domain
            .entry(instinct.domain.clone())
            .or_default()
            .push(instinct);
    }

    let mut clusters = Vec::new();
    for (domain, domain_instincts) in by_domain {
        let mut used = vec![false; domain_instincts.len()];
        for i in 0..domain_instincts.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            let seed = domain_instincts[i];
            let mut members = vec![seed.clone()];
            for (j, candidate) in domain_instincts.iter().enumerate() {
                if used[j] {
                    continue;
                }
                if keyword_similarity(&seed.trigger, &candidate.trigger) >= similarity_threshold {
                    members.push((*candidate).clone());
                    used[j] = true;
                }
            }
            clusters.push(make_cluster(&domain, members));
        }
    }
    clusters
}

fn make_cluster(domain: &str, members: Vec<Instinct>) -> Cluster {
    let avg_confidence =
        members.iter().map(|i| i.confidence).sum::<f64>() / members.len() as f64;
    let mut all_keywords: BTreeSet<String> = BTreeSet::new();
    for member in &members {
        all_keywords.extend(trigger_keywords(&member.trigger));
    }
    let trigger_pattern = if all_keywords.is_empty() {
        domain.to_string()
    } else {
        all_keywords
            .into_iter()
            .take(3)
            .collect::<Vec<_>>()
            .join(" ")
    };
    Cluster {
        domain: domain.to_string(),
        trigger_pattern,
        instincts: members,
        avg_confidence,
    }
}

/// Skill suggestion when a cluster is large and confident enough.
pub fn evaluate_cluster(cluster: &Cluster) -> Option<EvolutionSuggestion> {
    if cluster.instincts.len() >= MIN_CLUSTER_SIZE_FOR_SKILL
        && cluster.avg_confidence >= MIN_AVG_CONFIDENCE_FOR_SKILL
    {
        return Some(EvolutionSuggestion {
            kind: ArtifactKind::Skill,
            source_id: format!("cluster-{}-{}", cluster.domain, cluster.trigger_pattern),
            description: format!(
                "Create skill for {} domain: {} related instincts with {:.0}% avg confidence",
                cluster.domain,
                cluster.instincts.len(),
                cluster.avg_confidence * 100.0
            ),
        });
    }
    None
}

fn has_multi_step_workflow(content: &str) -> bool {
    let lower = content.to_lowercase();
    MULTI_STEP_INDICATORS.iter().any(|i| lower.contains(i))
}

fn is_workflow_sourced(instinct: &Instinct) -> bool {
    WORKFLOW_SOURCES.contains(&instinct.source.as_str())
}

/// Agent or command suggestion for one high-confidence workflow instinct.
pub fn suggest_for_instinct(instinct: &Instinct) -> Option<EvolutionSuggestion> {
    if instinct.confidence < MIN_CONFIDENCE_FOR_COMMAND {
        return None;
    }
    if !is_workflow_sourced(instinct) {
        return None;
    }
    if has_multi_step_workflow(&instinct.content) {
        return Some(EvolutionSuggestion {
            kind: ArtifactKind::Agent,
            source_id: instinct.id.clone(),
            description: format!("Create agent for complex workflow: {}", instinct.trigger),
        });
    }
    Some(EvolutionSuggestion {
        kind: ArtifactKind::Command,
        source_id: instinct.id.clone(),
        description: format!("Create command for: {}", instinct.trigger),
    })
}

fn has_checklist_or_table(content: &str) -> bool {
    content.lines().any(|line| {
        let trimmed = line.trim_start();
        trimmed.starts_with("- [ ]")
            || trimmed.starts_with("- [x]")
            || trimmed.starts_with("- [X]")
            || trimmed.starts_with('|')
    })
}

/// Recommend one of the five artifact shapes for a record.
///
/// Fixed decision order: short workflow content becomes a command, long
/// workflow content an agent, checklist/table markup a rule, heavy
/// evidence a skill, anything else freeform notes.
pub fn recommend_artifact(instinct: &Instinct) -> ArtifactKind {
    if is_workflow_sourced(instinct) {
        let lines = instinct.content.lines().count();
        if lines <= COMMAND_MAX_LINES {
            return ArtifactKind::Command;
        }
        return ArtifactKind::Agent;
    }
    if has_checklist_or_table(&instinct.content) {
        return ArtifactKind::Rule;
    }
    if instinct.evidence_count >= 5 {
        return ArtifactKind::Skill;
    }
    ArtifactKind::Notes
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn generate_skill(cluster: &Cluster) -> String {
    let now = Utc::now().to_rfc3339();

    // First substantial non-heading line of each member's content.
    let mut guidance_points = Vec::new();
    for instinct in &cluster.instincts {
        if let Some(line) = instinct
            .content
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#') && l.len() > 20)
        {
            guidance_points.push(format!("- {line}"));
        }
    }
    let guidance = if guidance_points.is_empty() {
        "- Follow learned patterns for this domain".to_string()
    } else {
        guidance_points.join("\n")
    };

    let sources = cluster
        .instincts
        .iter()
        .map(|i| format!("- {} (confidence: {:.0}%)", i.id, i.confidence * 100.0))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "# {} Skill\n\n\
        Generated from {} learned instincts.\n\
        Average confidence: {:.0}%\n\n\
        ## When to Apply\n\n{}\n\n\
        ## Guidance\n\n{}\n\n\
        ## Source Instincts\n\n{}\n\n\
        ---\nGenerated: {}\n",
        title_case(&cluster.domain),
        cluster.instincts.len(),
        cluster.avg_confidence * 100.0,
        cluster.trigger_pattern,
        guidance,
        sources,
        now
    )
}

pub fn generate_command(instinct: &Instinct) -> String {
    format!(
        "# {}\n\n\
        A command generated from a learned workflow pattern.\n\n\
        ## Usage\n\nWhen: {}\n\n\
        ## Action\n\n{}\n\n\
        ---\nSource instinct: {}\nConfidence: {:.0}%\nGenerated: {}\n",
        title_case(&instinct.trigger),
        instinct.trigger,
        instinct.content,
        instinct.id,
        instinct.confidence * 100.0,
        Utc::now().to_rfc3339()
    )
}

pub fn generate_agent(instinct: &Instinct) -> String {
    format!(
        "# {} Agent\n\n\
        An agent generated from a learned multi-step workflow pattern.\n\n\
        ## Purpose\n\n{}\n\n\
        ## Workflow\n\n{}\n\n\
        ## Activation\n\nThis agent activates when: {}\n\n\
        ---\nSource instinct: {}\nConfidence: {:.0}%\nEvidence count: {}\nGenerated: {}\n",
        title_case(&instinct.trigger),
        instinct.trigger,
        instinct.content,
        instinct.trigger,
        instinct.id,
        instinct.confidence * 100.0,
        instinct.evidence_count,
        Utc::now().to_rfc3339()
    )
}

pub fn generate_rule(instinct: &Instinct) -> String {
    format!(
        "# Rule: {}\n\n\
        A rule generated from a learned pattern.\n\n\
        ## Applies\n\nWhen: {}\n\n\
        ## Rule\n\n{}\n\n\
        ---\nSource instinct: {}\nConfidence: {:.0}%\nGenerated: {}\n",
        title_case(&instinct.trigger),
        instinct.trigger,
        instinct.content,
        instinct.id,
        instinct.confidence * 100.0,
        Utc::now().to_rfc3339()
    )
}

/// Sanitize a filename stem: basename only, unsafe characters replaced,
/// dashes collapsed.
fn sanitize_filename(name: &str) -> String {
    let basename = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let replaced: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let mut collapsed = String::with_capacity(replaced.len());
    for c in replaced.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }
    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Write an evolved artifact, with the same symlink and containment
/// checks as the record repository.
pub fn write_evolved(
    paths: &Paths,
    kind: ArtifactKind,
    scope: Scope,
    stem: &str,
    content: &str,
) -> Result<PathBuf> {
    let directory = paths.artifact_dir(kind, scope);
    create_private_dir(&directory)?;

    let filename = format!("{}-{}.md", sanitize_filename(stem), kind.as_str());
    let file_path = directory.join(filename);

    if file_path.is_symlink() {
        return Err(InstinctError::SymlinkRefused { path: file_path });
    }
    let resolved_dir = directory
        .canonicalize()
        .map_err(|e| InstinctError::storage(&directory, e))?;
    let resolved_parent = file_path
        .parent()
        .ok_or_else(|| InstinctError::PathTraversal {
            id: stem.to_string(),
        })?
        .canonicalize()
        .map_err(|e| InstinctError::storage(&file_path, e))?;
    if resolved_parent != resolved_dir {
        return Err(InstinctError::PathTraversal {
            id: stem.to_string(),
        });
    }

    fs::write(&file_path, content).map_err(|e| InstinctError::storage(&file_path, e))?;
    Ok(file_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InstinctStatus;
    use tempfile::TempDir;

    fn instinct(id: &str, trigger: &str, domain: &str, confidence: f64) -> Instinct {
        Instinct {
            id: id.to_string(),
            trigger: trigger.to_string(),
            confidence,
            domain: domain.to_string(),
            source: "tool_preference".to_string(),
            evidence_count: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            content: "Use the learned approach consistently here.".to_string(),
            source_file: None,
            status: InstinctStatus::Active,
            last_observed: None,
        }
    }

    fn workflow_instinct(id: &str, confidence: f64, content: &str) -> Instinct {
        Instinct {
            source: "repeated_workflow".to_string(),
            content: content.to_string(),
            ..instinct(id, "when running the build", "workflow", confidence)
        }
    }

    #[test]
    fn test_trigger_keywords() {
        let keywords = trigger_keywords("when writing tests for the parser");
        assert!(keywords.contains("writing"));
        assert!(keywords.contains("tests"));
        assert!(keywords.contains("parser"));
        assert!(!keywords.contains("when"));
        assert!(!keywords.contains("for"));
        assert!(!keywords.contains("the"));
    }

    #[test]
    fn test_keyword_similarity() {
        assert_eq!(keyword_similarity("when writing tests", "when writing tests"), 1.0);
        assert_eq!(keyword_similarity("when alpha beta", "when gamma delta"), 0.0);
        // {writing, tests} vs {writing, docs}: 1/3
        let sim = keyword_similarity("when writing tests", "when writing docs");
        assert!((sim - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_clusters_split_by_domain() {
        let instincts = vec![
            instinct("a", "when writing tests", "testing", 0.8),
            instinct("b", "when writing tests", "docs", 0.8),
        ];
        let clusters = cluster_instincts(&instincts, 0.3);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_similar_triggers_cluster_together() {
        let instincts = vec![
            instinct("a", "when writing unit tests", "testing", 0.8),
            instinct("b", "when writing integration tests", "testing", 0.7),
            instinct("c", "when deploying containers", "testing", 0.9),
        ];
        let clusters = cluster_instincts(&instincts, 0.3);
        assert_eq!(clusters.len(), 2);
        let big = clusters.iter().find(|c| c.instincts.len() == 2).unwrap();
        assert!((big.avg_confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_cluster_trigger_pattern_sorted_keywords() {
        let instincts = vec![
            instinct("a", "when writing tests", "testing", 0.8),
            instinct("b", "when writing checks", "testing", 0.8),
        ];
        let clusters = cluster_instincts(&instincts, 0.3);
        assert_eq!(clusters.len(), 1);
        // Up to 3 sorted keywords.
        assert_eq!(clusters[0].trigger_pattern, "checks tests writing");
    }

    #[test]
    fn test_skill_suggestion_thresholds() {
        let members = vec![
            instinct("a", "when writing tests", "testing", 0.75),
            instinct("b", "when writing tests", "testing", 0.8),
            instinct("c", "when writing tests", "testing", 0.7),
        ];
        let cluster = make_cluster("testing", members.clone());
        assert!((cluster.avg_confidence - 0.75).abs() < 1e-9);
        let suggestion = evaluate_cluster(&cluster).unwrap();
        assert_eq!(suggestion.kind, ArtifactKind::Skill);
        assert!(suggestion.description.contains("75% avg confidence"));

        // Low average blocks the skill.
        let weak = make_cluster(
            "testing",
            vec![
                instinct("a", "t", "testing", 0.5),
                instinct("b", "t", "testing", 0.4),
                instinct("c", "t", "testing", 0.5),
            ],
        );
        assert!(evaluate_cluster(&weak).is_none());

        // Small cluster blocks the skill regardless of confidence.
        let small = make_cluster("testing", members[..2].to_vec());
        assert!(evaluate_cluster(&small).is_none());
    }

    #[test]
    fn test_suggest_agent_for_multi_step() {
        let inst = workflow_instinct("w", 0.9, "1. build\n2. test\n3. deploy");
        let suggestion = suggest_for_instinct(&inst).unwrap();
        assert_eq!(suggestion.kind, ArtifactKind::Agent);
    }

    #[test]
    fn test_suggest_command_for_single_step() {
        let inst = workflow_instinct("w", 0.9, "run cargo fmt before committing");
        let suggestion = suggest_for_instinct(&inst).unwrap();
        assert_eq!(suggestion.kind, ArtifactKind::Command);
    }

    #[test]
    fn test_no_suggestion_below_confidence() {
        let inst = workflow_instinct("w", 0.8, "run the thing");
        assert!(suggest_for_instinct(&inst).is_none());
    }

    #[test]
    fn test_no_suggestion_for_non_workflow_source() {
        let inst = instinct("p", "when using Grep tool", "tool-usage", 0.9);
        assert!(suggest_for_instinct(&inst).is_none());
    }

    #[test]
    fn test_recommend_artifact_decision_order() {
        // Short workflow content: command.
        let short = workflow_instinct("w1", 0.9, "one\ntwo\nthree");
        assert_eq!(recommend_artifact(&short), ArtifactKind::Command);

        // Long workflow content: agent.
        let long_content = (0..12).map(|i| format!("step {i}")).collect::<Vec<_>>().join("\n");
        let long = workflow_instinct("w2", 0.9, &long_content);
        assert_eq!(recommend_artifact(&long), ArtifactKind::Agent);

        // Checklist markup: rule.
        let mut rule = instinct("r", "when reviewing", "review", 0.6);
        rule.content = "- [ ] check the types\n- [ ] check the tests".to_string();
        assert_eq!(recommend_artifact(&rule), ArtifactKind::Rule);

        // Table markup: rule.
        let mut table = instinct("t", "when mapping", "general", 0.6);
        table.content = "| col | col |\n| --- | --- |".to_string();
        assert_eq!(recommend_artifact(&table), ArtifactKind::Rule);

        // Heavy evidence: skill.
        let mut heavy = instinct("s", "when searching", "tool-usage", 0.6);
        heavy.evidence_count = 5;
        assert_eq!(recommend_artifact(&heavy), ArtifactKind::Skill);

        // Fallback: notes.
        let plain = instinct("n", "when searching", "tool-usage", 0.6);
        assert_eq!(recommend_artifact(&plain), ArtifactKind::Notes);
    }

    #[test]
    fn test_generate_skill_content() {
        let cluster = make_cluster(
            "testing",
            vec![
                instinct("a", "when writing tests", "testing", 0.8),
                instinct("b", "when writing tests", "testing", 0.7),
                instinct("c", "when writing tests", "testing", 0.75),
            ],
        );
        let content = generate_skill(&cluster);
        assert!(content.starts_with("# Testing Skill"));
        assert!(content.contains("Generated from 3 learned instincts"));
        assert!(content.contains("## When to Apply"));
        assert!(content.contains("- a (confidence: 80%)"));
    }

    #[test]
    fn test_generate_command_and_agent_content() {
        let inst = workflow_instinct("build-flow", 0.9, "1. build\n2. test");
        let command = generate_command(&inst);
        assert!(command.contains("## Usage"));
        assert!(command.contains("Source instinct: build-flow"));

        let agent = generate_agent(&inst);
        assert!(agent.contains("Agent"));
        assert!(agent.contains("## Workflow"));
        assert!(agent.contains("Evidence count: 3"));
    }

    #[test]
    fn test_generate_rule_content() {
        let mut inst = instinct("style-rule", "when reviewing diffs", "review", 0.6);
        inst.content = "- [ ] naming matches module conventions".to_string();
        let rule = generate_rule(&inst);
        assert!(rule.starts_with("# Rule: When Reviewing Diffs"));
        assert!(rule.contains("naming matches"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("good-name"), "good-name");
        assert_eq!(sanitize_filename("../../evil"), "evil");
        assert_eq!(sanitize_filename("has spaces!"), "has-spaces");
        assert_eq!(sanitize_filename("///"), "unnamed");
    }

    #[test]
    fn test_write_evolved_places_file() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::new(dir.path());
        let path = write_evolved(
            &paths,
            ArtifactKind::Command,
            Scope::Project,
            "build-flow",
            "content",
        )
        .unwrap();
        assert_eq!(
            path,
            dir.path().join(".claude/commands/build-flow-command.md")
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "content");
    }

    #[test]
    fn test_write_evolved_refuses_symlink() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::new(dir.path());
        let commands = dir.path().join(".claude/commands");
        fs::create_dir_all(&commands).unwrap();
        #[cfg(unix)]
        {
            let outside = dir.path().join("target.md");
            fs::write(&outside, "x").unwrap();
            std::os::unix::fs::symlink(&outside, commands.join("link-command.md")).unwrap();
            let err = write_evolved(&paths, ArtifactKind::Command, Scope::Project, "link", "c")
                .unwrap_err();
            assert!(matches!(err, InstinctError::SymlinkRefused { .. }));
        }
    }
}
