//! Status command: show all learned records grouped by domain.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{Config, Paths};
use crate::repo::InstinctRepository;
use crate::store::ObservationLog;

/// Options for the status command.
#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    pub id: String,
    pub trigger: String,
    pub confidence: f64,
    pub domain: String,
    pub status: String,
}

/// Output format for the status command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    pub success: bool,
    pub total: usize,
    pub records: Vec<StatusRecord>,
    pub observation_count: usize,
    pub learned_dir: String,
}

/// The status command implementation.
pub struct StatusCommand {
    paths: Paths,
    config: Config,
}

impl StatusCommand {
    pub fn new(paths: Paths, config: Config) -> Self {
        Self { paths, config }
    }

    pub fn run(&self, _options: &StatusOptions) -> StatusOutput {
        let repository = InstinctRepository::new(self.paths.learned_dir());
        let instincts = repository.load_all();

        let log = ObservationLog::new(
            self.paths.observations_file(),
            self.paths.archive_dir(),
            &self.config,
        );

        let records = instincts
            .iter()
            .map(|i| StatusRecord {
                id: i.id.clone(),
                trigger: i.trigger.clone(),
                confidence: i.confidence,
                domain: i.domain.clone(),
                status: i.status.as_str().to_string(),
            })
            .collect::<Vec<_>>();

        StatusOutput {
            success: true,
            total: records.len(),
            records,
            observation_count: log.count(),
            learned_dir: self.paths.learned_dir().display().to_string(),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &StatusOutput, options: &StatusOptions) -> String {
        if options.quiet {
            return String::new();
        }
        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            format_human_readable(output)
        }
    }
}

/// Ten-block confidence bar.
fn confidence_bar(confidence: f64) -> String {
    let filled = (confidence * 10.0) as usize;
    let filled = filled.min(10);
    format!("{}{}", "\u{2588}".repeat(filled), "\u{2591}".repeat(10 - filled))
}

fn format_human_readable(output: &StatusOutput) -> String {
    if output.records.is_empty() {
        return format!(
            "No instincts found.\n\nInstinct directory: {}\n",
            output.learned_dir
        );
    }

    let banner = "=".repeat(60);
    let mut lines = vec![
        String::new(),
        banner.clone(),
        format!("  INSTINCT STATUS - {} total", output.total),
        banner.clone(),
        String::new(),
    ];

    let mut by_domain: BTreeMap<&str, Vec<&StatusRecord>> = BTreeMap::new();
    for record in &output.records {
        by_domain.entry(&record.domain).or_default().push(record);
    }

    for (domain, mut records) in by_domain {
        lines.push(format!("## {} ({})", domain.to_uppercase(), records.len()));
        lines.push(String::new());
        records.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for record in records {
            lines.push(format!(
                "  {} {:3}%  {}",
                confidence_bar(record.confidence),
                (record.confidence * 100.0) as u32,
                record.id
            ));
            if !record.trigger.is_empty() {
                lines.push(format!("            trigger: {}", record.trigger));
            }
            lines.push(String::new());
        }
    }

    if output.observation_count > 0 {
        lines.push("-".repeat(60));
        lines.push(format!(
            "  Observations: {} events logged",
            output.observation_count
        ));
    }

    lines.push(String::new());
    lines.push(banner);
    lines.push(String::new());
    lines.join("\n")
}
