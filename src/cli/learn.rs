//! Learn command: run one analysis pass over the observation log.

use chrono::Utc;
use serde::Serialize;

use crate::analyze::{
    apply_decay_sweep, format_analysis_summary, run_analysis, AnalysisOptions, AnalysisResult,
};
use crate::config::{Config, Paths};
use crate::repo::InstinctRepository;
use crate::store::ObservationLog;
use crate::trigger::{acquire_lock, release_lock, save_state, AutoLearnState};

/// Options for the learn command.
#[derive(Debug, Clone, Default)]
pub struct LearnOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Detect patterns without writing records.
    pub dry_run: bool,
    /// Skip LLM analysis even when an API key is set.
    pub skip_oracle: bool,
    /// Apply confidence decay to existing records.
    pub decay: bool,
}

/// Output format for the learn command.
#[derive(Debug, Clone, Serialize)]
pub struct LearnOutput {
    pub success: bool,
    pub patterns_detected: usize,
    pub instincts_created: usize,
    pub instincts_updated: usize,
    pub instincts_decayed: usize,
    pub detection_sources: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LearnOutput {
    fn from_analysis(result: &AnalysisResult, decayed: usize) -> Self {
        Self {
            success: true,
            patterns_detected: result.patterns_detected,
            instincts_created: result.instincts_created,
            instincts_updated: result.instincts_updated,
            instincts_decayed: decayed,
            detection_sources: result.detection_sources.clone(),
            warnings: result.warnings.clone(),
            error: None,
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            patterns_detected: 0,
            instincts_created: 0,
            instincts_updated: 0,
            instincts_decayed: 0,
            detection_sources: Vec::new(),
            warnings: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The learn command implementation.
pub struct LearnCommand {
    paths: Paths,
    config: Config,
}

impl LearnCommand {
    pub fn new(paths: Paths, config: Config) -> Self {
        Self { paths, config }
    }

    pub fn run(&self, options: &LearnOptions) -> LearnOutput {
        // The lock keeps a background run and a manual run from
        // analyzing concurrently. Dry runs write nothing and skip it.
        let locked = if options.dry_run {
            false
        } else {
            match acquire_lock(&self.paths) {
                Ok(true) => true,
                Ok(false) => return LearnOutput::failure("another analysis is already running"),
                Err(e) => return LearnOutput::failure(e.to_string()),
            }
        };

        let output = self.run_locked(options);

        if locked {
            release_lock(&self.paths);
        }
        output
    }

    fn run_locked(&self, options: &LearnOptions) -> LearnOutput {
        let analysis_options = AnalysisOptions {
            dry_run: options.dry_run,
            skip_oracle: options.skip_oracle,
        };
        let result = match run_analysis(&self.paths, &self.config, &analysis_options) {
            Ok(result) => result,
            Err(e) => return LearnOutput::failure(e.to_string()),
        };

        let mut decayed_count = 0;
        if options.decay && !options.dry_run {
            let repository = InstinctRepository::new(self.paths.learned_dir());
            match apply_decay_sweep(&repository) {
                Ok(decayed) => decayed_count = decayed.len(),
                Err(e) => {
                    return LearnOutput::failure(format!("decay sweep failed: {e}"));
                }
            }
        }

        if !options.dry_run {
            let log = ObservationLog::new(
                self.paths.observations_file(),
                self.paths.archive_dir(),
                &self.config,
            );
            let state = AutoLearnState {
                last_analysis_time: Some(Utc::now()),
                observation_count_at_analysis: log.count() as u64,
            };
            if let Err(e) = save_state(&self.paths, &state) {
                tracing::warn!("failed to save auto-learn state: {e}");
            }
        }

        LearnOutput::from_analysis(&result, decayed_count)
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &LearnOutput, options: &LearnOptions) -> String {
        if options.quiet {
            return String::new();
        }
        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }
        if !output.success {
            return format!(
                "Learn failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let result = AnalysisResult {
            patterns_detected: output.patterns_detected,
            instincts_created: output.instincts_created,
            instincts_updated: output.instincts_updated,
            warnings: output.warnings.clone(),
            patterns: Vec::new(),
            detection_sources: output.detection_sources.clone(),
        };
        let mut summary = format_analysis_summary(&result);
        if output.instincts_decayed > 0 {
            summary.push_str(&format!(
                "  Decay applied to {} instincts.\n",
                output.instincts_decayed
            ));
        }
        summary
    }
}
