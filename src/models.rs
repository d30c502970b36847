//! Core data model: observations, evidence, patterns, and instincts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of any observation payload field, in characters.
pub const MAX_PAYLOAD_CHARS: usize = 5000;

/// Kind of event recorded in the observation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ToolStart,
    ToolComplete,
    UserMessage,
}

/// One line of the append-only observation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub event: EventKind,
    #[serde(default)]
    pub tool: String,
    #[serde(default = "default_session")]
    pub session: String,
    /// Serialized tool input (JSON text), truncated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Serialized tool output, truncated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// User message text, truncated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

fn default_session() -> String {
    "unknown".to_string()
}

impl Observation {
    pub fn new(event: EventKind, tool: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            tool: tool.into(),
            session: session.into(),
            input: None,
            output: None,
            content: None,
        }
    }

    /// Truncate every payload field to the storage limit.
    pub fn truncated(mut self) -> Self {
        self.input = self.input.map(|s| truncate_chars(&s, MAX_PAYLOAD_CHARS));
        self.output = self.output.map(|s| truncate_chars(&s, MAX_PAYLOAD_CHARS));
        self.content = self.content.map(|s| truncate_chars(&s, MAX_PAYLOAD_CHARS));
        self
    }
}

/// Truncate a string to at most `limit` characters on a char boundary.
pub fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Types of behavioral patterns the detectors can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    UserCorrection,
    ErrorResolution,
    RepeatedWorkflow,
    ToolPreference,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCorrection => "user_correction",
            Self::ErrorResolution => "error_resolution",
            Self::RepeatedWorkflow => "repeated_workflow",
            Self::ToolPreference => "tool_preference",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "user_correction" => Some(Self::UserCorrection),
            "error_resolution" => Some(Self::ErrorResolution),
            "repeated_workflow" => Some(Self::RepeatedWorkflow),
            "tool_preference" => Some(Self::ToolPreference),
            _ => None,
        }
    }
}

/// Where a pattern came from during dual-approach analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternSource {
    Algorithm,
    Llm,
    Merged,
}

impl PatternSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Algorithm => "algorithm",
            Self::Llm => "llm",
            Self::Merged => "merged",
        }
    }
}

/// One observed occurrence supporting a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub description: String,
    #[serde(default)]
    pub observation_ids: Vec<String>,
}

impl Evidence {
    pub fn new(
        timestamp: DateTime<Utc>,
        session_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            session_id: session_id.into(),
            description: description.into(),
            observation_ids: Vec::new(),
        }
    }
}

/// A detected behavioral pattern, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub pattern_type: PatternType,
    pub trigger: String,
    pub description: String,
    pub evidence: Vec<Evidence>,
    pub domain: String,
    /// Flat key/value metadata attached by detectors and the reconciler.
    pub metadata: Vec<(String, String)>,
}

impl Pattern {
    pub fn new(
        pattern_type: PatternType,
        trigger: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            pattern_type,
            trigger: trigger.into(),
            description: description.into(),
            evidence: Vec::new(),
            domain: "general".to_string(),
            metadata: Vec::new(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<Evidence>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Lifecycle status of a learned instinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstinctStatus {
    Active,
    Dormant,
}

impl InstinctStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dormant => "dormant",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "dormant" => Some(Self::Dormant),
            _ => None,
        }
    }
}

/// A learned instinct with confidence scoring.
///
/// Updates go through the copy constructors; callers never mutate a
/// persisted instinct in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Instinct {
    pub id: String,
    pub trigger: String,
    /// Confidence score between 0.1 and 0.95.
    pub confidence: f64,
    pub domain: String,
    /// How the instinct was created, e.g. "pattern-detection".
    pub source: String,
    pub evidence_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Markdown body below the frontmatter header.
    pub content: String,
    pub source_file: Option<String>,
    pub status: InstinctStatus,
    pub last_observed: Option<DateTime<Utc>>,
}

impl Instinct {
    /// A copy with new confidence and a refreshed updated_at.
    pub fn with_confidence(&self, new_confidence: f64) -> Self {
        Self {
            confidence: new_confidence,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// A copy with new status and a refreshed updated_at.
    pub fn with_status(&self, new_status: InstinctStatus) -> Self {
        Self {
            status: new_status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}
