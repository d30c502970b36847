//! LLM-assisted pattern detection via the Anthropic messages API.
//!
//! The oracle is strictly optional. Without an API key, or on any
//! expected API failure, detection degrades to the empty list and the
//! algorithmic detectors carry the pass alone.

use std::env;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{Evidence, Pattern, PatternType};

const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

const MAX_OBSERVATIONS_IN_PROMPT: usize = 100;
const MAX_EXISTING_IN_PROMPT: usize = 20;
const MAX_TOKENS: u32 = 2000;
const TIMEOUT_SECS: u64 = 30;

/// Session id stamped on oracle-sourced evidence.
const ORACLE_SESSION_ID: &str = "llm-analysis";

/// Failure classes of an oracle call.
///
/// Expected failures (everything except `Other`) degrade to an empty
/// pattern list; `Other` propagates so real bugs stay visible.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle authentication failed")]
    Auth,
    #[error("oracle rate limited")]
    RateLimit,
    #[error("oracle connection failed: {0}")]
    Connection(String),
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle error: {0}")]
    Other(String),
}

/// A short view of an existing record, given to the oracle as context so
/// it avoids re-reporting known patterns.
#[derive(Debug, Clone)]
pub struct RecordSummary {
    pub id: String,
    pub trigger: String,
}

pub struct OracleClient {
    model: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct PatternsEnvelope {
    #[serde(default)]
    patterns: Vec<serde_json::Value>,
}

impl OracleClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    /// True when an API key is present and non-empty.
    pub fn is_available() -> bool {
        env::var(API_KEY_ENV).map(|k| !k.is_empty()).unwrap_or(false)
    }

    /// Run oracle detection over serialized observations.
    ///
    /// Expected failures return an empty list; unexpected ones propagate
    /// as `OracleError::Other`.
    pub fn detect_patterns(
        &self,
        observations: &[serde_json::Value],
        existing: &[RecordSummary],
    ) -> Result<Vec<Pattern>, OracleError> {
        if observations.is_empty() {
            return Ok(Vec::new());
        }
        let response_text = match self.call_api(observations, existing) {
            Ok(text) => text,
            Err(err @ OracleError::Other(_)) => return Err(err),
            Err(err) => {
                tracing::warn!("oracle call failed: {err}");
                return Ok(Vec::new());
            }
        };
        Ok(parse_response(&response_text))
    }

    fn call_api(
        &self,
        observations: &[serde_json::Value],
        existing: &[RecordSummary],
    ) -> Result<String, OracleError> {
        let api_key = match env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => key,
            _ => return Err(OracleError::Unavailable("no API key".to_string())),
        };

        let prompt = build_prompt(observations, existing);
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        });

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| OracleError::Other(e.to_string()))?;

        let response = client
            .post(API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    OracleError::Connection(e.to_string())
                } else {
                    OracleError::Other(e.to_string())
                }
            })?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => {}
            401 | 403 => return Err(OracleError::Auth),
            429 => return Err(OracleError::RateLimit),
            500..=599 => return Err(OracleError::Unavailable(status.to_string())),
            _ => return Err(OracleError::Other(format!("status {status}"))),
        }

        let parsed: ApiResponse = response
            .json()
            .map_err(|e| OracleError::Other(e.to_string()))?;
        Ok(parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default())
    }
}

fn build_prompt(observations: &[serde_json::Value], existing: &[RecordSummary]) -> String {
    let start = observations.len().saturating_sub(MAX_OBSERVATIONS_IN_PROMPT);
    let recent = &observations[start..];
    let observations_json =
        serde_json::to_string_pretty(recent).unwrap_or_else(|_| "[]".to_string());

    let existing_summary = if existing.is_empty() {
        "None yet.".to_string()
    } else {
        existing
            .iter()
            .take(MAX_EXISTING_IN_PROMPT)
            .map(|r| format!("- {}: {}", r.id, r.trigger))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Analyze the following tool usage observations and identify behavioral patterns.\n\n\
        ## Existing Instincts (avoid duplicates)\n{existing_summary}\n\n\
        ## Recent Observations\n{observations_json}\n\n\
        ## Instructions\n\
        Identify patterns in the observations. Look for:\n\
        1. User corrections (Write followed by Edit, correction keywords)\n\
        2. Error resolutions (errors followed by successful fixes)\n\
        3. Repeated workflows (same tool sequences across sessions)\n\
        4. Tool preferences (consistent tool usage patterns)\n\n\
        Return a JSON object with a \"patterns\" array. Each pattern should have:\n\
        - pattern_type: one of \"user_correction\", \"error_resolution\", \"repeated_workflow\", \"tool_preference\"\n\
        - trigger: when this pattern applies (e.g., \"when editing files\")\n\
        - description: what the pattern is\n\
        - domain: category (e.g., \"code-style\", \"workflow\", \"error-handling\")\n\n\
        Only include patterns that are NOT already captured by existing instincts.\n\
        If no new patterns found, return {{\"patterns\": []}}.\n\n\
        Return ONLY valid JSON, no markdown formatting."
    )
}

/// Parse the response body; malformed JSON or a non-array patterns field
/// yields the empty list, individually bad entries are dropped.
fn parse_response(text: &str) -> Vec<Pattern> {
    let envelope: PatternsEnvelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!("failed to parse oracle JSON response: {e}");
            return Vec::new();
        }
    };
    envelope
        .patterns
        .iter()
        .filter_map(parse_entry)
        .collect()
}

fn parse_entry(entry: &serde_json::Value) -> Option<Pattern> {
    let pattern_type = PatternType::from_str_opt(entry.get("pattern_type")?.as_str()?)?;
    let trigger = entry.get("trigger")?.as_str()?;
    let description = entry.get("description")?.as_str()?;
    if trigger.is_empty() || description.is_empty() {
        return None;
    }
    let domain = entry
        .get("domain")
        .and_then(|d| d.as_str())
        .unwrap_or("general");

    let evidence = Evidence::new(Utc::now(), ORACLE_SESSION_ID, "Detected by LLM analysis");
    Some(
        Pattern::new(pattern_type, trigger, description)
            .with_domain(domain)
            .with_evidence(vec![evidence])
            .with_meta("source", "llm"),
    )
}
