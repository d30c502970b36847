//! The learned-record repository: one markdown file per instinct under
//! `learned/`, with a quoted-string frontmatter header.
//!
//! Writes are path-safe. Ids are sanitized to a flat kebab slug, symlink
//! targets are refused outright, and the resolved path must stay a direct
//! child of the repository directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::confidence::initial_confidence;
use crate::error::{InstinctError, Result};
use crate::models::{Instinct, InstinctStatus, Pattern};
use crate::store::create_private_dir;

/// Evidence lines rendered into record content before eliding.
const MAX_EVIDENCE_DISPLAY: usize = 5;

pub struct InstinctRepository {
    directory: PathBuf,
}

impl InstinctRepository {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write an instinct to `<dir>/<sanitized id>.md`, returning the path.
    pub fn write(&self, instinct: &Instinct) -> Result<PathBuf> {
        create_private_dir(&self.directory)?;

        let safe_id = sanitize_id(&instinct.id);
        let file_path = self.directory.join(format!("{safe_id}.md"));

        // Symlink check comes before canonicalization, which would follow it.
        if file_path.is_symlink() {
            return Err(InstinctError::SymlinkRefused { path: file_path });
        }

        let resolved_dir = self
            .directory
            .canonicalize()
            .map_err(|e| InstinctError::storage(&self.directory, e))?;
        let resolved = match file_path.parent() {
            Some(parent) => parent
                .canonicalize()
                .map_err(|e| InstinctError::storage(parent, e))?,
            None => {
                return Err(InstinctError::PathTraversal {
                    id: instinct.id.clone(),
                })
            }
        };
        if resolved != resolved_dir {
            return Err(InstinctError::PathTraversal {
                id: instinct.id.clone(),
            });
        }

        let content = render(instinct);
        fs::write(&file_path, content).map_err(|e| InstinctError::storage(&file_path, e))?;
        Ok(file_path)
    }

    /// Load every parsable `*.md` record, skipping symlinks and bad files
    /// with a warning.
    pub fn load_all(&self) -> Vec<Instinct> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut instincts = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            if path.is_symlink() {
                tracing::warn!("skipping symlink: {}", path.display());
                continue;
            }
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("failed to read record {}: {}", path.display(), e);
                    continue;
                }
            };
            match parse(&content, &path.to_string_lossy()) {
                Some(instinct) => instincts.push(instinct),
                None => tracing::warn!("failed to parse record {}", path.display()),
            }
        }
        // Deterministic order regardless of directory iteration.
        instincts.sort_by(|a, b| a.id.cmp(&b.id));
        instincts
    }
}

/// Build a new instinct from a detected pattern.
pub fn instinct_from_pattern(pattern: &Pattern) -> Instinct {
    let now = Utc::now();
    let evidence_count = pattern.evidence.len();
    Instinct {
        id: generate_id(pattern),
        trigger: pattern.trigger.clone(),
        confidence: initial_confidence(evidence_count),
        domain: pattern.domain.clone(),
        source: pattern.pattern_type.as_str().to_string(),
        evidence_count,
        created_at: now,
        updated_at: now,
        content: render_content(pattern),
        source_file: None,
        status: InstinctStatus::Active,
        last_observed: None,
    }
}

/// Kebab-case id from the pattern type and the first four words of the
/// trigger.
fn generate_id(pattern: &Pattern) -> String {
    let base = format!("{}-{}", pattern.pattern_type.as_str(), pattern.trigger);
    let normalized: String = base
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect();
    normalized
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join("-")
}

fn render_content(pattern: &Pattern) -> String {
    let mut lines = vec![
        format!("# {}", pattern.description),
        String::new(),
        "## Action".to_string(),
        String::new(),
        pattern.description.clone(),
        String::new(),
        "## Evidence".to_string(),
        String::new(),
    ];
    for evidence in pattern.evidence.iter().take(MAX_EVIDENCE_DISPLAY) {
        lines.push(format!(
            "- {} (session: {})",
            evidence.description, evidence.session_id
        ));
    }
    if pattern.evidence.len() > MAX_EVIDENCE_DISPLAY {
        lines.push(format!(
            "- ... and {} more observations",
            pattern.evidence.len() - MAX_EVIDENCE_DISPLAY
        ));
    }
    lines.join("\n")
}

/// Flatten an id to a safe filename: basename only, unsafe characters
/// replaced with dashes, dashes collapsed and trimmed.
pub fn sanitize_id(id: &str) -> String {
    static DASHES: OnceLock<Regex> = OnceLock::new();
    let dashes = DASHES.get_or_init(|| Regex::new(r"-+").expect("static regex"));

    let basename = id
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(id);
    let replaced: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let collapsed = dashes.replace_all(&replaced, "-");
    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed-instinct".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Escape a string for the double-quoted header context. Backslashes
/// first, so later escapes are not double-escaped.
fn escape_header(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn unescape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn render(instinct: &Instinct) -> String {
    let last_observed = instinct
        .last_observed
        .map(|ts| format!("last_observed: \"{}\"\n", ts.to_rfc3339()))
        .unwrap_or_default();
    format!(
        "---\n\
        id: \"{}\"\n\
        trigger: \"{}\"\n\
        confidence: {}\n\
        domain: \"{}\"\n\
        source: \"{}\"\n\
        evidence_count: {}\n\
        created_at: \"{}\"\n\
        updated_at: \"{}\"\n\
        status: \"{}\"\n\
        {}---\n\n\
        {}\n",
        escape_header(&instinct.id),
        escape_header(&instinct.trigger),
        instinct.confidence,
        escape_header(&instinct.domain),
        escape_header(&instinct.source),
        instinct.evidence_count,
        instinct.created_at.to_rfc3339(),
        instinct.updated_at.to_rfc3339(),
        instinct.status.as_str(),
        last_observed,
        instinct.content
    )
}

/// Remove exactly one surrounding quote pair. Escaped quotes inside the
/// value must survive, so this never trims repeatedly.
fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Parse a record file. Returns None when the header is missing or has
/// no id.
///
/// The frontmatter fences are whole `---` lines; a `---` inside a quoted
/// field value or the body is plain text.
pub fn parse(content: &str, source_file: &str) -> Option<Instinct> {
    if content.trim().is_empty() {
        return None;
    }
    let mut lines = content.lines();
    if lines.next()?.trim_end() != "---" {
        return None;
    }
    let mut header_lines = Vec::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim_end() == "---" {
            closed = true;
            break;
        }
        header_lines.push(line);
    }
    if !closed {
        return None;
    }
    let body = lines.collect::<Vec<_>>().join("\n");

    let mut id = None;
    let mut trigger = String::new();
    let mut confidence = 0.5;
    let mut domain = "general".to_string();
    let mut source = "unknown".to_string();
    let mut evidence_count = 1usize;
    let mut created_at = Utc::now();
    let mut updated_at = Utc::now();
    let mut status = InstinctStatus::Active;
    let mut last_observed = None;

    for line in header_lines {
        let Some((key, raw_value)) = line.split_once(':') else {
            continue;
        };
        let value = strip_quotes(raw_value.trim());
        match key.trim() {
            "id" => id = Some(unescape_header(value)),
            "trigger" => trigger = unescape_header(value),
            "confidence" => confidence = value.parse().unwrap_or(0.5),
            "domain" => domain = unescape_header(value),
            "source" => source = unescape_header(value),
            "evidence_count" => evidence_count = value.parse().unwrap_or(1),
            "created_at" => created_at = parse_timestamp(value).unwrap_or_else(Utc::now),
            "updated_at" => updated_at = parse_timestamp(value).unwrap_or_else(Utc::now),
            "status" => status = InstinctStatus::from_str_opt(value).unwrap_or(InstinctStatus::Active),
            "last_observed" => last_observed = parse_timestamp(value),
            _ => {}
        }
    }

    Some(Instinct {
        id: id?,
        trigger,
        confidence,
        domain,
        source,
        evidence_count,
        created_at,
        updated_at,
        content: body.trim().to_string(),
        source_file: Some(source_file.to_string()),
        status,
        last_observed,
    })
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
