//! CLAUDE.md integration: parse sections, generate a Learned Patterns
//! section from records, and insert it without duplicating bullets.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::LEARNED_PATTERNS_SECTION;
use crate::error::{InstinctError, Result};
use crate::models::Instinct;

/// A heading-delimited section of a CLAUDE.md file.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaudeMdSection {
    pub title: String,
    pub level: usize,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("static regex"))
}

/// Parse a CLAUDE.md file into sections. Missing or unreadable files
/// parse as empty.
pub fn parse_claude_md(path: &Path) -> Vec<ClaudeMdSection> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };
    parse_sections(&content)
}

fn parse_sections(content: &str) -> Vec<ClaudeMdSection> {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut sections = Vec::new();
    let mut current: Option<(String, usize, usize)> = None;
    let mut body: Vec<&str> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if let Some(captures) = heading_regex().captures(line) {
            if let Some((title, level, start)) = current.take() {
                sections.push(ClaudeMdSection {
                    title,
                    level,
                    content: body.join("\n").trim().to_string(),
                    start_line: start,
                    end_line: i - 1,
                });
            }
            let level = captures.get(1).map(|m| m.as_str().len()).unwrap_or(1);
            let title = captures
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            current = Some((title, level, i));
            body.clear();
        } else if current.is_some() {
            body.push(line);
        }
    }

    if let Some((title, level, start)) = current {
        sections.push(ClaudeMdSection {
            title,
            level,
            content: body.join("\n").trim().to_string(),
            start_line: start,
            end_line: lines.len() - 1,
        });
    }
    sections
}

pub fn find_learned_patterns_section(sections: &[ClaudeMdSection]) -> Option<&ClaudeMdSection> {
    sections.iter().find(|s| s.title == "Learned Patterns")
}

/// "code-style" becomes "Code Style".
fn capitalize_domain(domain: &str) -> String {
    domain
        .replace('-', " ")
        .split_whitespace()
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

/// One bullet per record, grouped under domain subsections.
///
/// The bullet text is the first substantive content line, falling back
/// to the trigger.
pub fn generate_patterns_content(instincts: &[Instinct]) -> String {
    let mut by_domain: BTreeMap<&str, Vec<&Instinct>> = BTreeMap::new();
    for instinct in instincts {
        by_domain.entry(&instinct.domain).or_default().push(instinct);
    }

    let mut lines: Vec<String> = Vec::new();
    for (domain, domain_instincts) in by_domain {
        lines.push(format!("### {}", capitalize_domain(domain)));
        lines.push(String::new());
        for instinct in domain_instincts {
            let description = instinct
                .content
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty() && !l.starts_with('#'))
                .unwrap_or(&instinct.trigger);
            lines.push(format!("- {description}"));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Compute the updated CLAUDE.md content with the patterns inserted.
///
/// Appends inside an existing Learned Patterns section, skipping any
/// bullet whose text already appears anywhere in the file. Without an
/// existing section, appends one at the end. Running twice with the
/// same records is a no-op the second time.
pub fn insert_patterns(path: &Path, new_content: &str) -> String {
    let original = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            return format!("# CLAUDE.md\n\n{LEARNED_PATTERNS_SECTION}\n\n{new_content}");
        }
    };

    let sections = parse_sections(&original);
    let learned = match find_learned_patterns_section(&sections) {
        Some(section) => section.clone(),
        None => {
            let mut base = original;
            if !base.ends_with('\n') {
                base.push('\n');
            }
            return format!("{base}\n{LEARNED_PATTERNS_SECTION}\n\n{new_content}");
        }
    };

    let mut filtered: Vec<&str> = Vec::new();
    for line in new_content.split('\n') {
        let stripped = line.trim();
        if let Some(bullet) = stripped.strip_prefix("- ") {
            let bullet = bullet.trim();
            if !bullet.is_empty() && original.contains(bullet) {
                continue;
            }
        }
        filtered.push(line);
    }

    if !filtered.iter().any(|l| l.trim().starts_with("- ")) {
        return original;
    }

    let lines: Vec<&str> = original.split('\n').collect();
    let insert_at = (learned.end_line + 1).min(lines.len());
    let mut result: Vec<&str> = Vec::with_capacity(lines.len() + filtered.len());
    result.extend(&lines[..insert_at]);
    result.extend(&filtered);
    result.extend(&lines[insert_at..]);
    result.join("\n")
}

/// Write via temp file and rename so a crash never truncates the file.
pub fn write_claude_md(path: &Path, content: &str) -> Result<()> {
    let directory = path
        .parent()
        .ok_or_else(|| InstinctError::config("CLAUDE.md path has no parent directory"))?;
    fs::create_dir_all(directory).map_err(|e| InstinctError::storage(directory, e))?;

    let temp_path = directory.join(format!(".claude_md.{}.tmp", std::process::id()));
    fs::write(&temp_path, content).map_err(|e| InstinctError::storage(&temp_path, e))?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(InstinctError::storage(path, e));
    }
    Ok(())
}
