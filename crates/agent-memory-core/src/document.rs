//! Document State plus its permissive parser and canonical renderer.
//!
//! The persisted form is plain markdown. Every section is located by its
//! literal heading line, and anything that does not match the expected
//! shape is dropped rather than reported.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::MAX_CHANGE_ENTRIES;

pub const DOCUMENT_TITLE: &str = "# AI Agent Rules & Change Memory";
pub const SNAPSHOT_SECTION: &str = "Project Snapshot";
pub const RULES_SECTION: &str = "Behavior Rules";
pub const HISTORY_SECTION: &str = "Recent Changes (Last 20)";
pub const LAST_UPDATED_SECTION: &str = "Last Updated";
pub const EMPTY_HISTORY_PLACEHOLDER: &str = "- No recorded changes yet.";

const SECTION_MARKER: &str = "## ";
const ENTRY_MARKER: &str = "### ";
const BULLET_MARKER: &str = "- ";

static FINGERPRINT_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"<!--\s*fingerprint:([a-f0-9]+)\s*-->").ok());

/// One historical record in the Recent Changes section.
///
/// Body lines are kept verbatim so hand-edited entries survive a rewrite
/// untouched; typed fields are recovered on demand.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ChangeEntry {
    pub timestamp: String,
    pub lines: Vec<String>,
}

impl ChangeEntry {
    /// Fingerprint marker value, or an empty string when the marker is missing.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        let Some(pattern) = FINGERPRINT_PATTERN.as_ref() else {
            return "";
        };
        self.lines
            .iter()
            .find_map(|line| pattern.captures(line))
            .and_then(|captures| captures.get(1))
            .map_or("", |value| value.as_str())
    }

    /// Value of a `- <label>: <value>` field line.
    #[must_use]
    pub fn field(&self, label: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            line.trim_start()
                .strip_prefix(BULLET_MARKER)
                .and_then(|rest| rest.strip_prefix(label))
                .and_then(|rest| rest.strip_prefix(':'))
                .map(str::trim)
        })
    }

    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.field("Summary")
    }

    #[must_use]
    pub fn changed_files(&self) -> Option<&str> {
        self.field("Changed files")
    }

    #[must_use]
    pub fn behavior_impact(&self) -> Option<&str> {
        self.field("Behavior impact")
    }
}

/// In-memory form of the persisted memory document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct DocumentState {
    pub snapshot: Vec<String>,
    pub rules: Vec<String>,
    pub entries: Vec<ChangeEntry>,
    pub last_updated: String,
}

/// Parse raw document text. Never fails; missing or malformed sections are empty.
#[must_use]
pub fn parse_document(content: &str) -> DocumentState {
    let last_updated = section_body(content, LAST_UPDATED_SECTION)
        .and_then(|body| parse_bullets(&body).into_iter().next())
        .unwrap_or_default();

    DocumentState {
        snapshot: section_body(content, SNAPSHOT_SECTION)
            .map(|body| parse_bullets(&body))
            .unwrap_or_default(),
        rules: section_body(content, RULES_SECTION)
            .map(|body| parse_bullets(&body))
            .unwrap_or_default(),
        entries: section_body(content, HISTORY_SECTION)
            .map(|body| parse_entries(&body))
            .unwrap_or_default(),
        last_updated,
    }
}

/// Lines between `## <name>` and the next `## ` heading; first occurrence wins.
fn section_body<'a>(content: &'a str, name: &str) -> Option<Vec<&'a str>> {
    let mut lines = content.lines();
    lines.by_ref().find(|line| heading_name(line) == Some(name))?;
    Some(lines.take_while(|line| !line.starts_with(SECTION_MARKER)).collect())
}

fn heading_name(line: &str) -> Option<&str> {
    line.strip_prefix(SECTION_MARKER).map(str::trim_end)
}

fn parse_bullets(body: &[&str]) -> Vec<String> {
    body.iter()
        .filter_map(|line| line.trim().strip_prefix(BULLET_MARKER))
        .map(|bullet| bullet.trim().to_string())
        .collect()
}

fn parse_entries(body: &[&str]) -> Vec<ChangeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<ChangeEntry> = None;

    for raw in body {
        let line = raw.trim_end();
        if let Some(timestamp) = line.strip_prefix(ENTRY_MARKER) {
            entries.extend(current.take().map(finish_entry));
            current = Some(ChangeEntry { timestamp: timestamp.to_string(), lines: Vec::new() });
            continue;
        }
        if let Some(entry) = current.as_mut() {
            entry.lines.push(line.to_string());
        }
    }
    entries.extend(current.map(finish_entry));
    entries
}

fn finish_entry(mut entry: ChangeEntry) -> ChangeEntry {
    while entry.lines.last().is_some_and(String::is_empty) {
        entry.lines.pop();
    }
    entry
}

/// Serialize a state into canonical document text. Total and deterministic.
#[must_use]
pub fn render_document(state: &DocumentState) -> String {
    let mut lines: Vec<String> = vec![DOCUMENT_TITLE.to_string(), String::new()];

    push_bullet_section(&mut lines, SNAPSHOT_SECTION, &state.snapshot);
    push_bullet_section(&mut lines, RULES_SECTION, &state.rules);

    lines.push(format!("{SECTION_MARKER}{HISTORY_SECTION}"));
    if state.entries.is_empty() {
        lines.push(EMPTY_HISTORY_PLACEHOLDER.to_string());
    }
    for (index, entry) in state.entries.iter().take(MAX_CHANGE_ENTRIES).enumerate() {
        if index > 0 {
            lines.push(String::new());
        }
        lines.push(format!("{ENTRY_MARKER}{}", entry.timestamp));
        lines.extend(entry.lines.iter().cloned());
    }
    lines.push(String::new());

    lines.push(format!("{SECTION_MARKER}{LAST_UPDATED_SECTION}"));
    lines.push(format!("{BULLET_MARKER}{}", state.last_updated));
    lines.push(String::new());

    lines.join("\n")
}

fn push_bullet_section(lines: &mut Vec<String>, name: &str, bullets: &[String]) {
    lines.push(format!("{SECTION_MARKER}{name}"));
    lines.extend(bullets.iter().map(|bullet| format!("{BULLET_MARKER}{bullet}")));
    lines.push(String::new());
}
