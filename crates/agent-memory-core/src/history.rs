//! Change-entry construction and the fingerprint-guarded history insert.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::document::ChangeEntry;
use crate::text::{canonical_key, ensure_period};
use crate::MAX_CHANGE_ENTRIES;

pub const CHANGED_FILES_PREVIEW: usize = 8;
pub const FINGERPRINT_LEN: usize = 12;

pub const BOOTSTRAP_SUMMARY: &str = "Bootstrapped docs from the current repository state.";
pub const CODE_CHANGE_SUMMARY: &str = "Captured code changes from this assistant turn.";
pub const BEHAVIOR_ONLY_SUMMARY: &str = "Captured behavior-only update from user instructions.";

/// Derived description of what an entry changed. Not stored separately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BehaviorImpact {
    RulesRefreshed { count: usize },
    CodeDelta,
    BehaviorOnly,
}

impl BehaviorImpact {
    /// New rules outrank file changes; neither means a behavior-only update.
    #[must_use]
    pub fn classify(new_rule_count: usize, changed_files: &[String]) -> Self {
        if new_rule_count > 0 {
            Self::RulesRefreshed { count: new_rule_count }
        } else if !changed_files.is_empty() {
            Self::CodeDelta
        } else {
            Self::BehaviorOnly
        }
    }

    #[must_use]
    pub fn sentence(self) -> String {
        match self {
            Self::RulesRefreshed { count } => {
                format!("Added or refreshed {count} behavior rule(s) from user instructions.")
            }
            Self::CodeDelta => "Recorded code-level deltas for future AI context.".to_string(),
            Self::BehaviorOnly => {
                "Recorded behavior-only updates for future AI context.".to_string()
            }
        }
    }
}

/// Caller summary with a trailing period, or a canned sentence when it is blank.
#[must_use]
pub fn normalize_summary(summary: &str, changed_files: &[String], bootstrapping: bool) -> String {
    let cleaned = ensure_period(summary);
    if !cleaned.is_empty() {
        return cleaned;
    }
    if bootstrapping {
        BOOTSTRAP_SUMMARY.to_string()
    } else if !changed_files.is_empty() {
        CODE_CHANGE_SUMMARY.to_string()
    } else {
        BEHAVIOR_ONLY_SUMMARY.to_string()
    }
}

/// Short digest over the defining inputs of an entry.
///
/// Files and rule keys are sorted sets, so call order and duplicates do not
/// change the result.
#[must_use]
pub fn make_fingerprint(changed_files: &[String], summary: &str, new_rules: &[String]) -> String {
    let files = changed_files.iter().map(String::as_str).collect::<BTreeSet<_>>();
    let rule_keys = new_rules.iter().map(|rule| canonical_key(rule)).collect::<BTreeSet<_>>();

    let payload = format!(
        "{}||{}||{}",
        files.into_iter().collect::<Vec<_>>().join("|"),
        summary,
        rule_keys.into_iter().collect::<Vec<_>>().join("|"),
    );

    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    let mut digest_hex = hex::encode(hasher.finalize());
    digest_hex.truncate(FINGERPRINT_LEN);
    digest_hex
}

/// Backticked preview of the first few paths, the rest as a count.
#[must_use]
pub fn summarize_changed_files(files: &[String]) -> String {
    if files.is_empty() {
        return "none".to_string();
    }
    let mut preview = files
        .iter()
        .take(CHANGED_FILES_PREVIEW)
        .map(|file| format!("`{file}`"))
        .collect::<Vec<_>>()
        .join(", ");
    if files.len() > CHANGED_FILES_PREVIEW {
        preview.push_str(&format!(", +{} more", files.len() - CHANGED_FILES_PREVIEW));
    }
    preview
}

/// Inputs that define one candidate history entry.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ChangeRecord {
    pub changed_files: Vec<String>,
    pub summary: String,
    pub impact: BehaviorImpact,
    pub fingerprint: String,
}

impl ChangeRecord {
    #[must_use]
    pub fn new(changed_files: &[String], summary: String, new_rules: &[String]) -> Self {
        let fingerprint = make_fingerprint(changed_files, &summary, new_rules);
        Self {
            changed_files: changed_files.to_vec(),
            impact: BehaviorImpact::classify(new_rules.len(), changed_files),
            summary,
            fingerprint,
        }
    }

    #[must_use]
    pub fn to_entry(&self, timestamp: &str) -> ChangeEntry {
        ChangeEntry {
            timestamp: timestamp.to_string(),
            lines: vec![
                format!("- Changed files: {}", summarize_changed_files(&self.changed_files)),
                format!("- Summary: {}", self.summary),
                format!("- Behavior impact: {}", self.impact.sentence()),
                format!("<!-- fingerprint:{} -->", self.fingerprint),
            ],
        }
    }
}

/// Prepend the record unless its fingerprint is already in history, then cap.
///
/// Returns the new history and whether an entry was inserted.
#[must_use]
pub fn record_change(
    entries: &[ChangeEntry],
    record: &ChangeRecord,
    timestamp: &str,
) -> (Vec<ChangeEntry>, bool) {
    let already_recorded = record.fingerprint.is_empty()
        || entries.iter().any(|entry| entry.fingerprint() == record.fingerprint);

    let mut updated = Vec::with_capacity(entries.len() + 1);
    if !already_recorded {
        updated.push(record.to_entry(timestamp));
    }
    updated.extend(entries.iter().cloned());
    updated.truncate(MAX_CHANGE_ENTRIES);
    (updated, !already_recorded)
}
