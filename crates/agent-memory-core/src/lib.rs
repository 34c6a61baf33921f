//! Merge engine for a persistent agent memory document.
//!
//! One invocation parses the existing markdown (or bootstraps a fresh one),
//! folds in newly mined behavior rules and a fingerprinted history entry, and
//! decides whether anything changed enough to warrant a rewrite. Repeating an
//! invocation with the same inputs never produces a second write.

pub mod document;
pub mod engine;
pub mod history;
pub mod rules;
pub mod text;

pub use document::{parse_document, render_document, ChangeEntry, DocumentState};
pub use engine::{
    decide, format_timestamp, merge_document, Decision, MergeReport, MergeRequest, SkipReason,
};
pub use history::{
    make_fingerprint, normalize_summary, record_change, summarize_changed_files, BehaviorImpact,
    ChangeRecord,
};
pub use rules::{extract_rules, merge_rules, to_imperative};
pub use text::{canonical_key, normalize_ws};

pub const MAX_RULES: usize = 15;
pub const MAX_CHANGE_ENTRIES: usize = 20;

/// Rules seeded into a freshly bootstrapped document.
pub const DEFAULT_RULES: [&str; 5] = [
    "Keep this file concise and clear for AI agents.",
    "Update this file after assistant turns that edit repo-tracked files.",
    "Capture new user behavior instructions as short imperative rules.",
    "Skip updates when there are no file edits and no new behavior instructions.",
    "Retain only the latest 20 change entries.",
];

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum MemoryDocError {
    #[error("timestamp error: {0}")]
    Timestamp(String),
}

#[must_use]
pub fn default_rules() -> Vec<String> {
    DEFAULT_RULES.iter().map(ToString::to_string).collect()
}
