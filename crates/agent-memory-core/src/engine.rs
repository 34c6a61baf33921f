//! Read-modify-decide: the single merge entry point and the write decision.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::document::{parse_document, render_document, DocumentState};
use crate::history::{normalize_summary, record_change, ChangeRecord};
use crate::rules::{extract_rules, merge_rules};
use crate::{default_rules, MemoryDocError};

/// Inputs of one invocation.
#[derive(Debug, Clone)]
pub struct MergeRequest<'a> {
    /// Current document text; `None` means no document exists yet.
    pub existing: Option<&'a str>,
    pub snapshot: Vec<String>,
    pub changed_files: Vec<String>,
    pub summary: &'a str,
    pub message: &'a str,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Document exists and the call brought no changed files and no rules.
    NothingToRecord,
    /// Everything recomputed equals what was parsed.
    UpToDate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    Bootstrap,
    Rewrite { snapshot_changed: bool, rules_changed: bool, entries_changed: bool },
    Skip { reason: SkipReason },
}

impl Decision {
    #[must_use]
    pub fn requires_write(self) -> bool {
        !matches!(self, Self::Skip { .. })
    }
}

/// Outcome of [`merge_document`].
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MergeReport {
    pub decision: Decision,
    /// State that is (or would remain) persisted after this invocation.
    pub state: DocumentState,
    pub new_rules: Vec<String>,
    /// Fingerprint of the candidate entry; absent when the call was gated early.
    pub fingerprint: Option<String>,
    pub entry_added: bool,
    /// Canonical text to persist, present only when a write is required.
    pub rendered: Option<String>,
}

/// Compare a freshly computed state against what was parsed.
///
/// All three sequences compare order-sensitively; `last_updated` is ignored.
#[must_use]
pub fn decide(previous: Option<&DocumentState>, candidate: &DocumentState) -> Decision {
    let Some(previous) = previous else {
        return Decision::Bootstrap;
    };

    let snapshot_changed = candidate.snapshot != previous.snapshot;
    let rules_changed = candidate.rules != previous.rules;
    let entries_changed = candidate.entries != previous.entries;
    if snapshot_changed || rules_changed || entries_changed {
        Decision::Rewrite { snapshot_changed, rules_changed, entries_changed }
    } else {
        Decision::Skip { reason: SkipReason::UpToDate }
    }
}

/// RFC 3339 timestamp with second precision and the offset of `now`.
///
/// # Errors
/// Returns [`MemoryDocError::Timestamp`] when `now` cannot be represented.
pub fn format_timestamp(now: OffsetDateTime) -> Result<String, MemoryDocError> {
    now.replace_nanosecond(0)
        .map_err(|err| MemoryDocError::Timestamp(err.to_string()))?
        .format(&Rfc3339)
        .map_err(|err| MemoryDocError::Timestamp(err.to_string()))
}

/// Merge one invocation's inputs into the memory document.
///
/// # Errors
/// Returns [`MemoryDocError::Timestamp`] when the entry timestamp cannot be formatted.
pub fn merge_document(request: MergeRequest<'_>) -> Result<MergeReport, MemoryDocError> {
    let MergeRequest { existing, snapshot, changed_files, summary, message, now } = request;
    let previous = existing.map(parse_document);
    let new_rules = extract_rules(message);

    if let Some(previous) = previous.as_ref() {
        if changed_files.is_empty() && new_rules.is_empty() {
            tracing::debug!("no changed files and no new rules; skipping merge");
            return Ok(MergeReport {
                decision: Decision::Skip { reason: SkipReason::NothingToRecord },
                state: previous.clone(),
                new_rules,
                fingerprint: None,
                entry_added: false,
                rendered: None,
            });
        }
    }

    let bootstrapping = previous.is_none();
    let base_rules = previous.as_ref().map_or_else(default_rules, |state| state.rules.clone());
    let rules = merge_rules(&base_rules, &new_rules);

    let summary = normalize_summary(summary, &changed_files, bootstrapping);
    let record = ChangeRecord::new(&changed_files, summary, &new_rules);
    let timestamp = format_timestamp(now)?;
    let previous_entries = previous.as_ref().map_or(&[][..], |state| state.entries.as_slice());
    let (entries, entry_added) = record_change(previous_entries, &record, &timestamp);
    if !entry_added {
        tracing::debug!(fingerprint = %record.fingerprint, "history already holds this change");
    }

    let mut state = DocumentState {
        snapshot,
        rules,
        entries,
        last_updated: previous.as_ref().map(|state| state.last_updated.clone()).unwrap_or_default(),
    };
    let decision = decide(previous.as_ref(), &state);
    tracing::debug!(?decision, entry_added, new_rules = new_rules.len(), "merge decided");

    let rendered = if decision.requires_write() {
        state.last_updated = timestamp;
        Some(render_document(&state))
    } else {
        None
    };

    Ok(MergeReport {
        decision,
        state,
        new_rules,
        fingerprint: Some(record.fingerprint),
        entry_added,
        rendered,
    })
}
