//! Rule extraction from free-text instructions and the capped rule merge.
//!
//! Normalization is a fixed sequence of anchored rewrites. The same input
//! always produces the same rule text, which keeps history fingerprints stable.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::text::{
    canonical_key, char_len, ensure_period, lowercase_first, normalize_ws, uppercase_first,
};
use crate::MAX_RULES;

pub const MIN_RULE_CHARS: usize = 8;
pub const MAX_RULE_CHARS: usize = 180;

/// Case-insensitive substrings that mark a sentence as rule-bearing.
pub const RULE_KEYWORDS: [&str; 10] = [
    "must",
    "should",
    "need",
    "needs",
    "want",
    "behavior",
    "app should",
    "always",
    "never",
    "after each change",
];

/// Leading words accepted as the imperative head of a rule.
pub const APPROVED_VERBS: [&str; 23] = [
    "Keep", "Update", "Create", "Use", "Run", "Skip", "Track", "Record", "Limit", "Read", "Write",
    "Ensure", "Maintain", "Always", "Never", "Avoid", "Prefer", "Add", "Remove", "Follow",
    "Check", "Verify", "Document",
];

const FALLBACK_VERB: &str = "Ensure";

struct RewritePolicy {
    filler: Regex,
    request_frame: Regex,
    subject_obligation: Regex,
    bare_obligation: Regex,
    approved_head: Regex,
}

impl RewritePolicy {
    fn compile() -> Option<Self> {
        Some(Self {
            filler: Regex::new(r"(?i)^(?:please|also|and|then|kindly)\s+").ok()?,
            request_frame: Regex::new(
                r"(?i)^(?:i|we)\s+(?:want|need|would\s+like)\s+(?:you\s+)?to\s+",
            )
            .ok()?,
            subject_obligation: Regex::new(
                r"(?i)^(?:this\s+skill|skill|it|docs\s+file|docs|this\s+file|auto\s+docs|this\s+app|the\s+app|app|you|we|the\s+agent|agents|agent|the\s+assistant|assistant)\s+(?:should|must|needs?\s+to|have\s+to|has\s+to)\s+",
            )
            .ok()?,
            bare_obligation: Regex::new(
                r"(?i)^(?:should|must|you\s+need\s+to|needs?\s+to|have\s+to)(?:\s+|$)",
            )
            .ok()?,
            approved_head: Regex::new(&format!(r"^(?:{})\b", APPROVED_VERBS.join("|"))).ok()?,
        })
    }
}

static POLICY: Lazy<Option<RewritePolicy>> = Lazy::new(RewritePolicy::compile);

fn strip_match<'a>(pattern: &Regex, value: &'a str) -> &'a str {
    pattern.find(value).map_or(value, |found| &value[found.end()..])
}

fn strip_prefix_ascii_ci<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &value[prefix.len()..])
}

/// Rewrite one rule-bearing sentence into imperative form.
///
/// Returns an empty string when nothing is left after stripping.
#[must_use]
pub fn to_imperative(text: &str) -> String {
    let Some(policy) = POLICY.as_ref() else {
        return String::new();
    };

    let normalized = normalize_ws(text);
    let mut sentence = normalized
        .trim_matches(|ch| matches!(ch, ' ' | '-' | '•' | '\t'))
        .trim_end_matches(|ch| matches!(ch, '.' | '!' | '?'));

    loop {
        let stripped = strip_match(&policy.filler, sentence);
        if stripped.len() == sentence.len() {
            break;
        }
        sentence = stripped;
    }
    sentence = strip_match(&policy.request_frame, sentence);
    sentence = strip_match(&policy.subject_obligation, sentence);
    sentence = strip_match(&policy.bare_obligation, sentence);

    let sentence = sentence.trim();
    if sentence.is_empty() {
        return String::new();
    }

    let mut sentence = uppercase_first(sentence);
    if let Some(rest) = strip_prefix_ascii_ci(&sentence, "be ") {
        sentence = format!("Keep docs {rest}");
    } else if let Some(rest) = strip_prefix_ascii_ci(&sentence, "have ") {
        sentence = format!("Use {rest}");
    } else if let Some(rest) = strip_prefix_ascii_ci(&sentence, "include ") {
        sentence = format!("Use {rest}");
    }

    if !policy.approved_head.is_match(&sentence) {
        sentence = format!("{FALLBACK_VERB} {}", lowercase_first(&sentence));
    }
    sentence
}

fn is_rule_bearing(segment: &str) -> bool {
    let lowered = segment.to_lowercase();
    RULE_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

/// Mine rule candidates from a user instruction message.
///
/// Candidates keep first-occurrence order and are unique by canonical key.
#[must_use]
pub fn extract_rules(message: &str) -> Vec<String> {
    if message.trim().is_empty() {
        return Vec::new();
    }

    let mut seen = BTreeSet::new();
    let mut rules = Vec::new();
    let segments = message
        .lines()
        .flat_map(|line| line.split(|ch| matches!(ch, '.' | '!' | '?' | ';')))
        .map(normalize_ws)
        .filter(|segment| !segment.is_empty() && is_rule_bearing(segment));

    for segment in segments {
        let rule = to_imperative(&segment);
        if !(MIN_RULE_CHARS..=MAX_RULE_CHARS).contains(&char_len(&rule)) {
            tracing::trace!(segment = %segment, "discarding rule candidate outside length bounds");
            continue;
        }
        let key = canonical_key(&rule);
        if !key.is_empty() && seen.insert(key) {
            rules.push(rule);
        }
    }
    rules
}

/// Merge existing rules with incoming candidates.
///
/// Existing rules win on key collisions and keep their positions; the result is
/// capped at [`MAX_RULES`] and every rule ends with a single period.
#[must_use]
pub fn merge_rules(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut merged = Vec::new();
    let mut seen = BTreeSet::new();

    for rule in existing.iter().chain(incoming) {
        let normalized = ensure_period(rule);
        if normalized.is_empty() {
            continue;
        }
        if !seen.insert(canonical_key(&normalized)) {
            continue;
        }
        merged.push(normalized);
        if merged.len() >= MAX_RULES {
            break;
        }
    }
    merged
}
