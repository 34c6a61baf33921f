//! Text primitives shared by every stage of the merge.

/// Collapse every whitespace run to a single space and trim both ends.
#[must_use]
pub fn normalize_ws(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Dedup key for a phrase: lowercased, with everything outside `[a-z0-9]` removed.
///
/// Two phrases that differ only in case, spacing or punctuation share a key.
#[must_use]
pub fn canonical_key(value: &str) -> String {
    value.to_lowercase().chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Normalize whitespace and end the sentence with exactly one period.
///
/// Returns an empty string when nothing but whitespace and periods remain.
#[must_use]
pub fn ensure_period(value: &str) -> String {
    let normalized = normalize_ws(value);
    let trimmed = normalized.trim_end_matches('.');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{trimmed}.")
}

pub(crate) fn uppercase_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn lowercase_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn char_len(value: &str) -> usize {
    value.chars().count()
}
