//! Tag text normalization.
//!
//! Editors type tags as free text. The same normalization is used when
//! comparing against the original snapshot and when building the list sent to
//! the service, so a value that round-trips never shows up as a change.
//! Order is significant and duplicates are kept as typed.

/// Separator used for the canonical joined form.
pub const JOIN_SEPARATOR: &str = ", ";

/// Splits raw text on commas, trimming each fragment and dropping empty ones.
/// Whitespace runs inside a tag collapse to one space, so `"new   york"` and
/// `"new york"` are the same tag.
pub fn normalize(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|fragment| fragment.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|fragment| !fragment.is_empty())
        .collect()
}

/// Canonical comma-joined form of an already split list.
pub fn join(tags: &[String]) -> String {
    tags.join(JOIN_SEPARATOR)
}

/// Canonical form of raw tag text.
pub fn canonical(raw: &str) -> String {
    join(&normalize(raw))
}

/// Appends `additions` to `existing`, skipping anything already present.
/// Earlier occurrences win, so the existing order is preserved.
pub fn merge_unique(existing: &[String], additions: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + additions.len());
    for tag in existing.iter().chain(additions) {
        if !merged.contains(tag) {
            merged.push(tag.clone());
        }
    }
    merged
}
