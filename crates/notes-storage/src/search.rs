//! Search and ordering rules shared by all adapters.
//!
//! Engines disagree on collation, case folding and tie ordering, so every
//! adapter narrows candidates natively and then runs the result through these
//! functions. That keeps `search`, `list_recent` and `upcoming` identical
//! across backends.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use notes_core::types::{Note, SearchScope};

/// Normalize a raw query. `None` means the query is blank and must match
/// nothing.
pub fn normalize_query(query: &str) -> Option<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Whether `note` matches an already-normalized needle within `scope`.
pub fn matches(note: &Note, needle: &str, scope: SearchScope) -> bool {
    (scope.includes_title() && note.title.to_lowercase().contains(needle))
        || (scope.includes_content() && note.content.to_lowercase().contains(needle))
}

/// Newest first; equal timestamps fall back to ascending id.
pub fn newest_first(a: &Note, b: &Note) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Soonest due first; equal due times fall back to ascending id.
pub fn soonest_due_first(a: &Note, b: &Note) -> Ordering {
    a.due_at.cmp(&b.due_at).then_with(|| a.id.cmp(&b.id))
}

/// Filter candidates by the needle and sort them newest first.
pub fn finish_search(candidates: Vec<Note>, needle: &str, scope: SearchScope) -> Vec<Note> {
    let mut hits: Vec<Note> = candidates
        .into_iter()
        .filter(|n| matches(n, needle, scope))
        .collect();
    hits.sort_by(newest_first);
    hits
}

/// Sort newest first and apply an optional limit.
pub fn finish_recent(mut notes: Vec<Note>, limit: Option<usize>) -> Vec<Note> {
    notes.sort_by(newest_first);
    if let Some(limit) = limit {
        notes.truncate(limit);
    }
    notes
}

/// Keep notes due in `[from, until]`, soonest first.
pub fn finish_upcoming(notes: Vec<Note>, from: DateTime<Utc>, until: DateTime<Utc>) -> Vec<Note> {
    let mut due: Vec<Note> = notes
        .into_iter()
        .filter(|n| matches!(n.due_at, Some(d) if d >= from && d <= until))
        .collect();
    due.sort_by(soonest_due_first);
    due
}

/// End of an upcoming-reminders window, saturating instead of overflowing.
pub fn window_end(from: DateTime<Utc>, window: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
