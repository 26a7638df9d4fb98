use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NotesError, Result};

// =============================================================================
// Backends
// =============================================================================

/// The six storage engines a notes store can be backed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Embedded single-file relational store.
    Sqlite,
    /// Document store.
    Mongo,
    /// Graph store.
    Neo4j,
    /// Server relational store.
    Postgresql,
    /// Wide-column store.
    Cassandra,
    /// In-process, in-memory store.
    Progress,
}

impl BackendKind {
    pub const ALL: [BackendKind; 6] = [
        BackendKind::Sqlite,
        BackendKind::Mongo,
        BackendKind::Neo4j,
        BackendKind::Postgresql,
        BackendKind::Cassandra,
        BackendKind::Progress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Mongo => "mongo",
            BackendKind::Neo4j => "neo4j",
            BackendKind::Postgresql => "postgresql",
            BackendKind::Cassandra => "cassandra",
            BackendKind::Progress => "progress",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = NotesError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| NotesError::UnsupportedBackend(s.to_string()))
    }
}

// =============================================================================
// Notes
// =============================================================================

/// A stored note.
///
/// `id` is whatever the backend uses natively (an autoincrement integer, an
/// ObjectId, a UUID) rendered as an opaque string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Note {
    pub fn has_reminder(&self) -> bool {
        self.due_at.is_some()
    }
}

/// Input for creating a note. `created_at` is never client supplied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            due_at: None,
        }
    }

    pub fn with_due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    /// Reject drafts whose title or content is blank.
    pub fn validate(&self) -> Result<()> {
        require_text("title", &self.title)?;
        require_text("content", &self.content)
    }
}

/// Partial update. `None` leaves a field untouched; `due_at: Some(None)`
/// clears the reminder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub due_at: Option<Option<DateTime<Utc>>>,
}

impl NotePatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn due_at(mut self, due_at: Option<DateTime<Utc>>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        if let Some(content) = &self.content {
            require_text("content", content)?;
        }
        Ok(())
    }

    /// Merge the supplied fields into `note` and stamp `updated_at`.
    pub fn apply(&self, note: &mut Note, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
        if let Some(due_at) = self.due_at {
            note.due_at = due_at.map(truncate_millis);
        }
        note.updated_at = Some(now);
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(NotesError::ConstraintViolation(format!(
            "'{}' must not be empty",
            field
        )));
    }
    Ok(())
}

/// Which note fields a search inspects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    Title,
    Content,
    #[default]
    Both,
}

impl SearchScope {
    pub fn includes_title(&self) -> bool {
        matches!(self, SearchScope::Title | SearchScope::Both)
    }

    pub fn includes_content(&self) -> bool {
        matches!(self, SearchScope::Content | SearchScope::Both)
    }
}

/// Aggregate counts reported by every backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteStats {
    pub total: u64,
    pub with_reminder: u64,
    pub without_reminder: u64,
    pub last_7_days: u64,
}

// =============================================================================
// Health
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// Only while a probe is in flight.
    Unknown,
}

/// Result of one liveness probe. Recreated on every probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub name: BackendKind,
    pub status: HealthStatus,
    pub note_count: u64,
    pub checked_at: DateTime<Utc>,
}

impl BackendHealth {
    pub fn healthy(name: BackendKind, note_count: u64) -> Self {
        Self {
            name,
            status: HealthStatus::Healthy,
            note_count,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(name: BackendKind) -> Self {
        Self {
            name,
            status: HealthStatus::Unhealthy,
            note_count: 0,
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

// =============================================================================
// Benchmarks
// =============================================================================

/// Timings for one backend from one harness run. Never mutated once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub backend: BackendKind,
    pub insert_seconds: f64,
    pub lookup_seconds: f64,
    pub search_seconds: f64,
    pub total_notes_after_run: u64,
    pub iterations: u32,
    pub generated_at: DateTime<Utc>,
}

// =============================================================================
// Time helpers
// =============================================================================

/// Millisecond precision is the finest every engine stores losslessly.
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Current time at storage precision.
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_backend_kind_round_trips_through_str() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.as_str().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_backend_kind_parse_is_case_insensitive() {
        assert_eq!(" SQLite ".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!("Neo4J".parse::<BackendKind>().unwrap(), BackendKind::Neo4j);
    }

    #[test]
    fn test_backend_kind_rejects_unknown() {
        let err = "redis".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, NotesError::UnsupportedBackend(name) if name == "redis"));
        // The Python-era alias is not one of the six identifiers.
        assert!("progress_server".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_kind_serializes_snake_case() {
        let json = serde_json::to_string(&BackendKind::Postgresql).unwrap();
        assert_eq!(json, "\"postgresql\"");
    }

    #[test]
    fn test_draft_validation() {
        assert!(NoteDraft::new("Title", "Body").validate().is_ok());

        let err = NoteDraft::new("   ", "Body").validate().unwrap_err();
        assert!(matches!(err, NotesError::ConstraintViolation(msg) if msg.contains("title")));

        let err = NoteDraft::new("Title", "\n\t").validate().unwrap_err();
        assert!(matches!(err, NotesError::ConstraintViolation(msg) if msg.contains("content")));
    }

    #[test]
    fn test_patch_validation_only_checks_supplied_fields() {
        assert!(NotePatch::default().validate().is_ok());
        assert!(NotePatch::default().content("new").validate().is_ok());
        assert!(NotePatch::default().title("").validate().is_err());
    }

    #[test]
    fn test_patch_apply_merges_supplied_fields() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let mut note = Note {
            id: "1".into(),
            title: "old".into(),
            content: "keep".into(),
            due_at: Some(created + Duration::days(1)),
            created_at: created,
            updated_at: None,
        };

        let now = created + Duration::hours(2);
        NotePatch::default().title("new").due_at(None).apply(&mut note, now);

        assert_eq!(note.title, "new");
        assert_eq!(note.content, "keep");
        assert_eq!(note.due_at, None);
        assert_eq!(note.created_at, created);
        assert_eq!(note.updated_at, Some(now));
    }

    #[test]
    fn test_search_scope_fields() {
        assert!(SearchScope::Both.includes_title() && SearchScope::Both.includes_content());
        assert!(!SearchScope::Title.includes_content());
        assert!(!SearchScope::Content.includes_title());
    }

    #[test]
    fn test_note_wire_format() {
        let created = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let note = Note {
            id: "abc".into(),
            title: "t".into(),
            content: "c".into(),
            due_at: None,
            created_at: created,
            updated_at: None,
        };
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["id"], "abc");
        assert!(value["due_at"].is_null());
        assert_eq!(value["created_at"], "2026-03-04T05:06:07Z");
        assert!(value.get("updated_at").is_none());
    }

    #[test]
    fn test_truncate_millis_drops_sub_millisecond_precision() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(truncate_millis(ts).timestamp_subsec_nanos(), 123_000_000);
    }
}
