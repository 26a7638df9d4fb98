//! Embedded SQLite adapter.
//!
//! rusqlite is synchronous, so every call runs on the blocking pool via
//! `spawn_blocking` and holds the [`Database`] mutex only for its own
//! statement(s). Ids are SQLite rowids rendered as decimal strings.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use notes_core::error::{NotesError, Result};
use notes_core::types::{
    now_millis, BackendKind, Note, NoteDraft, NotePatch, NoteStats, SearchScope,
};

use crate::db::{map_sqlite_error, Database};
use crate::repository::NoteRepository;
use crate::retry::RetryPolicy;
use crate::search;
use crate::timestamp::{from_millis, from_optional_millis, to_millis};

const NOTE_COLUMNS: &str = "id, title, content, due_at, created_at, updated_at";

pub struct SqliteRepository {
    db: Arc<Database>,
    retry: RetryPolicy,
}

impl SqliteRepository {
    /// Open a file-backed store. `":memory:"` opens a private in-memory one.
    pub fn open(path: &str, retry: RetryPolicy) -> Result<Self> {
        let db = if path == ":memory:" {
            Database::in_memory()?
        } else {
            Database::new(Path::new(path))?
        };
        Ok(Self::with_database(Arc::new(db), retry))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::with_database(
            Arc::new(Database::in_memory()?),
            RetryPolicy::default(),
        ))
    }

    pub fn with_database(db: Arc<Database>, retry: RetryPolicy) -> Self {
        Self { db, retry }
    }

    /// Run `f` against the connection on the blocking pool, retrying
    /// transient failures (busy/locked database).
    async fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: Fn(&Connection) -> Result<T> + Clone + Send + 'static,
        T: Send + 'static,
    {
        self.retry
            .run(operation, || {
                let db = Arc::clone(&self.db);
                let f = f.clone();
                async move {
                    tokio::task::spawn_blocking(move || db.with_conn(|conn| f(conn)))
                        .await
                        .map_err(|e| NotesError::Backend(format!("SQLite task failed: {}", e)))?
                }
            })
            .await
    }
}

/// Parse an id; anything that is not a rowid cannot exist.
fn parse_id(id: &str) -> Option<i64> {
    id.trim().parse::<i64>().ok()
}

type NoteRow = (i64, String, String, Option<i64>, i64, Option<i64>);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NoteRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn row_to_note(row: NoteRow) -> Result<Note> {
    let (id, title, content, due_at, created_at, updated_at) = row;
    Ok(Note {
        id: id.to_string(),
        title,
        content,
        due_at: from_optional_millis(due_at)?,
        created_at: from_millis(created_at)?,
        updated_at: from_optional_millis(updated_at)?,
    })
}

fn query_notes(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Note>> {
    let mut stmt = conn.prepare(sql).map_err(map_sqlite_error)?;
    let rows = stmt.query_map(params, read_row).map_err(map_sqlite_error)?;

    let mut notes = Vec::new();
    for row in rows {
        notes.push(row_to_note(row.map_err(map_sqlite_error)?)?);
    }
    Ok(notes)
}

fn find_note(conn: &Connection, id: i64) -> Result<Option<Note>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM notes WHERE id = ?1", NOTE_COLUMNS),
            rusqlite::params![id],
            read_row,
        )
        .optional()
        .map_err(map_sqlite_error)?;
    row.map(row_to_note).transpose()
}

#[async_trait]
impl NoteRepository for SqliteRepository {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn create(&self, draft: &NoteDraft) -> Result<String> {
        draft.validate()?;
        let draft = draft.clone();
        let created_at = to_millis(now_millis());
        let id = self
            .call("sqlite.create", move |conn| {
                conn.execute(
                    "INSERT INTO notes (title, title_lc, content, content_lc, due_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        draft.title,
                        draft.title.to_lowercase(),
                        draft.content,
                        draft.content.to_lowercase(),
                        draft.due_at.map(to_millis),
                        created_at,
                    ],
                )
                .map_err(map_sqlite_error)?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        info!(backend = "sqlite", id, "Note added");
        Ok(id.to_string())
    }

    async fn get(&self, id: &str) -> Result<Note> {
        let rowid = parse_id(id).ok_or_else(|| NotesError::NotFound(id.to_string()))?;
        self.call("sqlite.get", move |conn| find_note(conn, rowid))
            .await?
            .ok_or_else(|| NotesError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note> {
        patch.validate()?;
        let rowid = parse_id(id).ok_or_else(|| NotesError::NotFound(id.to_string()))?;
        let patch = patch.clone();
        let updated_at = to_millis(now_millis());
        self.call("sqlite.update", move |conn| {
            let changed = conn
                .execute(
                    "UPDATE notes SET
                        title = COALESCE(?2, title),
                        title_lc = COALESCE(?3, title_lc),
                        content = COALESCE(?4, content),
                        content_lc = COALESCE(?5, content_lc),
                        due_at = CASE WHEN ?6 THEN ?7 ELSE due_at END,
                        updated_at = ?8
                     WHERE id = ?1",
                    rusqlite::params![
                        rowid,
                        patch.title,
                        patch.title.as_ref().map(|t| t.to_lowercase()),
                        patch.content,
                        patch.content.as_ref().map(|c| c.to_lowercase()),
                        patch.due_at.is_some(),
                        patch.due_at.flatten().map(to_millis),
                        updated_at,
                    ],
                )
                .map_err(map_sqlite_error)?;
            if changed == 0 {
                return Ok(None);
            }
            find_note(conn, rowid)
        })
        .await?
        .ok_or_else(|| NotesError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let Some(rowid) = parse_id(id) else {
            warn!(backend = "sqlite", id, "Attempt to delete non-existent note");
            return Ok(false);
        };
        let removed = self
            .call("sqlite.delete", move |conn| {
                conn.execute("DELETE FROM notes WHERE id = ?1", rusqlite::params![rowid])
                    .map_err(map_sqlite_error)
            })
            .await?
            > 0;
        if removed {
            info!(backend = "sqlite", id, "Note deleted");
        } else {
            warn!(backend = "sqlite", id, "Attempt to delete non-existent note");
        }
        Ok(removed)
    }

    async fn search(&self, query: &str, scope: SearchScope) -> Result<Vec<Note>> {
        let Some(needle) = search::normalize_query(query) else {
            return Ok(Vec::new());
        };
        let sql_needle = needle.clone();
        let candidates = self
            .call("sqlite.search", move |conn| {
                query_notes(
                    conn,
                    &format!(
                        "SELECT {} FROM notes
                         WHERE (?2 AND instr(title_lc, ?1) > 0)
                            OR (?3 AND instr(content_lc, ?1) > 0)
                         ORDER BY created_at DESC",
                        NOTE_COLUMNS
                    ),
                    rusqlite::params![
                        sql_needle,
                        scope.includes_title(),
                        scope.includes_content()
                    ],
                )
            })
            .await?;
        let hits = search::finish_search(candidates, &needle, scope);
        info!(backend = "sqlite", query, results = hits.len(), "Search performed");
        Ok(hits)
    }

    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<Note>> {
        // SQLite treats a negative LIMIT as "no limit".
        let sql_limit = limit.map(|l| l as i64).unwrap_or(-1);
        let notes = self
            .call("sqlite.list_recent", move |conn| {
                query_notes(
                    conn,
                    &format!(
                        "SELECT {} FROM notes
                         ORDER BY created_at DESC, CAST(id AS TEXT) ASC
                         LIMIT ?1",
                        NOTE_COLUMNS
                    ),
                    rusqlite::params![sql_limit],
                )
            })
            .await?;
        Ok(search::finish_recent(notes, limit))
    }

    async fn upcoming(&self, window: Duration) -> Result<Vec<Note>> {
        let now = Utc::now();
        let until = search::window_end(now, window);
        let (from_ms, until_ms) = (to_millis(now), to_millis(until));
        let notes = self
            .call("sqlite.upcoming", move |conn| {
                query_notes(
                    conn,
                    &format!(
                        "SELECT {} FROM notes
                         WHERE due_at IS NOT NULL AND due_at BETWEEN ?1 AND ?2
                         ORDER BY due_at ASC",
                        NOTE_COLUMNS
                    ),
                    rusqlite::params![from_ms, until_ms],
                )
            })
            .await?;
        Ok(search::finish_upcoming(notes, now, until))
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = self
            .call("sqlite.count", |conn| {
                conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
                    .map_err(map_sqlite_error)
            })
            .await?;
        Ok(count as u64)
    }

    async fn stats(&self) -> Result<NoteStats> {
        let week_ago = to_millis(Utc::now() - chrono::Duration::days(7));
        let (total, with_reminder, last_7_days): (i64, i64, i64) = self
            .call("sqlite.stats", move |conn| {
                conn.query_row(
                    "SELECT COUNT(*),
                            COUNT(due_at),
                            COALESCE(SUM(CASE WHEN created_at >= ?1 THEN 1 ELSE 0 END), 0)
                     FROM notes",
                    rusqlite::params![week_ago],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(map_sqlite_error)
            })
            .await?;
        Ok(NoteStats {
            total: total as u64,
            with_reminder: with_reminder as u64,
            without_reminder: (total - with_reminder) as u64,
            last_7_days: last_7_days as u64,
        })
    }

    async fn close(&self) -> Result<()> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.close())
            .await
            .map_err(|e| NotesError::Backend(format!("SQLite task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42"), Some(42));
        assert_eq!(parse_id(" 7 "), Some(7));
        assert_eq!(parse_id("64b7f0c2e1"), None);
    }

    #[tokio::test]
    async fn test_ids_are_rowids() {
        let repo = SqliteRepository::in_memory().unwrap();
        let first = repo.create(&NoteDraft::new("a", "b")).await.unwrap();
        let second = repo.create(&NoteDraft::new("c", "d")).await.unwrap();
        assert_eq!(first, "1");
        assert_eq!(second, "2");
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_not_found() {
        let repo = SqliteRepository::in_memory().unwrap();
        assert!(matches!(
            repo.get("not-a-rowid").await,
            Err(NotesError::NotFound(_))
        ));
        assert!(!repo.delete("not-a-rowid").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.db");
        let path = path.to_str().unwrap();

        let repo = SqliteRepository::open(path, RetryPolicy::none()).unwrap();
        let id = repo.create(&NoteDraft::new("persist", "me")).await.unwrap();
        repo.close().await.unwrap();

        let reopened = SqliteRepository::open(path, RetryPolicy::none()).unwrap();
        assert_eq!(reopened.get(&id).await.unwrap().title, "persist");
    }
}
