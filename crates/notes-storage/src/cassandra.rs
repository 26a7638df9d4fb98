//! Cassandra adapter (scylla driver).
//!
//! The table is keyed by a UUID text id. CQL has no substring predicate, so
//! search, recency and reminder queries scan the table and filter in process.
//! Timestamps are `bigint` epoch milliseconds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use scylla::frame::response::result::Row;
use scylla::transport::errors::{DbError, NewSessionError, QueryError};
use scylla::{QueryResult, Session, SessionBuilder};
use tracing::{info, warn};
use uuid::Uuid;

use notes_core::config::CassandraConfig;
use notes_core::error::{NotesError, Result};
use notes_core::types::{
    now_millis, BackendKind, Note, NoteDraft, NotePatch, NoteStats, SearchScope,
};

use crate::repository::{closed_error, NoteRepository};
use crate::retry::RetryPolicy;
use crate::search;
use crate::timestamp::{from_millis, from_optional_millis, to_millis};

const SELECT_NOTES: &str =
    "SELECT id, title, content, due_at, created_at, updated_at FROM notes";

type NoteRow = (String, String, String, Option<i64>, i64, Option<i64>);

pub struct CassandraRepository {
    session: Session,
    retry: RetryPolicy,
    closed: AtomicBool,
}

impl CassandraRepository {
    pub async fn connect(config: &CassandraConfig, retry: RetryPolicy) -> Result<Self> {
        let nodes: Vec<String> = config
            .hosts
            .iter()
            .map(|host| format!("{}:{}", host, config.port))
            .collect();
        let mut builder = SessionBuilder::new().known_nodes(&nodes);
        if !config.user.is_empty() {
            builder = builder.user(&config.user, &config.password);
        }
        let session = builder.build().await.map_err(map_session_error)?;

        session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                    config.keyspace
                ),
                (),
            )
            .await
            .map_err(map_query_error)?;
        session
            .use_keyspace(&config.keyspace, false)
            .await
            .map_err(map_query_error)?;
        session
            .query_unpaged(
                "CREATE TABLE IF NOT EXISTS notes (
                    id text PRIMARY KEY,
                    title text,
                    content text,
                    due_at bigint,
                    created_at bigint,
                    updated_at bigint
                )",
                (),
            )
            .await
            .map_err(map_query_error)?;

        info!(nodes = ?nodes, keyspace = %config.keyspace, "Connected to Cassandra");
        Ok(Self {
            session,
            retry,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error(BackendKind::Cassandra));
        }
        Ok(())
    }

    async fn select(&self, operation: &str, where_id: Option<&str>) -> Result<Vec<Note>> {
        self.ensure_open()?;
        let rows: Vec<NoteRow> = self
            .retry
            .run(operation, || async {
                let result = match where_id {
                    Some(id) => {
                        self.session
                            .query_unpaged(format!("{} WHERE id = ?", SELECT_NOTES), (id,))
                            .await
                    }
                    None => self.session.query_unpaged(SELECT_NOTES, ()).await,
                }
                .map_err(map_query_error)?;
                result
                    .rows_typed::<NoteRow>()
                    .map_err(|e| NotesError::Serialization(e.to_string()))?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| NotesError::Serialization(e.to_string()))
            })
            .await?;
        rows.into_iter().map(row_to_note).collect()
    }

    async fn all_notes(&self, operation: &str) -> Result<Vec<Note>> {
        self.select(operation, None).await
    }

    async fn find(&self, operation: &str, id: &str) -> Result<Option<Note>> {
        Ok(self.select(operation, Some(id)).await?.into_iter().next())
    }

    async fn write(&self, operation: &str, cql: &str, values: NoteRow) -> Result<()> {
        self.ensure_open()?;
        self.retry
            .run(operation, || async {
                self.session
                    .query_unpaged(cql, values.clone())
                    .await
                    .map_err(map_query_error)
            })
            .await?;
        Ok(())
    }
}

fn row_to_note(row: NoteRow) -> Result<Note> {
    let (id, title, content, due_at, created_at, updated_at) = row;
    Ok(Note {
        id,
        title,
        content,
        due_at: from_optional_millis(due_at)?,
        created_at: from_millis(created_at)?,
        updated_at: from_optional_millis(updated_at)?,
    })
}

fn note_to_row(note: &Note) -> NoteRow {
    (
        note.id.clone(),
        note.title.clone(),
        note.content.clone(),
        note.due_at.map(to_millis),
        to_millis(note.created_at),
        note.updated_at.map(to_millis),
    )
}

/// Outcome of a lightweight transaction. The first column of the first row
/// is `[applied]`; a rejected condition also echoes the current row.
fn applied(result: QueryResult) -> Result<bool> {
    let row = result
        .first_row()
        .map_err(|e| NotesError::Serialization(format!("missing [applied] row: {}", e)))?;
    applied_flag(&row)
}

fn applied_flag(row: &Row) -> Result<bool> {
    row.columns
        .first()
        .and_then(|column| column.as_ref())
        .and_then(|value| value.as_boolean())
        .ok_or_else(|| NotesError::Serialization("[applied] is not a boolean".to_string()))
}

fn map_session_error(err: NewSessionError) -> NotesError {
    NotesError::Connection(format!("Failed to connect to Cassandra: {}", err))
}

/// Translate a driver error into the shared taxonomy.
pub(crate) fn map_query_error(err: QueryError) -> NotesError {
    match &err {
        QueryError::IoError(_) | QueryError::TimeoutError | QueryError::RequestTimeout(_) => {
            NotesError::Connection(err.to_string())
        }
        QueryError::DbError(DbError::Unavailable { .. } | DbError::Overloaded, _) => {
            NotesError::Connection(err.to_string())
        }
        _ => NotesError::Backend(err.to_string()),
    }
}

const INSERT_NOTE: &str = "INSERT INTO notes (id, title, content, due_at, created_at, updated_at) \
     VALUES (?, ?, ?, ?, ?, ?)";

const UPDATE_NOTE: &str = "UPDATE notes SET title = ?, content = ?, due_at = ?, updated_at = ? \
     WHERE id = ? IF EXISTS";

const DELETE_NOTE: &str = "DELETE FROM notes WHERE id = ? IF EXISTS";

#[async_trait]
impl NoteRepository for CassandraRepository {
    fn kind(&self) -> BackendKind {
        BackendKind::Cassandra
    }

    async fn create(&self, draft: &NoteDraft) -> Result<String> {
        draft.validate()?;
        let note = Note {
            id: Uuid::new_v4().to_string(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            due_at: draft.due_at,
            created_at: now_millis(),
            updated_at: None,
        };
        self.write("cassandra.create", INSERT_NOTE, note_to_row(&note))
            .await?;
        info!(backend = "cassandra", id = %note.id, "Note added");
        Ok(note.id)
    }

    async fn get(&self, id: &str) -> Result<Note> {
        self.find("cassandra.get", id)
            .await?
            .ok_or_else(|| NotesError::NotFound(id.to_string()))
    }

    /// The read supplies the fields the patch leaves alone. The write is
    /// conditional so a note deleted in between is not resurrected.
    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note> {
        patch.validate()?;
        let mut note = self
            .find("cassandra.update", id)
            .await?
            .ok_or_else(|| NotesError::NotFound(id.to_string()))?;
        patch.apply(&mut note, now_millis());

        self.ensure_open()?;
        let values = (
            note.title.clone(),
            note.content.clone(),
            note.due_at.map(to_millis),
            note.updated_at.map(to_millis),
            note.id.clone(),
        );
        let updated = self
            .retry
            .run("cassandra.update", || async {
                let result = self
                    .session
                    .query_unpaged(UPDATE_NOTE, values.clone())
                    .await
                    .map_err(map_query_error)?;
                applied(result)
            })
            .await?;
        if !updated {
            return Err(NotesError::NotFound(id.to_string()));
        }
        Ok(note)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.ensure_open()?;
        let deleted = self
            .retry
            .run("cassandra.delete", || async {
                let result = self
                    .session
                    .query_unpaged(DELETE_NOTE, (id,))
                    .await
                    .map_err(map_query_error)?;
                applied(result)
            })
            .await?;
        if deleted {
            info!(backend = "cassandra", id, "Note deleted");
        } else {
            warn!(backend = "cassandra", id, "Attempt to delete non-existent note");
        }
        Ok(deleted)
    }

    async fn search(&self, query: &str, scope: SearchScope) -> Result<Vec<Note>> {
        let Some(needle) = search::normalize_query(query) else {
            return Ok(Vec::new());
        };
        let candidates = self.all_notes("cassandra.search").await?;
        let hits = search::finish_search(candidates, &needle, scope);
        info!(backend = "cassandra", query, results = hits.len(), "Search performed");
        Ok(hits)
    }

    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<Note>> {
        let notes = self.all_notes("cassandra.list_recent").await?;
        Ok(search::finish_recent(notes, limit))
    }

    async fn upcoming(&self, window: Duration) -> Result<Vec<Note>> {
        let now = Utc::now();
        let until = search::window_end(now, window);
        let notes = self.all_notes("cassandra.upcoming").await?;
        Ok(search::finish_upcoming(notes, now, until))
    }

    async fn count(&self) -> Result<u64> {
        self.ensure_open()?;
        let count: i64 = self
            .retry
            .run("cassandra.count", || async {
                let result = self
                    .session
                    .query_unpaged("SELECT COUNT(*) FROM notes", ())
                    .await
                    .map_err(map_query_error)?;
                let (count,) = result
                    .single_row_typed::<(i64,)>()
                    .map_err(|e| NotesError::Serialization(e.to_string()))?;
                Ok(count)
            })
            .await?;
        Ok(count as u64)
    }

    async fn stats(&self) -> Result<NoteStats> {
        let week_ago = Utc::now() - chrono::Duration::days(7);
        let notes = self.all_notes("cassandra.stats").await?;
        let total = notes.len() as u64;
        let with_reminder = notes.iter().filter(|n| n.has_reminder()).count() as u64;
        let last_7_days = notes.iter().filter(|n| n.created_at >= week_ago).count() as u64;
        Ok(NoteStats {
            total,
            with_reminder,
            without_reminder: total - with_reminder,
            last_7_days,
        })
    }

    /// The scylla session has no explicit shutdown; its connections are
    /// released when the adapter is dropped.
    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Cassandra adapter closed");
        }
        Ok(())
    }
}
