//! Neo4j adapter.
//!
//! Each note is a `:Note` node with a UUID `id` property guarded by a
//! uniqueness constraint. Timestamps are stored as epoch milliseconds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use neo4rs::{query, Graph, Query, Row};
use tracing::{info, warn};
use uuid::Uuid;

use notes_core::config::Neo4jConfig;
use notes_core::error::{NotesError, Result};
use notes_core::types::{
    now_millis, BackendKind, Note, NoteDraft, NotePatch, NoteStats, SearchScope,
};

use crate::repository::{closed_error, NoteRepository};
use crate::retry::RetryPolicy;
use crate::search;
use crate::timestamp::{from_millis, from_optional_millis, to_millis};

const RETURN_NOTE: &str = "RETURN n.id AS id, n.title AS title, n.content AS content, \
     n.due_at AS due_at, n.created_at AS created_at, n.updated_at AS updated_at";

pub struct Neo4jRepository {
    graph: Graph,
    retry: RetryPolicy,
    closed: AtomicBool,
}

impl Neo4jRepository {
    pub async fn connect(config: &Neo4jConfig, retry: RetryPolicy) -> Result<Self> {
        let graph = Graph::new(&config.uri, &config.user, &config.password)
            .await
            .map_err(|e| {
                NotesError::Connection(format!("Failed to connect to Neo4j at {}: {}", config.uri, e))
            })?;
        let repo = Self {
            graph,
            retry,
            closed: AtomicBool::new(false),
        };
        repo.graph
            .run(query(
                "CREATE CONSTRAINT note_id IF NOT EXISTS FOR (n:Note) REQUIRE n.id IS UNIQUE",
            ))
            .await
            .map_err(map_neo4j_error)?;
        info!(uri = %config.uri, "Connected to Neo4j");
        Ok(repo)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error(BackendKind::Neo4j));
        }
        Ok(())
    }

    /// Run a query and collect every row. `build` is called once per attempt
    /// since `Query` is consumed by execution.
    async fn fetch<F>(&self, operation: &str, build: F) -> Result<Vec<Row>>
    where
        F: Fn() -> Query + Send + Sync,
    {
        self.ensure_open()?;
        self.retry
            .run(operation, || async {
                let mut stream = self.graph.execute(build()).await.map_err(map_neo4j_error)?;
                let mut rows = Vec::new();
                while let Some(row) = stream.next().await.map_err(map_neo4j_error)? {
                    rows.push(row);
                }
                Ok(rows)
            })
            .await
    }

    async fn fetch_notes<F>(&self, operation: &str, build: F) -> Result<Vec<Note>>
    where
        F: Fn() -> Query + Send + Sync,
    {
        self.fetch(operation, build)
            .await?
            .iter()
            .map(row_to_note)
            .collect()
    }

    async fn fetch_count<F>(&self, operation: &str, build: F) -> Result<u64>
    where
        F: Fn() -> Query + Send + Sync,
    {
        let rows = self.fetch(operation, build).await?;
        let count = match rows.first() {
            Some(row) => column::<i64>(row, "count")?,
            None => 0,
        };
        Ok(count as u64)
    }
}

fn column<T: serde::de::DeserializeOwned>(row: &Row, key: &str) -> Result<T> {
    row.get::<T>(key)
        .map_err(|e| NotesError::Serialization(format!("column {}: {}", key, e)))
}

fn row_to_note(row: &Row) -> Result<Note> {
    Ok(Note {
        id: column(row, "id")?,
        title: column(row, "title")?,
        content: column(row, "content")?,
        due_at: from_optional_millis(column(row, "due_at")?)?,
        created_at: from_millis(column(row, "created_at")?)?,
        updated_at: from_optional_millis(column(row, "updated_at")?)?,
    })
}

/// Translate a driver error into the shared taxonomy.
pub(crate) fn map_neo4j_error(err: neo4rs::Error) -> NotesError {
    match &err {
        neo4rs::Error::IOError { .. } | neo4rs::Error::ConnectionError => {
            NotesError::Connection(err.to_string())
        }
        _ => {
            let message = err.to_string();
            if message.contains("ConstraintValidationFailed") {
                NotesError::ConstraintViolation(message)
            } else {
                NotesError::Backend(message)
            }
        }
    }
}

#[async_trait]
impl NoteRepository for Neo4jRepository {
    fn kind(&self) -> BackendKind {
        BackendKind::Neo4j
    }

    async fn create(&self, draft: &NoteDraft) -> Result<String> {
        draft.validate()?;
        let id = Uuid::new_v4().to_string();
        let created_at = to_millis(now_millis());
        let due_at = draft.due_at.map(to_millis);
        self.fetch("neo4j.create", || {
            query(
                "CREATE (n:Note {id: $id, title: $title, title_lc: $title_lc, \
                 content: $content, content_lc: $content_lc, created_at: $created_at}) \
                 WITH n \
                 FOREACH (_ IN CASE WHEN $has_due THEN [1] ELSE [] END | SET n.due_at = $due_at) \
                 RETURN n.id AS id",
            )
            .param("id", id.clone())
            .param("title", draft.title.clone())
            .param("title_lc", draft.title.to_lowercase())
            .param("content", draft.content.clone())
            .param("content_lc", draft.content.to_lowercase())
            .param("created_at", created_at)
            .param("has_due", due_at.is_some())
            .param("due_at", due_at.unwrap_or_default())
        })
        .await?;
        info!(backend = "neo4j", id = %id, "Note added");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Note> {
        let notes = self
            .fetch_notes("neo4j.get", || {
                query(&format!("MATCH (n:Note {{id: $id}}) {}", RETURN_NOTE)).param("id", id)
            })
            .await?;
        notes
            .into_iter()
            .next()
            .ok_or_else(|| NotesError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note> {
        patch.validate()?;
        let updated_at = to_millis(now_millis());
        let due_at = patch.due_at.flatten().map(to_millis);
        let notes = self
            .fetch_notes("neo4j.update", || {
                query(&format!(
                    "MATCH (n:Note {{id: $id}}) \
                     SET n.title = CASE WHEN $set_title THEN $title ELSE n.title END, \
                         n.title_lc = CASE WHEN $set_title THEN $title_lc ELSE n.title_lc END, \
                         n.content = CASE WHEN $set_content THEN $content ELSE n.content END, \
                         n.content_lc = CASE WHEN $set_content THEN $content_lc ELSE n.content_lc END, \
                         n.due_at = CASE WHEN $set_due THEN \
                             (CASE WHEN $has_due THEN $due_at ELSE null END) ELSE n.due_at END, \
                         n.updated_at = $updated_at \
                     {}",
                    RETURN_NOTE
                ))
                .param("id", id)
                .param("set_title", patch.title.is_some())
                .param("title", patch.title.clone().unwrap_or_default())
                .param(
                    "title_lc",
                    patch.title.as_deref().unwrap_or_default().to_lowercase(),
                )
                .param("set_content", patch.content.is_some())
                .param("content", patch.content.clone().unwrap_or_default())
                .param(
                    "content_lc",
                    patch.content.as_deref().unwrap_or_default().to_lowercase(),
                )
                .param("set_due", patch.due_at.is_some())
                .param("has_due", due_at.is_some())
                .param("due_at", due_at.unwrap_or_default())
                .param("updated_at", updated_at)
            })
            .await?;
        notes
            .into_iter()
            .next()
            .ok_or_else(|| NotesError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .fetch_count("neo4j.delete", || {
                query("MATCH (n:Note {id: $id}) DETACH DELETE n RETURN count(*) AS count")
                    .param("id", id)
            })
            .await?
            > 0;
        if removed {
            info!(backend = "neo4j", id, "Note deleted");
        } else {
            warn!(backend = "neo4j", id, "Attempt to delete non-existent note");
        }
        Ok(removed)
    }

    async fn search(&self, query_text: &str, scope: SearchScope) -> Result<Vec<Note>> {
        let Some(needle) = search::normalize_query(query_text) else {
            return Ok(Vec::new());
        };
        let candidates = self
            .fetch_notes("neo4j.search", || {
                query(&format!(
                    "MATCH (n:Note) \
                     WHERE ($in_title AND n.title_lc CONTAINS $q) \
                        OR ($in_content AND n.content_lc CONTAINS $q) \
                     {} ORDER BY created_at DESC",
                    RETURN_NOTE
                ))
                .param("q", needle.clone())
                .param("in_title", scope.includes_title())
                .param("in_content", scope.includes_content())
            })
            .await?;
        let hits = search::finish_search(candidates, &needle, scope);
        info!(backend = "neo4j", query = query_text, results = hits.len(), "Search performed");
        Ok(hits)
    }

    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<Note>> {
        let notes = self
            .fetch_notes("neo4j.list_recent", || match limit {
                Some(limit) => query(&format!(
                    "MATCH (n:Note) {} ORDER BY created_at DESC, id ASC LIMIT $limit",
                    RETURN_NOTE
                ))
                .param("limit", limit as i64),
                None => query(&format!("MATCH (n:Note) {}", RETURN_NOTE)),
            })
            .await?;
        Ok(search::finish_recent(notes, limit))
    }

    async fn upcoming(&self, window: Duration) -> Result<Vec<Note>> {
        let now = Utc::now();
        let until = search::window_end(now, window);
        let notes = self
            .fetch_notes("neo4j.upcoming", || {
                query(&format!(
                    "MATCH (n:Note) \
                     WHERE n.due_at IS NOT NULL AND n.due_at >= $from AND n.due_at <= $until \
                     {} ORDER BY due_at ASC",
                    RETURN_NOTE
                ))
                .param("from", to_millis(now))
                .param("until", to_millis(until))
            })
            .await?;
        Ok(search::finish_upcoming(notes, now, until))
    }

    async fn count(&self) -> Result<u64> {
        self.fetch_count("neo4j.count", || {
            query("MATCH (n:Note) RETURN count(n) AS count")
        })
        .await
    }

    async fn stats(&self) -> Result<NoteStats> {
        let week_ago = to_millis(Utc::now() - chrono::Duration::days(7));
        let rows = self
            .fetch("neo4j.stats", || {
                query(
                    "MATCH (n:Note) \
                     RETURN count(n) AS total, \
                            count(n.due_at) AS with_reminder, \
                            sum(CASE WHEN n.created_at >= $week_ago THEN 1 ELSE 0 END) AS last_7_days",
                )
                .param("week_ago", week_ago)
            })
            .await?;
        let Some(row) = rows.first() else {
            return Ok(NoteStats::default());
        };
        let total: i64 = column(row, "total")?;
        let with_reminder: i64 = column(row, "with_reminder")?;
        let last_7_days: i64 = column(row, "last_7_days")?;
        Ok(NoteStats {
            total: total as u64,
            with_reminder: with_reminder as u64,
            without_reminder: (total - with_reminder) as u64,
            last_7_days: last_7_days as u64,
        })
    }

    /// neo4rs keeps a pool with no explicit shutdown; connections are
    /// released when the adapter is dropped.
    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Neo4j adapter closed");
        }
        Ok(())
    }
}
