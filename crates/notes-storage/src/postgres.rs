//! PostgreSQL adapter on a sqlx connection pool.
//!
//! Ids are `BIGSERIAL` values rendered as decimal strings. As in the SQLite
//! schema, lowercase copies of title and content back case-insensitive search.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info, warn};

use notes_core::config::PostgresConfig;
use notes_core::error::{NotesError, Result};
use notes_core::types::{
    now_millis, truncate_millis, BackendKind, Note, NoteDraft, NotePatch, NoteStats, SearchScope,
};

use crate::repository::NoteRepository;
use crate::retry::RetryPolicy;
use crate::search;

const NOTE_COLUMNS: &str = "id, title, content, due_at, created_at, updated_at";

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS notes (
        id          BIGSERIAL PRIMARY KEY,
        title       TEXT NOT NULL CHECK (length(trim(title)) > 0),
        title_lc    TEXT NOT NULL,
        content     TEXT NOT NULL CHECK (length(trim(content)) > 0),
        content_lc  TEXT NOT NULL,
        due_at      TIMESTAMPTZ,
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS idx_notes_created_at ON notes (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_notes_due_at ON notes (due_at) WHERE due_at IS NOT NULL",
];

#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresRepository {
    pub async fn connect(config: &PostgresConfig, retry: RetryPolicy) -> Result<Self> {
        let url = format!(
            "postgres://{}:{}@{}:{}/{}",
            config.user, config.password, config.host, config.port, config.database
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&url)
            .await
            .map_err(|e| {
                NotesError::Connection(format!(
                    "Failed to connect to PostgreSQL at {}:{}: {}",
                    config.host, config.port, e
                ))
            })?;
        Self::from_pool(pool, retry).await
    }

    pub async fn from_pool(pool: PgPool, retry: RetryPolicy) -> Result<Self> {
        let repo = Self { pool, retry };
        repo.init_schema().await?;
        info!("Connected to PostgreSQL");
        Ok(repo)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn fetch_notes(&self, operation: &str, sql: String, binds: Binds) -> Result<Vec<Note>> {
        let rows = self
            .retry
            .run(operation, || async {
                binds
                    .bind_all(sqlx::query(&sql))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;
        rows.iter().map(row_to_note).collect()
    }
}

/// Positional parameters for the read queries that share `fetch_notes`.
enum Binds {
    None,
    Search(String, bool, bool),
    Limit(i64),
    Window(DateTime<Utc>, DateTime<Utc>),
}

impl Binds {
    fn bind_all<'q>(
        &'q self,
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        match self {
            Binds::None => query,
            Binds::Search(needle, title, content) => {
                query.bind(needle.as_str()).bind(*title).bind(*content)
            }
            Binds::Limit(limit) => query.bind(*limit),
            Binds::Window(from, until) => query.bind(*from).bind(*until),
        }
    }
}

/// `LIMIT` is a bigint; larger requests saturate instead of wrapping negative.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn parse_id(id: &str) -> Option<i64> {
    id.trim().parse::<i64>().ok()
}

fn row_to_note(row: &PgRow) -> Result<Note> {
    let id: i64 = row.try_get("id").map_err(map_sqlx_error)?;
    Ok(Note {
        id: id.to_string(),
        title: row.try_get("title").map_err(map_sqlx_error)?,
        content: row.try_get("content").map_err(map_sqlx_error)?,
        due_at: row.try_get("due_at").map_err(map_sqlx_error)?,
        created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx_error)?,
    })
}

/// Translate a sqlx error into the shared taxonomy.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> NotesError {
    match &err {
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::CheckViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::ForeignKeyViolation => NotesError::ConstraintViolation(err.to_string()),
            _ => NotesError::Backend(err.to_string()),
        },
        sqlx::Error::RowNotFound => NotesError::NotFound(err.to_string()),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => NotesError::Connection(err.to_string()),
        _ => NotesError::Backend(err.to_string()),
    }
}

#[async_trait]
impl NoteRepository for PostgresRepository {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgresql
    }

    async fn create(&self, draft: &NoteDraft) -> Result<String> {
        draft.validate()?;
        let created_at = now_millis();
        let due_at = draft.due_at.map(truncate_millis);
        let id: i64 = self
            .retry
            .run("postgres.create", || async {
                sqlx::query_scalar(
                    "INSERT INTO notes (title, title_lc, content, content_lc, due_at, created_at)
                     VALUES ($1, $2, $3, $4, $5, $6)
                     RETURNING id",
                )
                .bind(&draft.title)
                .bind(draft.title.to_lowercase())
                .bind(&draft.content)
                .bind(draft.content.to_lowercase())
                .bind(due_at)
                .bind(created_at)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)
            })
            .await?;
        info!(backend = "postgresql", id, "Note added");
        Ok(id.to_string())
    }

    async fn get(&self, id: &str) -> Result<Note> {
        let rowid = parse_id(id).ok_or_else(|| NotesError::NotFound(id.to_string()))?;
        let row = self
            .retry
            .run("postgres.get", || async {
                sqlx::query(&format!("SELECT {} FROM notes WHERE id = $1", NOTE_COLUMNS))
                    .bind(rowid)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;
        match row {
            Some(row) => row_to_note(&row),
            None => Err(NotesError::NotFound(id.to_string())),
        }
    }

    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note> {
        patch.validate()?;
        let rowid = parse_id(id).ok_or_else(|| NotesError::NotFound(id.to_string()))?;
        let updated_at = now_millis();
        let row = self
            .retry
            .run("postgres.update", || async {
                sqlx::query(&format!(
                    "UPDATE notes SET
                        title = COALESCE($2, title),
                        title_lc = COALESCE($3, title_lc),
                        content = COALESCE($4, content),
                        content_lc = COALESCE($5, content_lc),
                        due_at = CASE WHEN $6 THEN $7 ELSE due_at END,
                        updated_at = $8
                     WHERE id = $1
                     RETURNING {}",
                    NOTE_COLUMNS
                ))
                .bind(rowid)
                .bind(patch.title.as_deref())
                .bind(patch.title.as_ref().map(|t| t.to_lowercase()))
                .bind(patch.content.as_deref())
                .bind(patch.content.as_ref().map(|c| c.to_lowercase()))
                .bind(patch.due_at.is_some())
                .bind(patch.due_at.flatten().map(truncate_millis))
                .bind(updated_at)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)
            })
            .await?;
        match row {
            Some(row) => row_to_note(&row),
            None => Err(NotesError::NotFound(id.to_string())),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let Some(rowid) = parse_id(id) else {
            warn!(backend = "postgresql", id, "Attempt to delete non-existent note");
            return Ok(false);
        };
        let result = self
            .retry
            .run("postgres.delete", || async {
                sqlx::query("DELETE FROM notes WHERE id = $1")
                    .bind(rowid)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;
        let removed = result.rows_affected() > 0;
        if removed {
            info!(backend = "postgresql", id, "Note deleted");
        } else {
            warn!(backend = "postgresql", id, "Attempt to delete non-existent note");
        }
        Ok(removed)
    }

    async fn search(&self, query: &str, scope: SearchScope) -> Result<Vec<Note>> {
        let Some(needle) = search::normalize_query(query) else {
            return Ok(Vec::new());
        };
        let candidates = self
            .fetch_notes(
                "postgres.search",
                format!(
                    "SELECT {} FROM notes
                     WHERE ($2 AND strpos(title_lc, $1) > 0)
                        OR ($3 AND strpos(content_lc, $1) > 0)
                     ORDER BY created_at DESC",
                    NOTE_COLUMNS
                ),
                Binds::Search(needle.clone(), scope.includes_title(), scope.includes_content()),
            )
            .await?;
        let hits = search::finish_search(candidates, &needle, scope);
        info!(backend = "postgresql", query, results = hits.len(), "Search performed");
        Ok(hits)
    }

    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<Note>> {
        let notes = match limit {
            Some(limit) => {
                self.fetch_notes(
                    "postgres.list_recent",
                    format!(
                        "SELECT {} FROM notes ORDER BY created_at DESC, id::text ASC LIMIT $1",
                        NOTE_COLUMNS
                    ),
                    Binds::Limit(sql_limit(limit)),
                )
                .await?
            }
            None => {
                self.fetch_notes(
                    "postgres.list_recent",
                    format!("SELECT {} FROM notes", NOTE_COLUMNS),
                    Binds::None,
                )
                .await?
            }
        };
        Ok(search::finish_recent(notes, limit))
    }

    async fn upcoming(&self, window: Duration) -> Result<Vec<Note>> {
        let now = Utc::now();
        let until = search::window_end(now, window);
        let notes = self
            .fetch_notes(
                "postgres.upcoming",
                format!(
                    "SELECT {} FROM notes
                     WHERE due_at IS NOT NULL AND due_at BETWEEN $1 AND $2
                     ORDER BY due_at ASC",
                    NOTE_COLUMNS
                ),
                Binds::Window(now, until),
            )
            .await?;
        Ok(search::finish_upcoming(notes, now, until))
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = self
            .retry
            .run("postgres.count", || async {
                sqlx::query_scalar("SELECT COUNT(*) FROM notes")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;
        Ok(count as u64)
    }

    async fn stats(&self) -> Result<NoteStats> {
        let week_ago = Utc::now() - chrono::Duration::days(7);
        let row = self
            .retry
            .run("postgres.stats", || async {
                sqlx::query(
                    "SELECT COUNT(*) AS total,
                            COUNT(due_at) AS with_reminder,
                            COUNT(*) FILTER (WHERE created_at >= $1) AS last_7_days
                     FROM notes",
                )
                .bind(week_ago)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)
            })
            .await?;
        let total: i64 = row.try_get("total").map_err(map_sqlx_error)?;
        let with_reminder: i64 = row.try_get("with_reminder").map_err(map_sqlx_error)?;
        let last_7_days: i64 = row.try_get("last_7_days").map_err(map_sqlx_error)?;
        Ok(NoteStats {
            total: total as u64,
            with_reminder: with_reminder as u64,
            without_reminder: (total - with_reminder) as u64,
            last_7_days: last_7_days as u64,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
        Ok(())
    }
}
