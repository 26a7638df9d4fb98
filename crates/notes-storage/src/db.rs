//! SQLite connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and recommended PRAGMAs on initialization.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode};
use tracing::info;

use notes_core::error::{NotesError, Result};

use crate::migrations;

/// Thread-safe SQLite database wrapper.
///
/// The connection slot becomes `None` once [`Database::close`] runs; every
/// later access fails with `Connection`.
pub struct Database {
    conn: Mutex<Option<Connection>>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL, a busy timeout, and runs all
    /// pending migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            NotesError::Connection(format!("Failed to open {}: {}", path.display(), e))
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(map_sqlite_error)?;

        info!("SQLite database opened at {}", path.display());
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| NotesError::Connection(format!("Failed to open in-memory db: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(map_sqlite_error)?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|e| NotesError::Backend(format!("Database lock poisoned: {}", e)))?;
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(NotesError::Connection("SQLite database is closed".to_string())),
        }
    }

    /// Close the native handle. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| NotesError::Backend(format!("Database lock poisoned: {}", e)))?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| map_sqlite_error(e))?;
            info!("SQLite database closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

/// Translate a rusqlite error into the shared taxonomy.
pub(crate) fn map_sqlite_error(err: rusqlite::Error) -> NotesError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation => NotesError::ConstraintViolation(err.to_string()),
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                NotesError::Connection(err.to_string())
            }
            ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::SystemIoFailure => {
                NotesError::Connection(err.to_string())
            }
            _ => NotesError::Backend(err.to_string()),
        },
        rusqlite::Error::QueryReturnedNoRows => NotesError::NotFound(err.to_string()),
        _ => NotesError::Backend(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_count(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
                .map_err(map_sqlite_error)
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(note_count(&db), 0);
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("notes.db");
        let db = Database::new(&path).unwrap();

        assert_eq!(note_count(&db), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_wal_mode_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("wal.db")).unwrap();
        let mode: String = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(map_sqlite_error)
            })
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn test_closed_database_rejects_access() {
        let db = Database::in_memory().unwrap();
        db.close().unwrap();
        db.close().unwrap();

        let err = db.with_conn(|_| Ok(())).unwrap_err();
        assert!(matches!(err, NotesError::Connection(_)));
    }

    #[test]
    fn test_check_constraint_maps_to_constraint_violation() {
        let db = Database::in_memory().unwrap();
        let err = db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO notes (title, title_lc, content, content_lc, created_at)
                     VALUES ('  ', '  ', 'c', 'c', 0)",
                    [],
                )
                .map_err(map_sqlite_error)
            })
            .unwrap_err();
        assert!(matches!(err, NotesError::ConstraintViolation(_)));
    }
}
