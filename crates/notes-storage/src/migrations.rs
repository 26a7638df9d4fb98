//! SQLite schema migrations.

use rusqlite::Connection;
use tracing::info;

use notes_core::error::Result;

use crate::db::map_sqlite_error;

/// Run all pending database migrations.
///
/// Versions are tracked in `schema_migrations`; each version is applied at
/// most once.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(map_sqlite_error)?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(map_sqlite_error)?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: notes");
    }

    Ok(())
}

/// Version 1: notes table.
///
/// Timestamps are epoch milliseconds. `title_lc`/`content_lc` hold the
/// lowercase forms used for case-insensitive search, since SQLite's `lower()`
/// only folds ASCII.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS notes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            title       TEXT NOT NULL CHECK (length(trim(title)) > 0),
            title_lc    TEXT NOT NULL,
            content     TEXT NOT NULL CHECK (length(trim(content)) > 0),
            content_lc  TEXT NOT NULL,
            due_at      INTEGER,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_notes_created_at
            ON notes (created_at DESC);

        CREATE INDEX IF NOT EXISTS idx_notes_due_at
            ON notes (due_at)
            WHERE due_at IS NOT NULL;

        INSERT INTO schema_migrations (version, name) VALUES (1, 'notes');
        ",
    )
    .map_err(map_sqlite_error)?;
    Ok(())
}
