//! The repository contract every backend adapter implements.
//!
//! All six adapters expose the same capability set with identical externally
//! observable semantics. Native driver errors are translated into
//! [`NotesError`] before they leave an adapter.

use std::time::Duration;

use async_trait::async_trait;

use notes_core::error::{NotesError, Result};
use notes_core::types::{
    BackendHealth, BackendKind, Note, NoteDraft, NotePatch, NoteStats, SearchScope,
};

/// Default bound on a single adapter health check.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Storage-agnostic notes repository.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Which engine backs this adapter.
    fn kind(&self) -> BackendKind;

    /// Store a new note and return its backend-assigned id.
    ///
    /// `created_at` is stamped by the adapter at call time. Blank titles or
    /// contents fail with `ConstraintViolation`.
    async fn create(&self, draft: &NoteDraft) -> Result<String>;

    /// Fetch one note. Fails with `NotFound` if absent.
    async fn get(&self, id: &str) -> Result<Note>;

    /// Merge the supplied fields, stamp `updated_at`, return the new state.
    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note>;

    /// Remove a note. Returns whether anything was removed; deleting an
    /// absent id is not an error.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Case-insensitive substring search, newest first. An empty query
    /// matches nothing.
    async fn search(&self, query: &str, scope: SearchScope) -> Result<Vec<Note>>;

    /// Most recent notes by `created_at`, newest first. `None` is unbounded.
    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<Note>>;

    /// Notes due within `window` from now, soonest first.
    async fn upcoming(&self, window: Duration) -> Result<Vec<Note>>;

    /// Number of stored notes.
    async fn count(&self) -> Result<u64>;

    async fn stats(&self) -> Result<NoteStats>;

    /// Release native handles. Further calls fail with `Connection`.
    async fn close(&self) -> Result<()>;

    fn health_timeout(&self) -> Duration {
        DEFAULT_HEALTH_TIMEOUT
    }

    /// Liveness probe bounded by [`health_timeout`](Self::health_timeout).
    ///
    /// Never returns an error: any failure, including the bound elapsing,
    /// is reported as `unhealthy`.
    async fn health(&self) -> BackendHealth {
        let kind = self.kind();
        match tokio::time::timeout(self.health_timeout(), self.count()).await {
            Ok(Ok(count)) => BackendHealth::healthy(kind, count),
            Ok(Err(e)) => {
                tracing::warn!(backend = %kind, error = %e, "Health check failed");
                BackendHealth::unhealthy(kind)
            }
            Err(_) => {
                tracing::warn!(
                    backend = %kind,
                    timeout_ms = self.health_timeout().as_millis() as u64,
                    "Health check timed out"
                );
                BackendHealth::unhealthy(kind)
            }
        }
    }
}

/// Error for operations on an adapter that has been closed.
pub(crate) fn closed_error(kind: BackendKind) -> NotesError {
    NotesError::Connection(format!("{} adapter is closed", kind))
}
