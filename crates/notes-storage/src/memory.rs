//! In-process note store (the `progress` backend).
//!
//! Backed by a `HashMap` behind an `RwLock`. Ids are random UUIDs since there
//! is no engine to assign them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use notes_core::error::{NotesError, Result};
use notes_core::types::{
    now_millis, truncate_millis, BackendKind, Note, NoteDraft, NotePatch, NoteStats, SearchScope,
};

use crate::repository::{closed_error, NoteRepository};
use crate::search;

#[derive(Debug, Default)]
pub struct MemoryRepository {
    notes: RwLock<HashMap<String, Note>>,
    closed: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        info!("In-memory note store initialized");
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Note>>> {
        self.ensure_open()?;
        self.notes
            .read()
            .map_err(|e| NotesError::Backend(format!("Note store lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Note>>> {
        self.ensure_open()?;
        self.notes
            .write()
            .map_err(|e| NotesError::Backend(format!("Note store lock poisoned: {}", e)))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error(BackendKind::Progress));
        }
        Ok(())
    }
}

#[async_trait]
impl NoteRepository for MemoryRepository {
    fn kind(&self) -> BackendKind {
        BackendKind::Progress
    }

    async fn create(&self, draft: &NoteDraft) -> Result<String> {
        draft.validate()?;
        let note = Note {
            id: Uuid::new_v4().to_string(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            due_at: draft.due_at.map(truncate_millis),
            created_at: now_millis(),
            updated_at: None,
        };
        let id = note.id.clone();
        self.write()?.insert(id.clone(), note);
        info!(backend = "progress", id = %id, title = %draft.title, "Note added");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Note> {
        self.read()?
            .get(id)
            .cloned()
            .ok_or_else(|| NotesError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, patch: &NotePatch) -> Result<Note> {
        patch.validate()?;
        let mut notes = self.write()?;
        let note = notes
            .get_mut(id)
            .ok_or_else(|| NotesError::NotFound(id.to_string()))?;
        patch.apply(note, now_millis());
        Ok(note.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.write()?.remove(id).is_some();
        if removed {
            info!(backend = "progress", id, "Note deleted");
        } else {
            warn!(backend = "progress", id, "Attempt to delete non-existent note");
        }
        Ok(removed)
    }

    async fn search(&self, query: &str, scope: SearchScope) -> Result<Vec<Note>> {
        let Some(needle) = search::normalize_query(query) else {
            return Ok(Vec::new());
        };
        let candidates: Vec<Note> = self.read()?.values().cloned().collect();
        let hits = search::finish_search(candidates, &needle, scope);
        info!(backend = "progress", query, results = hits.len(), "Search performed");
        Ok(hits)
    }

    async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<Note>> {
        let notes: Vec<Note> = self.read()?.values().cloned().collect();
        Ok(search::finish_recent(notes, limit))
    }

    async fn upcoming(&self, window: Duration) -> Result<Vec<Note>> {
        let now = Utc::now();
        let until = search::window_end(now, window);
        let notes: Vec<Note> = self.read()?.values().cloned().collect();
        Ok(search::finish_upcoming(notes, now, until))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read()?.len() as u64)
    }

    async fn stats(&self) -> Result<NoteStats> {
        let week_ago = Utc::now() - chrono::Duration::days(7);
        let notes = self.read()?;
        let total = notes.len() as u64;
        let with_reminder = notes.values().filter(|n| n.has_reminder()).count() as u64;
        let last_7_days = notes.values().filter(|n| n.created_at >= week_ago).count() as u64;
        Ok(NoteStats {
            total,
            with_reminder,
            without_reminder: total - with_reminder,
            last_7_days,
        })
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("In-memory note store closed");
        }
        Ok(())
    }
}
