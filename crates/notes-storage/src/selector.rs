//! The process-wide active backend.
//!
//! One adapter is live at a time. Callers borrow it through a [`BackendLease`],
//! which holds a shared lock for as long as the caller uses the adapter.
//! [`BackendSelector::switch`] takes the exclusive side of the same lock, so a
//! switch waits for in-flight leases to drain and no lease ever sees an adapter
//! that is being torn down or constructed.

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::{info, warn};

use notes_core::config::NotesConfig;
use notes_core::error::{NotesError, Result};
use notes_core::types::BackendKind;

use crate::factory::BackendFactory;
use crate::repository::NoteRepository;

struct ActiveBackend {
    kind: BackendKind,
    repo: Arc<dyn NoteRepository>,
}

struct Slot {
    /// Backend the next lazy connection targets.
    requested: BackendKind,
    active: Option<ActiveBackend>,
}

/// Shared access to the active adapter. Holding it blocks a pending switch.
pub struct BackendLease {
    guard: OwnedRwLockReadGuard<Slot, ActiveBackend>,
}

impl BackendLease {
    pub fn kind(&self) -> BackendKind {
        self.guard.kind
    }

    /// Clone out the adapter handle. The clone does not hold the lease, so it
    /// is only for callers that manage their own lifetime (the health monitor).
    pub fn repository(&self) -> Arc<dyn NoteRepository> {
        Arc::clone(&self.guard.repo)
    }
}

impl Deref for BackendLease {
    type Target = dyn NoteRepository;

    fn deref(&self) -> &Self::Target {
        self.guard.repo.as_ref()
    }
}

pub struct BackendSelector {
    factory: Arc<dyn BackendFactory>,
    slot: Arc<RwLock<Slot>>,
}

impl BackendSelector {
    /// Nothing is connected until the first [`active`](Self::active) call.
    pub fn new(factory: Arc<dyn BackendFactory>, default_kind: BackendKind) -> Self {
        Self {
            factory,
            slot: Arc::new(RwLock::new(Slot {
                requested: default_kind,
                active: None,
            })),
        }
    }

    /// Resolve `general.active_backend`. An unknown name fails here with
    /// `UnsupportedBackend`, before any connection is attempted.
    pub fn from_config(config: &NotesConfig, factory: Arc<dyn BackendFactory>) -> Result<Self> {
        let kind = config.active_backend()?;
        Ok(Self::new(factory, kind))
    }

    /// The backend the next lazy connection will use, or the live one.
    pub async fn current_kind(&self) -> BackendKind {
        let slot = self.slot.read().await;
        match slot.active.as_ref() {
            Some(active) => active.kind,
            None => slot.requested,
        }
    }

    /// Borrow the active adapter, connecting it on first use.
    pub async fn active(&self) -> Result<BackendLease> {
        let guard = Arc::clone(&self.slot).read_owned().await;
        if let Ok(guard) = OwnedRwLockReadGuard::try_map(guard, |slot| slot.active.as_ref()) {
            return Ok(BackendLease { guard });
        }

        let mut slot = Arc::clone(&self.slot).write_owned().await;
        // Another caller may have connected while we waited.
        if slot.active.is_none() {
            let kind = slot.requested;
            let repo = self.factory.connect(kind).await?;
            info!(backend = %kind, "Active backend initialized");
            slot.active = Some(ActiveBackend { kind, repo });
        }

        OwnedRwLockReadGuard::try_map(slot.downgrade(), |slot| slot.active.as_ref())
            .map(|guard| BackendLease { guard })
            .map_err(|_| NotesError::Backend("active backend vanished during init".to_string()))
    }

    /// The active adapter if one is already connected. Never connects, and
    /// returns `None` rather than waiting while a switch or first connection
    /// holds the lock.
    pub fn try_connected(&self) -> Option<BackendLease> {
        let guard = Arc::clone(&self.slot).try_read_owned().ok()?;
        OwnedRwLockReadGuard::try_map(guard, |slot| slot.active.as_ref())
            .ok()
            .map(|guard| BackendLease { guard })
    }

    /// Replace the active adapter.
    ///
    /// The name is validated before anything else happens. The previous
    /// adapter is closed before the new one connects; if the new connection
    /// fails the selector is left empty and the next `active()` reconnects to
    /// the backend that was requested here.
    pub async fn switch(&self, name: &str) -> Result<BackendKind> {
        let kind: BackendKind = name.parse()?;
        let mut slot = self.slot.write().await;

        if let Some(previous) = slot.active.take() {
            if let Err(e) = previous.repo.close().await {
                warn!(backend = %previous.kind, error = %e, "Error closing previous backend");
            }
            info!(backend = %previous.kind, "Previous backend closed");
        }

        slot.requested = kind;
        let repo = self.factory.connect(kind).await?;
        slot.active = Some(ActiveBackend { kind, repo });
        info!(backend = %kind, "Switched active backend");
        Ok(kind)
    }

    /// Close the active adapter, if any.
    pub async fn shutdown(&self) -> Result<()> {
        let mut slot = self.slot.write().await;
        if let Some(active) = slot.active.take() {
            active.repo.close().await?;
            info!(backend = %active.kind, "Active backend shut down");
        }
        Ok(())
    }
}
