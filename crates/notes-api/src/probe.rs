//! Health probing across backends.
//!
//! `health_all` spawns one task per backend and joins them. Each task carries
//! its own deadline, so a stalled backend costs at most one probe timeout and
//! never delays the others. A task that misses its deadline is dropped, not
//! awaited.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use notes_core::error::Result;
use notes_core::types::{BackendHealth, BackendKind, NoteStats};
use notes_storage::{BackendFactory, BackendSelector, NoteRepository};

pub struct HealthMonitor {
    selector: Arc<BackendSelector>,
    factory: Arc<dyn BackendFactory>,
    backends: Vec<BackendKind>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        selector: Arc<BackendSelector>,
        factory: Arc<dyn BackendFactory>,
        backends: Vec<BackendKind>,
        probe_timeout: Duration,
    ) -> Self {
        let mut unique = Vec::with_capacity(backends.len());
        for kind in backends {
            if !unique.contains(&kind) {
                unique.push(kind);
            }
        }
        Self {
            selector,
            factory,
            backends: unique,
            probe_timeout,
        }
    }

    pub fn backends(&self) -> &[BackendKind] {
        &self.backends
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Probe every configured backend concurrently.
    ///
    /// Returns once each probe has answered or hit `probe_timeout`. Timeouts,
    /// errors and panicked probes are all reported as `unhealthy`.
    pub async fn health_all(&self) -> BTreeMap<BackendKind, BackendHealth> {
        let mut results: BTreeMap<BackendKind, BackendHealth> = self
            .backends
            .iter()
            .map(|&kind| (kind, BackendHealth::unhealthy(kind)))
            .collect();

        let mut probes = JoinSet::new();
        for &kind in &self.backends {
            let selector = Arc::clone(&self.selector);
            let factory = Arc::clone(&self.factory);
            let timeout = self.probe_timeout;
            probes.spawn(async move { (kind, bounded_probe(selector, factory, kind, timeout).await) });
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((kind, health)) => {
                    results.insert(kind, health);
                }
                Err(e) => warn!(error = %e, "Health probe task failed"),
            }
        }
        results
    }

    /// Probe a single backend under the same bound as `health_all`.
    pub async fn health(&self, kind: BackendKind) -> BackendHealth {
        bounded_probe(
            Arc::clone(&self.selector),
            Arc::clone(&self.factory),
            kind,
            self.probe_timeout,
        )
        .await
    }

    /// Note count of the active backend.
    pub async fn count(&self) -> Result<u64> {
        self.selector.active().await?.count().await
    }

    /// Stats for `kind`, or for the active backend when `kind` is `None`.
    ///
    /// The active adapter is used when it matches; any other backend gets a
    /// short-lived adapter that is closed afterwards.
    pub async fn stats(&self, kind: Option<BackendKind>) -> Result<NoteStats> {
        let Some(kind) = kind else {
            return self.selector.active().await?.stats().await;
        };
        if self.selector.current_kind().await == kind {
            // A switch may land between the two calls; trust only the lease.
            let lease = self.selector.active().await?;
            if lease.kind() == kind {
                return lease.stats().await;
            }
        }

        let repo = self.factory.connect(kind).await?;
        let stats = repo.stats().await;
        close_quietly(repo.as_ref()).await;
        stats
    }
}

async fn bounded_probe(
    selector: Arc<BackendSelector>,
    factory: Arc<dyn BackendFactory>,
    kind: BackendKind,
    timeout: Duration,
) -> BackendHealth {
    match tokio::time::timeout(timeout, probe(&selector, factory.as_ref(), kind)).await {
        Ok(health) => health,
        Err(_) => {
            warn!(
                backend = %kind,
                timeout_ms = timeout.as_millis() as u64,
                "Health probe timed out"
            );
            BackendHealth::unhealthy(kind)
        }
    }
}

async fn probe(
    selector: &BackendSelector,
    factory: &dyn BackendFactory,
    kind: BackendKind,
) -> BackendHealth {
    // Never queue behind a switch: a busy selector means a fresh adapter.
    if let Some(lease) = selector.try_connected() {
        if lease.kind() == kind {
            return lease.health().await;
        }
    }

    match factory.connect(kind).await {
        Ok(repo) => {
            let health = repo.health().await;
            close_quietly(repo.as_ref()).await;
            debug!(backend = %kind, status = ?health.status, "Probed backend");
            health
        }
        Err(e) => {
            warn!(backend = %kind, error = %e, "Health probe could not connect");
            BackendHealth::unhealthy(kind)
        }
    }
}

async fn close_quietly(repo: &dyn NoteRepository) {
    if let Err(e) = repo.close().await {
        warn!(backend = %repo.kind(), error = %e, "Error closing probe adapter");
    }
}
