//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use notes_core::config::NotesConfig;
use notes_core::error::Result;
use notes_storage::{BackendFactory, BackendSelector};

use crate::probe::HealthMonitor;

/// Shared application state. Every field is an `Arc`, so cloning per request
/// is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NotesConfig>,
    /// Owner of the active backend.
    pub selector: Arc<BackendSelector>,
    pub monitor: Arc<HealthMonitor>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Wire the selector and monitor from configuration.
    ///
    /// Fails with `UnsupportedBackend` if the configured active backend or
    /// any monitored backend name is unknown.
    pub fn new(config: NotesConfig, factory: Arc<dyn BackendFactory>) -> Result<Self> {
        let selector = Arc::new(BackendSelector::from_config(&config, Arc::clone(&factory))?);
        let backends = NotesConfig::parse_backends(&config.monitor.backends)?;
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&selector),
            factory,
            backends,
            config.monitor.probe_timeout(),
        ));
        Ok(Self {
            config: Arc::new(config),
            selector,
            monitor,
            start_time: Instant::now(),
        })
    }
}
