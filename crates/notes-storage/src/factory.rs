//! Construction of adapters from configuration.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use notes_core::config::NotesConfig;
use notes_core::error::{NotesError, Result};
use notes_core::types::BackendKind;

use crate::memory::MemoryRepository;
use crate::repository::NoteRepository;
use crate::retry::RetryPolicy;
use crate::sqlite::SqliteRepository;

/// Opens a connected adapter for a backend.
///
/// The selector and the health monitor go through this seam so tests can
/// substitute stalled or failing adapters.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn connect(&self, kind: BackendKind) -> Result<Arc<dyn NoteRepository>>;
}

/// Builds adapters from a [`NotesConfig`].
///
/// Each connection attempt is bounded by `general.connect_timeout_ms`.
#[derive(Debug, Clone)]
pub struct ConfigBackendFactory {
    config: Arc<NotesConfig>,
}

impl ConfigBackendFactory {
    pub fn new(config: Arc<NotesConfig>) -> Self {
        Self { config }
    }

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }

    async fn open(&self, kind: BackendKind) -> Result<Arc<dyn NoteRepository>> {
        let repo: Arc<dyn NoteRepository> = match kind {
            BackendKind::Progress => Arc::new(MemoryRepository::new()),
            BackendKind::Sqlite => {
                let path = self.config.sqlite.path.clone();
                let retry = self.retry();
                let repo = tokio::task::spawn_blocking(move || SqliteRepository::open(&path, retry))
                    .await
                    .map_err(|e| NotesError::Backend(format!("SQLite open task failed: {}", e)))??;
                Arc::new(repo)
            }
            BackendKind::Postgresql => self.open_postgres().await?,
            BackendKind::Mongo => self.open_mongo().await?,
            BackendKind::Neo4j => self.open_neo4j().await?,
            BackendKind::Cassandra => self.open_cassandra().await?,
        };
        Ok(repo)
    }

    #[cfg(feature = "postgres")]
    async fn open_postgres(&self) -> Result<Arc<dyn NoteRepository>> {
        let repo =
            crate::postgres::PostgresRepository::connect(&self.config.postgres, self.retry())
                .await?;
        Ok(Arc::new(repo))
    }

    #[cfg(not(feature = "postgres"))]
    async fn open_postgres(&self) -> Result<Arc<dyn NoteRepository>> {
        Err(not_compiled(BackendKind::Postgresql, "postgres"))
    }

    #[cfg(feature = "mongo")]
    async fn open_mongo(&self) -> Result<Arc<dyn NoteRepository>> {
        let repo = crate::mongo::MongoRepository::connect(&self.config.mongo, self.retry()).await?;
        Ok(Arc::new(repo))
    }

    #[cfg(not(feature = "mongo"))]
    async fn open_mongo(&self) -> Result<Arc<dyn NoteRepository>> {
        Err(not_compiled(BackendKind::Mongo, "mongo"))
    }

    #[cfg(feature = "neo4j")]
    async fn open_neo4j(&self) -> Result<Arc<dyn NoteRepository>> {
        let repo = crate::neo4j::Neo4jRepository::connect(&self.config.neo4j, self.retry()).await?;
        Ok(Arc::new(repo))
    }

    #[cfg(not(feature = "neo4j"))]
    async fn open_neo4j(&self) -> Result<Arc<dyn NoteRepository>> {
        Err(not_compiled(BackendKind::Neo4j, "neo4j"))
    }

    #[cfg(feature = "cassandra")]
    async fn open_cassandra(&self) -> Result<Arc<dyn NoteRepository>> {
        let repo =
            crate::cassandra::CassandraRepository::connect(&self.config.cassandra, self.retry())
                .await?;
        Ok(Arc::new(repo))
    }

    #[cfg(not(feature = "cassandra"))]
    async fn open_cassandra(&self) -> Result<Arc<dyn NoteRepository>> {
        Err(not_compiled(BackendKind::Cassandra, "cassandra"))
    }
}

#[async_trait]
impl BackendFactory for ConfigBackendFactory {
    async fn connect(&self, kind: BackendKind) -> Result<Arc<dyn NoteRepository>> {
        let timeout = self.config.general.connect_timeout();
        debug!(backend = %kind, timeout_ms = timeout.as_millis() as u64, "Connecting");
        let repo = tokio::time::timeout(timeout, self.open(kind))
            .await
            .map_err(|_| NotesError::timeout(format!("connect {}", kind), timeout))??;
        info!(backend = %kind, "Backend connected");
        Ok(repo)
    }
}

#[cfg(not(all(
    feature = "postgres",
    feature = "mongo",
    feature = "neo4j",
    feature = "cassandra"
)))]
fn not_compiled(kind: BackendKind, feature: &str) -> NotesError {
    NotesError::Config(format!(
        "backend {} is not compiled in; rebuild notes-storage with --features {}",
        kind, feature
    ))
}
