//! Note storage: the repository contract, one adapter per backend, and the
//! selector that owns the process-wide active adapter.
//!
//! The in-memory (`progress`) and SQLite adapters are always built. The
//! networked adapters sit behind the `postgres`, `mongo`, `neo4j` and
//! `cassandra` features.

pub mod db;
pub mod factory;
pub mod memory;
pub mod migrations;
pub mod repository;
pub mod retry;
pub mod search;
pub mod selector;
pub mod sqlite;
mod timestamp;

#[cfg(feature = "cassandra")]
pub mod cassandra;
#[cfg(feature = "mongo")]
pub mod mongo;
#[cfg(feature = "neo4j")]
pub mod neo4j;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use factory::{BackendFactory, ConfigBackendFactory};
pub use memory::MemoryRepository;
pub use repository::NoteRepository;
pub use retry::RetryPolicy;
pub use selector::{BackendLease, BackendSelector};
pub use sqlite::SqliteRepository;
