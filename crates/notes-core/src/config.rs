use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::types::BackendKind;

/// Top-level configuration.
///
/// Loaded from a TOML file, then overridden by the environment variables the
/// deployment scripts already export (`USE_DB_BACKEND`, `MONGODB_URI`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotesConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub sqlite: SqliteConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub mongo: MongoConfig,
    #[serde(default)]
    pub neo4j: Neo4jConfig,
    #[serde(default)]
    pub cassandra: CassandraConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub bench: BenchConfig,
}

impl NotesConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NotesConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Numeric variables that fail to parse are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, slot: &mut String| {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        };

        text("USE_DB_BACKEND", &mut self.general.active_backend);
        text("NOTES_DB_PATH", &mut self.sqlite.path);

        text("MONGODB_URI", &mut self.mongo.uri);
        text("MONGODB_DB", &mut self.mongo.database);

        text("NEO4J_URI", &mut self.neo4j.uri);
        text("NEO4J_USER", &mut self.neo4j.user);
        text("NEO4J_PASSWORD", &mut self.neo4j.password);

        text("POSTGRESQL_HOST", &mut self.postgres.host);
        text("POSTGRESQL_DB", &mut self.postgres.database);
        text("POSTGRESQL_USER", &mut self.postgres.user);
        text("POSTGRESQL_PASSWORD", &mut self.postgres.password);

        text("CASSANDRA_KEYSPACE", &mut self.cassandra.keyspace);
        text("CASSANDRA_USER", &mut self.cassandra.user);
        text("CASSANDRA_PASSWORD", &mut self.cassandra.password);

        if let Some(hosts) = lookup("CASSANDRA_HOSTS") {
            self.cassandra.hosts = hosts
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
        }

        for (key, slot) in [
            ("POSTGRESQL_PORT", &mut self.postgres.port),
            ("CASSANDRA_PORT", &mut self.cassandra.port),
            ("NOTES_PORT", &mut self.monitor.port),
        ] {
            if let Some(raw) = lookup(key) {
                match raw.parse::<u16>() {
                    Ok(port) => *slot = port,
                    Err(_) => warn!(key, value = %raw, "Ignoring non-numeric port override"),
                }
            }
        }
    }

    /// Parse the configured active backend.
    ///
    /// An unknown name is a configuration mistake and surfaces as
    /// `UnsupportedBackend`.
    pub fn active_backend(&self) -> Result<BackendKind> {
        self.general.active_backend.parse()
    }

    /// Parse a list of backend names, failing on the first unknown one.
    pub fn parse_backends(names: &[String]) -> Result<Vec<BackendKind>> {
        names.iter().map(|n| n.parse()).collect()
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Active backend: sqlite, mongo, neo4j, postgresql, cassandra, progress.
    pub active_backend: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Upper bound on establishing a backend connection.
    pub connect_timeout_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            active_backend: "sqlite".to_string(),
            log_level: "info".to_string(),
            connect_timeout_ms: 5_000,
        }
    }
}

impl GeneralConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Embedded SQLite file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path, or `:memory:`.
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "notes.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "notes_db".to_string(),
            user: "postgres".to_string(),
            password: "password".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "notes_db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7688".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CassandraConfig {
    pub hosts: Vec<String>,
    pub port: u16,
    pub keyspace: String,
    /// Empty means anonymous.
    pub user: String,
    pub password: String,
}

impl Default for CassandraConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            port: 9042,
            keyspace: "notes_keyspace".to_string(),
            user: String::new(),
            password: String::new(),
        }
    }
}

/// Bounded retry with exponential backoff for transient adapter failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 1_000,
        }
    }
}

/// Monitoring API and health probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub port: u16,
    /// Per-backend health probe bound.
    pub probe_timeout_ms: u64,
    /// Backends included in `/health/all`.
    pub backends: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            probe_timeout_ms: 2_000,
            backends: BackendKind::ALL
                .iter()
                .map(|k| k.as_str().to_string())
                .collect(),
        }
    }
}

impl MonitorConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Benchmark harness workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub note_count: usize,
    pub iterations: u32,
    pub search_queries: Vec<String>,
    pub backends: Vec<String>,
    /// Directory for the JSON/HTML/metrics artifacts.
    pub output_dir: String,
    /// Bound on each phase of one iteration.
    pub phase_timeout_secs: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            note_count: 500,
            iterations: 3,
            search_queries: vec![
                "performance".to_string(),
                "record 42".to_string(),
                "missing-needle".to_string(),
            ],
            backends: vec!["sqlite".to_string(), "progress".to_string()],
            output_dir: "reports".to_string(),
            phase_timeout_secs: 120,
        }
    }
}

impl BenchConfig {
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::NotesError;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_legacy_deployment() {
        let config = NotesConfig::default();
        assert_eq!(config.general.active_backend, "sqlite");
        assert_eq!(config.mongo.uri, "mongodb://localhost:27017");
        assert_eq!(config.neo4j.uri, "bolt://localhost:7688");
        assert_eq!(config.postgres.port, 5432);
        assert_eq!(config.cassandra.keyspace, "notes_keyspace");
        assert_eq!(config.monitor.probe_timeout(), Duration::from_secs(2));
        assert_eq!(config.monitor.backends.len(), 6);
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let config: NotesConfig = toml::from_str(
            r#"
            [general]
            active_backend = "progress"

            [bench]
            note_count = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.general.active_backend, "progress");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.bench.note_count, 100);
        assert_eq!(config.bench.iterations, 3);
        assert_eq!(config.sqlite.path, "notes.db");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = NotesConfig::default();
        config.apply_overrides(lookup_from(&[
            ("USE_DB_BACKEND", "mongo"),
            ("MONGODB_URI", "mongodb://db:27017"),
            ("CASSANDRA_HOSTS", "c1, c2,,c3"),
            ("POSTGRESQL_PORT", "6543"),
            ("NOTES_PORT", "not-a-port"),
        ]));

        assert_eq!(config.general.active_backend, "mongo");
        assert_eq!(config.mongo.uri, "mongodb://db:27017");
        assert_eq!(config.cassandra.hosts, vec!["c1", "c2", "c3"]);
        assert_eq!(config.postgres.port, 6543);
        assert_eq!(config.monitor.port, 8000);
    }

    #[test]
    fn test_active_backend_unknown_is_unsupported() {
        let mut config = NotesConfig::default();
        config.general.active_backend = "dynamo".into();
        assert!(matches!(
            config.active_backend(),
            Err(NotesError::UnsupportedBackend(_))
        ));
    }

    #[test]
    fn test_parse_backends() {
        let kinds =
            NotesConfig::parse_backends(&["sqlite".to_string(), "progress".to_string()]).unwrap();
        assert_eq!(kinds, vec![BackendKind::Sqlite, BackendKind::Progress]);
        assert!(NotesConfig::parse_backends(&["sqlite".into(), "oracle".into()]).is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("notes.toml");

        let mut config = NotesConfig::default();
        config.general.active_backend = "neo4j".into();
        config.save(&path).unwrap();

        let loaded = NotesConfig::load(&path).unwrap();
        assert_eq!(loaded.general.active_backend, "neo4j");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = NotesConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config.general.active_backend, "sqlite");
    }
}
