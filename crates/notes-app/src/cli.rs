//! CLI argument definitions for the `notes` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use notes_core::config::NotesConfig;

/// Multi-backend notes store: monitoring API and benchmark harness.
#[derive(Parser, Debug)]
#[command(name = "notes", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Active backend (sqlite, mongo, neo4j, postgresql, cassandra, progress).
    #[arg(short = 'b', long = "backend", global = true)]
    pub backend: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the monitoring API until Ctrl-C.
    Serve {
        /// API server port.
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,
    },
    /// Benchmark backends and write the report artifacts.
    Bench(BenchArgs),
    /// Probe every monitored backend once and print the result as JSON.
    Health,
    /// Print note statistics for one backend (default: the active one).
    Stats {
        #[arg(long = "db")]
        db: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct BenchArgs {
    /// Backends to benchmark, comma separated.
    #[arg(long = "backends", value_delimiter = ',')]
    pub backends: Vec<String>,

    /// Synthetic notes inserted per iteration.
    #[arg(short = 'n', long = "notes")]
    pub notes: Option<usize>,

    #[arg(short = 'i', long = "iterations")]
    pub iterations: Option<u32>,

    /// Directory for the JSON, HTML and metrics files.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > NOTES_CONFIG env var > ~/.notes/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("NOTES_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Apply flag overrides on top of a config that already carries the
    /// environment overrides.
    pub fn apply_to(&self, config: &mut NotesConfig) {
        if let Some(ref backend) = self.backend {
            config.general.active_backend = backend.clone();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        match &self.command {
            Command::Serve { port: Some(port) } => config.monitor.port = *port,
            Command::Bench(args) => {
                if !args.backends.is_empty() {
                    config.bench.backends = args.backends.clone();
                }
                if let Some(n) = args.notes {
                    config.bench.note_count = n;
                }
                if let Some(i) = args.iterations {
                    config.bench.iterations = i;
                }
                if let Some(ref dir) = args.output {
                    config.bench.output_dir = dir.to_string_lossy().to_string();
                }
            }
            _ => {}
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".notes").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".notes").join("config.toml");
    }
    PathBuf::from("config.toml")
}
